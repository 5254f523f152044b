//! Segment observations decoded from captured IPv4 datagrams
use crate::tcp::Flags;
use etherparse::{IpNumber, Ipv4HeaderSlice, TcpHeaderSlice};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// One TCP segment as seen in a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: Flags,
    pub payload_len: usize,
    /// Capture timestamp, relative to the UNIX epoch.
    pub timestamp: Duration,
}

impl Packet {
    /// Decode an IPv4 datagram carrying TCP.
    ///
    /// Returns `None` for anything else (other protocols, truncated headers,
    /// fragments). The payload length comes from the IPv4 total length so that
    /// link-layer padding is not mistaken for data; captures taken with
    /// segmentation offload report a total length of zero, in which case the
    /// captured bytes are used instead.
    pub fn from_ipv4(datagram: &[u8], timestamp: Duration) -> Option<Packet> {
        let ip_hdr = match Ipv4HeaderSlice::from_slice(datagram) {
            Ok(h) if h.protocol() == IpNumber::TCP => h,
            _ => return None,
        };
        if ip_hdr.is_fragmenting_payload() {
            return None;
        }
        let ip_len = ip_hdr.slice().len();
        let tcp_hdr = TcpHeaderSlice::from_slice(&datagram[ip_len..]).ok()?;
        let headers = ip_len + tcp_hdr.slice().len();

        let total = match ip_hdr.total_len() as usize {
            0 => datagram.len(),
            n => n,
        };

        Some(Packet {
            src_ip: ip_hdr.source_addr(),
            dst_ip: ip_hdr.destination_addr(),
            src_port: tcp_hdr.source_port(),
            dst_port: tcp_hdr.destination_port(),
            seq: tcp_hdr.sequence_number(),
            ack: tcp_hdr.acknowledgment_number(),
            flags: Flags::from_header(&tcp_hdr),
            payload_len: total.saturating_sub(headers),
            timestamp,
        })
    }

    pub fn is_ack(&self) -> bool {
        self.flags.is_ack()
    }

    pub fn has_payload(&self) -> bool {
        self.payload_len > 0
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} → {}:{} [{}] seq={} ack={} len={}",
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.flags,
            self.seq,
            self.ack,
            self.payload_len
        )
    }
}
