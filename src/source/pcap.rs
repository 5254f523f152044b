use crate::config::RTO_PROBE_WINDOW;
use crate::error::{Error, Result};
use crate::source::{PacketSource, ReceiverCounter};
use crate::tcp::Packet;
use etherparse::{EtherType, Ethernet2HeaderSlice, SingleVlanHeaderSlice};
use pcap_file::pcap::PcapReader;
use pcap_file::pcapng::blocks::interface_description::{
    InterfaceDescriptionBlock, InterfaceDescriptionOption,
};
use pcap_file::pcapng::{Block, PcapNgReader};
use pcap_file::DataLink;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const SLL_HEADER_LEN: usize = 16;
const NULL_HEADER_LEN: usize = 4;
const ETHERTYPE_IPV4: u16 = 0x0800;
/// Section Header Block type; reads the same in either byte order.
const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

fn supported(datalink: DataLink) -> Result<DataLink> {
    match datalink {
        DataLink::ETHERNET
        | DataLink::RAW
        | DataLink::IPV4
        | DataLink::LINUX_SLL
        | DataLink::NULL
        | DataLink::LOOP => Ok(datalink),
        other => Err(Error::UnsupportedLinkType(format!("{:?}", other))),
    }
}

/// Strip the link-layer header, keeping only frames that carry IPv4.
fn ipv4_datagram<'a>(datalink: &DataLink, frame: &'a [u8]) -> Option<&'a [u8]> {
    match datalink {
        DataLink::ETHERNET => {
            let eth = Ethernet2HeaderSlice::from_slice(frame).ok()?;
            let rest = &frame[eth.slice().len()..];
            if eth.ether_type() == EtherType::IPV4 {
                Some(rest)
            } else if eth.ether_type() == EtherType::VLAN_TAGGED_FRAME {
                let vlan = SingleVlanHeaderSlice::from_slice(rest).ok()?;
                (vlan.ether_type() == EtherType::IPV4).then(|| &rest[vlan.slice().len()..])
            } else {
                None
            }
        }
        DataLink::LINUX_SLL => {
            let proto = frame.get(14..SLL_HEADER_LEN)?;
            if u16::from_be_bytes([proto[0], proto[1]]) != ETHERTYPE_IPV4 {
                return None;
            }
            frame.get(SLL_HEADER_LEN..)
        }
        DataLink::NULL | DataLink::LOOP => frame.get(NULL_HEADER_LEN..),
        _ => Some(frame),
    }
}

fn decode(datalink: &DataLink, frame: &[u8], timestamp: Duration) -> Option<Packet> {
    ipv4_datagram(datalink, frame).and_then(|datagram| Packet::from_ipv4(datagram, timestamp))
}

/// A pcapng interface: its link type and the units of its packet timestamps.
#[derive(Debug, Clone, Copy)]
struct Interface {
    datalink: DataLink,
    ticks_per_sec: u128,
    offset: Duration,
}

impl Interface {
    fn describe(idb: &InterfaceDescriptionBlock) -> Result<Self> {
        let mut resolution = 6;
        let mut offset = Duration::ZERO;
        for option in &idb.options {
            match option {
                InterfaceDescriptionOption::IfTsResol(r) => resolution = *r,
                InterfaceDescriptionOption::IfTsOffset(secs) => offset = Duration::from_secs(*secs),
                _ => {}
            }
        }
        // high bit set: negative power of two, otherwise of ten
        let ticks_per_sec = if resolution & 0x80 == 0 {
            10u128.checked_pow(u32::from(resolution))
        } else {
            1u128.checked_shl(u32::from(resolution & 0x7f))
        };
        Ok(Interface {
            datalink: supported(idb.linktype)?,
            ticks_per_sec: ticks_per_sec
                .unwrap_or(u128::MAX)
                .clamp(1, u128::from(u64::MAX)),
            offset,
        })
    }

    /// `raw` is the block's tick count, which pcap-file hands out as nanoseconds.
    fn timestamp(&self, raw: Duration) -> Duration {
        let ticks = raw.as_nanos();
        let secs = (ticks / self.ticks_per_sec) as u64;
        let nanos = (ticks % self.ticks_per_sec) * 1_000_000_000 / self.ticks_per_sec;
        self.offset + Duration::new(secs, nanos as u32)
    }
}

/// One captured frame; `packet` is set when it carried IPv4/TCP.
struct Frame {
    timestamp: Duration,
    packet: Option<Packet>,
}

/// A capture file in either classic pcap or pcapng format.
enum Capture {
    Pcap {
        reader: PcapReader<BufReader<File>>,
        datalink: DataLink,
    },
    PcapNg {
        reader: PcapNgReader<BufReader<File>>,
        /// Interfaces of the current section, indexed by interface id.
        interfaces: Vec<Interface>,
    },
}

impl Capture {
    fn open(path: &Path) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        if file.fill_buf()?.starts_with(&PCAPNG_MAGIC) {
            return Ok(Capture::PcapNg {
                reader: PcapNgReader::new(file)?,
                interfaces: Vec::new(),
            });
        }
        let reader = PcapReader::new(file)?;
        let datalink = supported(reader.header().datalink)?;
        Ok(Capture::Pcap { reader, datalink })
    }

    fn format(&self) -> &'static str {
        match self {
            Capture::Pcap { .. } => "pcap",
            Capture::PcapNg { .. } => "pcapng",
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self {
            Capture::Pcap { reader, datalink } => {
                let frame = match reader.next_packet() {
                    Some(frame) => frame?,
                    None => return Ok(None),
                };
                Ok(Some(Frame {
                    timestamp: frame.timestamp,
                    packet: decode(datalink, &frame.data, frame.timestamp),
                }))
            }
            Capture::PcapNg { reader, interfaces } => loop {
                let block = match reader.next_block() {
                    Some(block) => block?,
                    None => return Ok(None),
                };
                match block {
                    Block::SectionHeader(_) => interfaces.clear(),
                    Block::InterfaceDescription(idb) => {
                        interfaces.push(Interface::describe(&idb)?);
                    }
                    Block::EnhancedPacket(epb) => {
                        let interface = interfaces
                            .get(epb.interface_id as usize)
                            .ok_or(Error::UnknownInterface(epb.interface_id))?;
                        let timestamp = interface.timestamp(epb.timestamp);
                        return Ok(Some(Frame {
                            timestamp,
                            packet: decode(&interface.datalink, &epb.data, timestamp),
                        }));
                    }
                    // simple packet blocks carry no timestamp to place them on the timeline
                    _ => {}
                }
            },
        }
    }
}

/// The sender capture, read front to back from a pcap or pcapng file.
pub struct PcapPacketSource {
    path: PathBuf,
    capture: Capture,
    window: Duration,
}

impl PcapPacketSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let capture = Capture::open(&path)?;
        debug!("Opened {} ({})", path.display(), capture.format());
        Ok(PcapPacketSource {
            path,
            capture,
            window: RTO_PROBE_WINDOW,
        })
    }

    /// Width of the window searched by [`PacketSource::has_packet_at`].
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

impl PacketSource for PcapPacketSource {
    fn next_packet(&mut self) -> Result<Option<Packet>> {
        while let Some(frame) = self.capture.next_frame()? {
            if let Some(pkt) = frame.packet {
                return Ok(Some(pkt));
            }
        }
        Ok(None)
    }

    /// Scans a second, independent reader over the same file so the main
    /// cursor is left where it was.
    fn has_packet_at(&mut self, seq: u32, at: Duration) -> Result<bool> {
        let mut capture = Capture::open(&self.path)?;
        let start = at.as_micros();
        let end = start + self.window.as_micros();

        while let Some(frame) = capture.next_frame()? {
            let ts = frame.timestamp.as_micros();
            if ts < start {
                continue;
            }
            if ts > end {
                break;
            }
            let hit = frame
                .packet
                .map_or(false, |pkt| pkt.seq == seq && pkt.has_payload());
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Counts how often each data segment reached the receiver.
#[derive(Debug, Clone)]
pub struct PcapReceiverCounter {
    path: PathBuf,
}

impl PcapReceiverCounter {
    /// Checks the capture is readable now; it is scanned only when queried.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Capture::open(&path)?;
        Ok(PcapReceiverCounter { path })
    }
}

impl ReceiverCounter for PcapReceiverCounter {
    fn packet_counts(&mut self, src_ip: Ipv4Addr) -> Result<HashMap<u32, usize>> {
        let mut capture = Capture::open(&self.path)?;
        let mut counts = HashMap::new();

        while let Some(frame) = capture.next_frame()? {
            match frame.packet {
                Some(pkt) if pkt.src_ip == src_ip && pkt.has_payload() => {
                    *counts.entry(pkt.seq).or_insert(0) += 1;
                }
                _ => {}
            }
        }
        Ok(counts)
    }
}
