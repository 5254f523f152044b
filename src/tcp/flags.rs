//! TCP control bits as laid out in the header's flags byte (RFC 793).
use etherparse::TcpHeaderSlice;
use std::fmt;

/// FIN flag - no more data from sender
pub const FIN: u8 = 1 << 0;
/// SYN flag - synchronize sequence numbers
pub const SYN: u8 = 1 << 1;
/// RST flag - reset the connection
pub const RST: u8 = 1 << 2;
/// PSH flag - push function
pub const PSH: u8 = 1 << 3;
/// ACK flag - acknowledgment field is significant
pub const ACK: u8 = 1 << 4;

/// The control bits of one observed segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const fn new(bits: u8) -> Self {
        Flags(bits)
    }

    /// Collect the control bits of a parsed TCP header
    pub fn from_header(tcp_hdr: &TcpHeaderSlice) -> Self {
        Flags(
            (tcp_hdr.fin() as u8)
                | (tcp_hdr.syn() as u8) << 1
                | (tcp_hdr.rst() as u8) << 2
                | (tcp_hdr.psh() as u8) << 3
                | (tcp_hdr.ack() as u8) << 4,
        )
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn is_ack(self) -> bool {
        self.contains(ACK)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            if self.contains(SYN) { "S" } else { "-" },
            if self.contains(ACK) { "A" } else { "-" },
            if self.contains(FIN) { "F" } else { "-" },
            if self.contains(RST) { "R" } else { "-" },
            if self.contains(PSH) { "P" } else { "-" },
        )
    }
}
