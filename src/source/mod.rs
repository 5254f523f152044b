//! Collaborators the analysis pulls its inputs from and pushes its results to.
mod pcap;
mod result_csv;
mod timeline_csv;

#[cfg(test)]
pub use self::mock::{MockCapture, MockReceiver, MockSink, MockTimeline};

pub use self::pcap::{PcapPacketSource, PcapReceiverCounter};
pub use self::result_csv::CsvResultWriter;
pub use self::timeline_csv::{CsvEventLoader, CsvSrttLoader};

use crate::analysis::{AnalysisResult, CongestionEvent, SrttEntry};
use crate::error::Result;
use crate::tcp::Packet;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Supplies the CA_RECOVERY timeline, ascending by time.
pub trait EventSource {
    fn load_events(&mut self) -> Result<Vec<CongestionEvent>>;
}

/// Supplies SRTT samples, ascending by time.
pub trait SrttSource {
    fn load_srtt_entries(&mut self) -> Result<Vec<SrttEntry>>;
}

/// The sender capture.
pub trait PacketSource {
    /// Next TCP/IPv4 segment in capture order, `None` at the end of the capture.
    fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Whether a payload-bearing segment starting at `seq` was captured within
    /// the probe window beginning at `at` (both ends inclusive).
    fn has_packet_at(&mut self, seq: u32, at: Duration) -> Result<bool>;
}

/// The receiver capture, reduced to how often each segment arrived.
pub trait ReceiverCounter {
    /// Occurrences of each sequence number among payload-bearing segments sent by `src_ip`.
    fn packet_counts(&mut self, src_ip: Ipv4Addr) -> Result<HashMap<u32, usize>>;
}

/// Where results go, in the order they are produced.
pub trait ResultSink {
    fn save(&mut self, result: &AnalysisResult) -> Result<()>;
}
