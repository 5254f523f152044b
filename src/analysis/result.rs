use std::fmt;

/// Classification of one completed Fast Retransmission candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub seq: u32,
    /// Seconds between the candidate's transmission and the ACK covering it.
    pub duration: f64,
    /// The receiver saw the segment more than once.
    pub conflict: bool,
    /// The spurious retransmission was followed by a timeout retransmission.
    pub rto: bool,
    /// Detection time, microseconds after the first captured packet.
    pub fr_time_us: i64,
    /// SRTT (seconds) in effect when the candidate was detected.
    pub srtt: f64,
    /// `srtt - duration`
    pub diff: f64,
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seq={} duration={:.9}s conflict={} rto={} fr_time={}µs srtt={:.6}s",
            self.seq,
            self.duration,
            self.conflict as u8,
            self.rto as u8,
            self.fr_time_us,
            self.srtt
        )
    }
}
