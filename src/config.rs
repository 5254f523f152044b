use std::time::Duration;

/// Congestion state reported while the sender is in fast recovery (CA_RECOVERY).
pub const RECOVERY_STATE: &str = "3";
/// Congestion state reported after a retransmission timeout (CA_LOSS).
pub const RTO_STATE: &str = "4";
/// How long after a CA_LOSS transition we look for the re-sent segment.
pub const RTO_PROBE_WINDOW: Duration = Duration::from_millis(500);

/// Run settings gathered from the command line.
///
/// Each field belongs to one component and is handed to it when that component
/// is built: `recovery_state` to [`CsvEventLoader::with_recovery_state`],
/// `rto_state` to [`Analyzer::with_rto_state`], `rto_probe_window` to
/// [`PcapPacketSource::with_window`] and `extended_output` to
/// [`CsvResultWriter::create`].
///
/// [`CsvEventLoader::with_recovery_state`]: crate::source::CsvEventLoader::with_recovery_state
/// [`Analyzer::with_rto_state`]: crate::analysis::Analyzer::with_rto_state
/// [`PcapPacketSource::with_window`]: crate::source::PcapPacketSource::with_window
/// [`CsvResultWriter::create`]: crate::source::CsvResultWriter::create
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub recovery_state: String,
    pub rto_state: String,
    pub rto_probe_window: Duration,
    /// Emit the SRTT columns alongside the four basic ones.
    pub extended_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            recovery_state: RECOVERY_STATE.to_string(),
            rto_state: RTO_STATE.to_string(),
            rto_probe_window: RTO_PROBE_WINDOW,
            extended_output: false,
        }
    }
}
