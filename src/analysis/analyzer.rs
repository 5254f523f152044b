use crate::analysis::Correlator;
use crate::config::RTO_STATE;
use crate::error::Result;
use crate::source::{EventSource, PacketSource, ReceiverCounter, ResultSink, SrttSource};
use std::fmt;
use tracing::{error, info, trace};

/// Counters describing one finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub packets: usize,
    pub flows: usize,
    pub candidates: usize,
    pub results: usize,
    pub failed_writes: usize,
    pub failed_probes: usize,
    /// Candidates never acknowledged before the capture ended; not reported.
    pub unresolved: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packets, {} flows, {} candidates, {} results ({} write failures), {} failed RTO probes, {} unresolved",
            self.packets,
            self.flows,
            self.candidates,
            self.results,
            self.failed_writes,
            self.failed_probes,
            self.unresolved
        )
    }
}

/// Drives one analysis run: loads the timelines, pulls the sender capture
/// packet by packet through a [`Correlator`] and hands every result to the sink.
pub struct Analyzer {
    events: Box<dyn EventSource>,
    srtt: Option<Box<dyn SrttSource>>,
    packets: Box<dyn PacketSource>,
    receiver: Box<dyn ReceiverCounter>,
    results: Box<dyn ResultSink>,
    rto_state: String,
}

impl Analyzer {
    pub fn new(
        events: Box<dyn EventSource>,
        packets: Box<dyn PacketSource>,
        receiver: Box<dyn ReceiverCounter>,
        results: Box<dyn ResultSink>,
    ) -> Self {
        Analyzer {
            events,
            srtt: None,
            packets,
            receiver,
            results,
            rto_state: RTO_STATE.to_string(),
        }
    }

    /// Record the SRTT in effect at each detection.
    pub fn with_srtt(mut self, srtt: Box<dyn SrttSource>) -> Self {
        self.srtt = Some(srtt);
        self
    }

    /// Next-state code that gates the RTO check; CA_LOSS by default.
    pub fn with_rto_state(mut self, state: impl Into<String>) -> Self {
        self.rto_state = state.into();
        self
    }

    /// Run the analysis to the end of the sender capture.
    ///
    /// Timeline load failures and capture read errors abort the run. Failed
    /// RTO probes and failed result writes are logged and counted; records
    /// already written stay written.
    pub fn run(mut self) -> Result<RunSummary> {
        let events = self.events.load_events()?;
        info!("📋 Loaded {} congestion events", events.len());

        let srtt = match self.srtt.as_mut() {
            Some(source) => {
                let entries = source.load_srtt_entries()?;
                info!("📋 Loaded {} SRTT samples", entries.len());
                entries
            }
            None => Vec::new(),
        };

        let mut correlator = Correlator::new(self.rto_state.clone(), events, srtt);
        let mut summary = RunSummary::default();

        while let Some(pkt) = self.packets.next_packet()? {
            summary.packets += 1;
            trace!("📡 {}", pkt);

            let result =
                match correlator.observe(&pkt, self.receiver.as_mut(), self.packets.as_mut()) {
                    Some(result) => result,
                    None => continue,
                };
            match self.results.save(&result) {
                Ok(()) => summary.results += 1,
                Err(err) => {
                    summary.failed_writes += 1;
                    error!("Failed to save result seq={}: {}", result.seq, err);
                }
            }
        }

        summary.flows = correlator.flow_count();
        summary.candidates = correlator.detected();
        summary.failed_probes = correlator.failed_probes();
        summary.unresolved = correlator.unresolved();
        info!("📊 {}", summary);
        Ok(summary)
    }
}
