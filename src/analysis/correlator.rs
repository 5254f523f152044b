use crate::analysis::timeline::{self, CongestionEvent, SrttCursor, SrttEntry};
use crate::analysis::AnalysisResult;
use crate::source::{PacketSource, ReceiverCounter};
use crate::tcp::{FlowKey, Packet};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A retransmission detected on a flow and still waiting for its ACK.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub seq: u32,
    /// Capture timestamp of the segment.
    pub started_at: Duration,
    /// The congestion event this segment was claimed for.
    pub event: CongestionEvent,
    /// SRTT in effect at detection time.
    pub srtt: f64,
}

#[derive(Debug, Default)]
struct FlowState {
    /// Highest sequence number already claimed; only grows.
    ignore_threshold: u32,
    /// Next unconsumed congestion event for this flow.
    event_index: usize,
    pending: Option<Candidate>,
}

impl FlowState {
    /// Claim `pkt` as the retransmission of the flow's next congestion event.
    fn try_detect(
        &mut self,
        pkt: &Packet,
        relative_us: i64,
        events: &[CongestionEvent],
        srtt: f64,
    ) -> Option<&Candidate> {
        if self.pending.is_some() {
            return None;
        }
        let event = events.get(self.event_index)?;
        if relative_us < event.time_us || pkt.seq <= self.ignore_threshold {
            return None;
        }

        self.ignore_threshold = pkt.seq;
        self.event_index += 1;
        Some(self.pending.insert(Candidate {
            seq: pkt.seq,
            started_at: pkt.timestamp,
            event: event.clone(),
            srtt,
        }))
    }

    /// Release the pending candidate if `ack` acknowledges past it.
    fn try_complete(&mut self, ack: u32) -> Option<Candidate> {
        let acked = self.pending.as_ref().map_or(false, |c| ack > c.seq);
        if acked {
            self.pending.take()
        } else {
            None
        }
    }
}

/// Read-only view of a flow's detection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSnapshot {
    pub ignore_threshold: u32,
    pub event_index: usize,
    pub pending_seq: Option<u32>,
}

/// Per-run correlation state: one state machine per flow direction, the two
/// timeline cursors and the lazily loaded receiver duplicate counts.
///
/// Packets must be fed in capture order. The congestion timeline is shared:
/// every flow walks it with its own cursor, so two flows may claim the same
/// event. The SRTT cursor is global and reflects whichever packet advanced
/// capture time last, regardless of its flow.
pub struct Correlator {
    /// Next-state code that makes a conflicting candidate eligible for RTO.
    rto_state: String,
    events: Vec<CongestionEvent>,
    srtt: SrttCursor,
    flows: HashMap<FlowKey, FlowState>,
    base_time: Option<Duration>,
    receiver_counts: Option<HashMap<u32, usize>>,
    detected: usize,
    failed_probes: usize,
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("events.len()", &self.events.len())
            .field("srtt.index()", &self.srtt.index())
            .field("flows.len()", &self.flows.len())
            .field("base_time", &self.base_time)
            .field(
                "receiver_counts.len()",
                &self.receiver_counts.as_ref().map(HashMap::len),
            )
            .field("detected", &self.detected)
            .finish()
    }
}

impl Correlator {
    pub fn new(
        rto_state: impl Into<String>,
        events: Vec<CongestionEvent>,
        srtt: Vec<SrttEntry>,
    ) -> Self {
        Correlator {
            rto_state: rto_state.into(),
            events,
            srtt: SrttCursor::new(srtt),
            flows: HashMap::new(),
            base_time: None,
            receiver_counts: None,
            detected: 0,
            failed_probes: 0,
        }
    }

    /// Feed the next packet of the sender capture.
    ///
    /// Returns a result when `pkt` is the ACK completing a candidate pending on
    /// the reverse direction. `receiver` is queried at most once per run, on
    /// the first payload-bearing packet; `probe` only for RTO checks.
    pub fn observe(
        &mut self,
        pkt: &Packet,
        receiver: &mut dyn ReceiverCounter,
        probe: &mut dyn PacketSource,
    ) -> Option<AnalysisResult> {
        let base_time = match self.base_time {
            Some(t) => t,
            None => {
                info!("⏱️ Base time set to {:?} by {}", pkt.timestamp, pkt);
                self.base_time = Some(pkt.timestamp);
                pkt.timestamp
            }
        };
        let relative_us = timeline::micros_between(base_time, pkt.timestamp);
        let srtt = self.srtt.advance(relative_us);

        if self.receiver_counts.is_none() && pkt.has_payload() {
            self.load_receiver_counts(pkt.src_ip, receiver);
        }

        let key = FlowKey::of(pkt);
        let state = self.flows.entry(key).or_default();
        if pkt.has_payload() {
            if let Some(candidate) = state.try_detect(pkt, relative_us, &self.events, srtt) {
                self.detected += 1;
                debug!(
                    "{} ▶ FR candidate seq={} at {}µs (event at {}µs, next state {:?} at {}µs)",
                    key,
                    candidate.seq,
                    relative_us,
                    candidate.event.time_us,
                    candidate.event.next_state,
                    candidate.event.next_time_us
                );
            }
        }

        if !pkt.is_ack() {
            return None;
        }
        let data_key = key.reverse();
        let candidate = self.flows.get_mut(&data_key)?.try_complete(pkt.ack)?;
        Some(self.classify(&data_key, candidate, pkt, base_time, probe))
    }

    fn classify(
        &mut self,
        key: &FlowKey,
        candidate: Candidate,
        ack: &Packet,
        base_time: Duration,
        probe: &mut dyn PacketSource,
    ) -> AnalysisResult {
        let duration = timeline::seconds_between(candidate.started_at, ack.timestamp);
        let conflict = self.is_duplicated(candidate.seq);
        let rto = conflict
            && candidate.event.next_state == self.rto_state
            && self.probe_rto(key, &candidate, base_time, probe);

        let result = AnalysisResult {
            seq: candidate.seq,
            duration,
            conflict,
            rto,
            fr_time_us: timeline::micros_between(base_time, candidate.started_at),
            srtt: candidate.srtt,
            diff: candidate.srtt - duration,
        };
        debug!("{} ✅ ack={} completes {}", key, ack.ack, result);
        result
    }

    fn is_duplicated(&self, seq: u32) -> bool {
        self.receiver_counts
            .as_ref()
            .and_then(|counts| counts.get(&seq))
            .map_or(false, |&count| count > 1)
    }

    fn probe_rto(
        &mut self,
        key: &FlowKey,
        candidate: &Candidate,
        base_time: Duration,
        probe: &mut dyn PacketSource,
    ) -> bool {
        let at = timeline::offset_by_micros(base_time, candidate.event.next_time_us);
        match probe.has_packet_at(candidate.seq, at) {
            Ok(found) => found,
            Err(err) => {
                self.failed_probes += 1;
                warn!(
                    "{} ❌ RTO probe for seq={} at {:?} failed: {}",
                    key, candidate.seq, at, err
                );
                false
            }
        }
    }

    fn load_receiver_counts(&mut self, src_ip: Ipv4Addr, receiver: &mut dyn ReceiverCounter) {
        let counts = match receiver.packet_counts(src_ip) {
            Ok(counts) => {
                info!(
                    "📥 Receiver capture: {} distinct segments from {}",
                    counts.len(),
                    src_ip
                );
                counts
            }
            Err(err) => {
                warn!("Receiver counts for {} unavailable: {}", src_ip, err);
                HashMap::new()
            }
        };
        self.receiver_counts = Some(counts);
    }
}

impl Correlator {
    pub fn base_time(&self) -> Option<Duration> {
        self.base_time
    }

    pub fn srtt_cursor(&self) -> &SrttCursor {
        &self.srtt
    }

    pub fn peek_flow(&self, key: &FlowKey) -> Option<FlowSnapshot> {
        self.flows.get(key).map(|state| FlowSnapshot {
            ignore_threshold: state.ignore_threshold,
            event_index: state.event_index,
            pending_seq: state.pending.as_ref().map(|c| c.seq),
        })
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Candidates detected so far, completed or not.
    pub fn detected(&self) -> usize {
        self.detected
    }

    /// Candidates still waiting for an ACK.
    pub fn unresolved(&self) -> usize {
        self.flows.values().filter(|s| s.pending.is_some()).count()
    }

    pub fn failed_probes(&self) -> usize {
        self.failed_probes
    }

    pub fn receiver_counts_loaded(&self) -> bool {
        self.receiver_counts.is_some()
    }
}
