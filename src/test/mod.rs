
use crate::analysis::{AnalysisResult, Analyzer, CongestionEvent, RunSummary, SrttEntry};
use crate::source::{MockCapture, MockReceiver, MockSink, MockTimeline};
use crate::tcp::Packet;
use packets::{at, PacketFactory};
use std::net::Ipv4Addr;

fn event(time_us: i64, next_state: &str, next_time_us: i64) -> CongestionEvent {
    CongestionEvent {
        time_us,
        next_state: next_state.to_string(),
        next_time_us,
    }
}

struct Harness {
    capture: MockCapture,
    receiver: MockReceiver,
    sink: MockSink,
    timeline: MockTimeline,
    with_srtt: bool,
}

impl Harness {
    fn new(events: Vec<CongestionEvent>, packets: Vec<Packet>, counts: &[(u32, usize)]) -> Self {
        Harness {
            capture: MockCapture::new(packets),
            receiver: MockReceiver::new(counts),
            sink: MockSink::new(),
            timeline: MockTimeline::new(events),
            with_srtt: false,
        }
    }

    fn srtt(mut self, entries: Vec<SrttEntry>) -> Self {
        self.timeline = self.timeline.with_srtt(entries);
        self.with_srtt = true;
        self
    }

    fn analyzer(&self) -> Analyzer {
        let analyzer = Analyzer::new(
            Box::new(self.timeline.clone()),
            Box::new(self.capture.clone()),
            Box::new(self.receiver.clone()),
            Box::new(self.sink.clone()),
        );
        if self.with_srtt {
            analyzer.with_srtt(Box::new(self.timeline.clone()))
        } else {
            analyzer
        }
    }

    fn run(&self) -> (RunSummary, Vec<AnalysisResult>) {
        let summary = self.analyzer().run().unwrap();
        (summary, self.sink.saved())
    }
}

/// Anchor at t=0, an old segment, then the retransmission at t=1200 and its ACK.
fn recovery_stream() -> Vec<Packet> {
    vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(100, 50, 900),
        PacketFactory::data(200, 50, 1200),
        PacketFactory::ack(250, 1400),
    ]
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-12,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[test]
fn test_spurious_retransmission_escalated_to_rto() {
    let mut packets = recovery_stream();
    // the timeout retransmission, 200µs into the probe window
    packets.push(PacketFactory::data(200, 50, 5200));
    let h = Harness::new(vec![event(1000, "4", 5000)], packets, &[(200, 2)]);

    let (summary, results) = h.run();

    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.seq, 200);
    assert_close(r.duration, 0.0002);
    assert!(r.conflict, "receiver saw seq 200 twice");
    assert!(r.rto, "segment re-sent inside the probe window");
    assert_eq!(r.fr_time_us, 1200);
    assert_eq!(h.capture.probes(), vec![(200, at(5000))]);
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.results, 1);
    assert_eq!(summary.unresolved, 0);
}

#[test]
fn test_single_delivery_is_not_a_conflict_and_skips_probe() {
    let h = Harness::new(vec![event(1000, "4", 5000)], recovery_stream(), &[(200, 1)]);

    let (_, results) = h.run();

    assert_eq!(results.len(), 1);
    assert!(!results[0].conflict);
    assert!(!results[0].rto);
    assert!(h.capture.probes().is_empty(), "no probe without a conflict");
}

#[test]
fn test_unknown_sequence_is_not_a_conflict() {
    let h = Harness::new(vec![event(1000, "4", 5000)], recovery_stream(), &[(100, 3)]);

    let (_, results) = h.run();

    assert!(!results[0].conflict);
    assert!(!results[0].rto);
}

#[test]
fn test_rto_requires_loss_state() {
    let mut packets = recovery_stream();
    packets.push(PacketFactory::data(200, 50, 5200));
    let h = Harness::new(vec![event(1000, "1", 5000)], packets, &[(200, 2)]);

    let (_, results) = h.run();

    assert!(results[0].conflict);
    assert!(!results[0].rto);
    assert!(h.capture.probes().is_empty());
}

#[test]
fn test_custom_rto_state_gates_the_check() {
    let mut packets = recovery_stream();
    packets.push(PacketFactory::data(200, 50, 5200));
    let h = Harness::new(vec![event(1000, "7", 5000)], packets, &[(200, 2)]);

    let results = h.analyzer().with_rto_state("7").run().unwrap();
    assert_eq!(results.results, 1);
    let saved = h.sink.saved();
    assert!(saved[0].conflict);
    assert!(saved[0].rto);
    assert_eq!(h.capture.probes(), vec![(200, at(5000))]);
}

#[test]
fn test_default_rto_state_ignores_other_codes() {
    let mut packets = recovery_stream();
    packets.push(PacketFactory::data(200, 50, 5200));
    let h = Harness::new(vec![event(1000, "7", 5000)], packets, &[(200, 2)]);

    let (_, results) = h.run();

    assert!(results[0].conflict);
    assert!(!results[0].rto);
    assert!(h.capture.probes().is_empty());
}

#[test]
fn test_rto_not_found_outside_window() {
    let mut packets = recovery_stream();
    // 500ms + 1µs after the CA_LOSS transition
    packets.push(PacketFactory::data(200, 50, 505_001));
    let h = Harness::new(vec![event(1000, "4", 5000)], packets, &[(200, 2)]);

    let (_, results) = h.run();

    assert!(results[0].conflict);
    assert!(!results[0].rto);
    assert_eq!(h.capture.probes().len(), 1);
}

#[test]
fn test_failed_probe_counts_as_no_rto() {
    let mut packets = recovery_stream();
    packets.push(PacketFactory::data(200, 50, 5200));
    let h = Harness::new(vec![event(1000, "4", 5000)], packets, &[(200, 2)]);
    h.capture.set_probe_failure(true);

    let (summary, results) = h.run();

    assert_eq!(results.len(), 1);
    assert!(results[0].conflict);
    assert!(!results[0].rto);
    assert_eq!(summary.failed_probes, 1);
}

#[test]
fn test_unacknowledged_candidate_is_dropped() {
    let packets = vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(200, 50, 1200),
        PacketFactory::data(250, 50, 1300),
    ];
    let h = Harness::new(vec![event(1000, "4", 5000)], packets, &[(200, 2)]);

    let (summary, results) = h.run();

    assert!(results.is_empty());
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.unresolved, 1);
}

#[test]
fn test_ack_must_pass_candidate() {
    let packets = vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(200, 50, 1200),
        PacketFactory::ack(200, 1300),
        PacketFactory::ack(150, 1350),
        PacketFactory::ack(201, 1600),
    ];
    let h = Harness::new(vec![event(1000, "", 0)], packets, &[]);

    let (_, results) = h.run();

    assert_eq!(results.len(), 1);
    assert_close(results[0].duration, 0.0004);
}

#[test]
fn test_ack_flag_required_for_completion() {
    let mut bare = PacketFactory::ack(250, 1400);
    bare.flags = crate::tcp::Flags::default();
    let packets = vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(200, 50, 1200),
        bare,
    ];
    let h = Harness::new(vec![event(1000, "", 0)], packets, &[]);

    let (summary, results) = h.run();

    assert!(results.is_empty());
    assert_eq!(summary.unresolved, 1);
}

#[test]
fn test_one_candidate_in_flight_per_flow() {
    let packets = vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(200, 50, 1200),
        // both events are due, but 200 is still pending
        PacketFactory::data(300, 50, 1300),
        PacketFactory::ack(250, 1400),
        PacketFactory::data(400, 50, 1500),
        PacketFactory::ack(450, 1700),
    ];
    let h = Harness::new(
        vec![event(1000, "", 0), event(1100, "", 0)],
        packets,
        &[],
    );

    let (summary, results) = h.run();

    let seqs: Vec<u32> = results.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![200, 400]);
    assert_eq!(summary.candidates, 2);
}

#[test]
fn test_already_claimed_sequence_is_ignored() {
    let packets = vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(200, 50, 1200),
        PacketFactory::ack(250, 1400),
        PacketFactory::data(150, 50, 2100),
        PacketFactory::data(200, 50, 2200),
        PacketFactory::data(250, 50, 2300),
        PacketFactory::ack(300, 2500),
    ];
    let h = Harness::new(
        vec![event(1000, "", 0), event(2000, "", 0)],
        packets,
        &[],
    );

    let (_, results) = h.run();

    let seqs: Vec<u32> = results.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![200, 250]);
    assert_eq!(results[1].fr_time_us, 2300);
}

#[test]
fn test_packets_before_event_are_not_candidates() {
    let packets = vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(200, 50, 999),
        PacketFactory::ack(250, 1001),
    ];
    let h = Harness::new(vec![event(1000, "", 0)], packets, &[]);

    let (summary, results) = h.run();

    assert!(results.is_empty());
    assert_eq!(summary.candidates, 0);
}

#[test]
fn test_every_flow_walks_the_shared_timeline() {
    let other = |seq, len, at_us| {
        PacketFactory::segment("10.0.0.3", "10.0.0.2", 6000, 80, seq, 1, len, at_us)
    };
    let other_ack = |ack, at_us| {
        PacketFactory::segment("10.0.0.2", "10.0.0.3", 80, 6000, 1, ack, 0, at_us)
    };
    let packets = vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(200, 50, 1200),
        other(700, 50, 1250),
        other_ack(750, 1300),
        PacketFactory::ack(250, 1400),
    ];
    let h = Harness::new(vec![event(1000, "", 0)], packets, &[]);

    let (summary, results) = h.run();

    // completion order, not detection order
    let seqs: Vec<u32> = results.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![700, 200]);
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.flows, 4);
}

#[test]
fn test_srtt_recorded_at_detection() {
    let h = Harness::new(
        vec![event(1000, "", 0)],
        vec![
            PacketFactory::data(1, 0, 0),
            PacketFactory::data(200, 50, 1500),
            PacketFactory::ack(250, 1700),
        ],
        &[],
    )
    .srtt(vec![
        SrttEntry { time_us: 0, srtt: 0.05 },
        SrttEntry { time_us: 1000, srtt: 0.08 },
        // after detection: must not leak into the result
        SrttEntry { time_us: 1600, srtt: 0.5 },
    ]);

    let (_, results) = h.run();

    assert_eq!(results[0].srtt, 0.08);
    assert_close(results[0].diff, 0.08 - 0.0002);
}

#[test]
fn test_srtt_defaults_to_zero() {
    let h = Harness::new(vec![event(1000, "", 0)], recovery_stream(), &[]);

    let (_, results) = h.run();

    assert_eq!(results[0].srtt, 0.0);
    assert_close(results[0].diff, -0.0002);
}

#[test]
fn test_write_failure_does_not_stop_the_run() {
    let packets = vec![
        PacketFactory::data(1, 0, 0),
        PacketFactory::data(200, 50, 1200),
        PacketFactory::ack(250, 1400),
        PacketFactory::data(300, 50, 2200),
        PacketFactory::ack(350, 2400),
    ];
    let h = Harness::new(vec![event(1000, "", 0), event(2000, "", 0)], packets, &[]);
    h.sink.fail_on(200);

    let (summary, results) = h.run();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].seq, 300);
    assert_eq!(summary.failed_writes, 1);
    assert_eq!(summary.results, 1);
}

#[test]
fn test_event_load_failure_aborts() {
    let mut h = Harness::new(vec![], recovery_stream(), &[]);
    h.timeline = MockTimeline::failing();

    assert!(h.analyzer().run().is_err());
    assert!(h.sink.saved().is_empty());
    assert!(h.receiver.queries().is_empty());
}

#[test]
fn test_srtt_load_failure_aborts() {
    let mut h = Harness::new(vec![], recovery_stream(), &[]);
    h.timeline = MockTimeline::failing();
    let analyzer = Analyzer::new(
        Box::new(MockTimeline::new(vec![event(1000, "", 0)])),
        Box::new(h.capture.clone()),
        Box::new(h.receiver.clone()),
        Box::new(h.sink.clone()),
    )
    .with_srtt(Box::new(h.timeline.clone()));

    assert!(analyzer.run().is_err());
    assert!(h.sink.saved().is_empty());
}

#[test]
fn test_capture_read_failure_aborts_but_keeps_written_results() {
    let mut packets = recovery_stream();
    packets.push(PacketFactory::data(300, 50, 2000));
    let h = Harness::new(vec![event(1000, "", 0)], packets, &[]);
    h.capture.fail_read_at(4);

    assert!(h.analyzer().run().is_err());
    assert_eq!(h.sink.saved().len(), 1);
}

#[test]
fn test_receiver_counts_loaded_once_for_first_sender() {
    let packets = vec![
        PacketFactory::ack(1, 0),
        PacketFactory::data(100, 50, 100),
        PacketFactory::segment("10.0.0.2", "10.0.0.1", 80, 5000, 9000, 1, 30, 200),
        PacketFactory::data(200, 50, 1200),
        PacketFactory::ack(250, 1400),
    ];
    let h = Harness::new(vec![event(1000, "", 0)], packets, &[(200, 2)]);

    let (_, results) = h.run();

    let sender: Ipv4Addr = packets::SENDER.parse().unwrap();
    assert_eq!(h.receiver.queries(), vec![sender]);
    assert!(results[0].conflict);
}

#[test]
fn test_receiver_failure_means_no_conflicts() {
    let mut h = Harness::new(vec![event(1000, "4", 5000)], recovery_stream(), &[]);
    h.receiver = MockReceiver::failing();

    let (summary, results) = h.run();

    assert_eq!(summary.results, 1);
    assert!(!results[0].conflict);
    assert_eq!(h.receiver.queries().len(), 1);
}

#[test]
fn test_base_time_from_first_packet_even_without_payload() {
    let packets = vec![
        PacketFactory::bare(1, 500),
        PacketFactory::data(200, 50, 1400),
        PacketFactory::ack(250, 1600),
    ];
    // 1400 - 500 = 900µs relative: too early for an event at 1000µs
    let h = Harness::new(vec![event(1000, "", 0)], packets, &[]);

    let (summary, _) = h.run();

    assert_eq!(summary.candidates, 0);
    assert_eq!(summary.packets, 3);
}

#[test]
fn test_empty_capture() {
    let h = Harness::new(vec![event(1000, "", 0)], vec![], &[]);

    let (summary, results) = h.run();

    assert!(results.is_empty());
    assert_eq!(summary, RunSummary::default());
}
