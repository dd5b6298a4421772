//! Producers → queues → Aggregator → simulated BLE link, driven on a
//! virtual timeline so every run is deterministic.

use std::sync::Arc;

use vitalstream::adapters::ble::{BleLink, LOCAL_ATT_MTU};
use vitalstream::app::ports::Transport;
use vitalstream::config::TelemetryConfig;
use vitalstream::sensors::simulated::{SimulatedImu, SimulatedPulse};
use vitalstream::sensors::{MotionProducer, PulseProducer, StepOutcome};
use vitalstream::telemetry::frame::{decode, FLAG_MOTION, FLAG_PULSE};
use vitalstream::telemetry::{Aggregator, CycleOutcome, MotionQueue, PulseDetector, PulseQueue};

struct Rig {
    motion: Option<MotionProducer<SimulatedImu>>,
    pulse: Option<PulseProducer<SimulatedPulse>>,
    aggregator: Aggregator<Arc<BleLink>>,
    link: Arc<BleLink>,
    cfg: TelemetryConfig,
}

impl Rig {
    fn new(with_motion: bool, with_pulse: bool) -> Self {
        let cfg = TelemetryConfig::default();
        let motion_q = Arc::new(MotionQueue::new());
        let pulse_q = Arc::new(PulseQueue::new());
        let link = Arc::new(BleLink::new(cfg.device_name.clone()));
        link.start().unwrap();
        Self {
            motion: with_motion
                .then(|| MotionProducer::new(SimulatedImu::new(), Arc::clone(&motion_q))),
            pulse: with_pulse.then(|| {
                PulseProducer::new(
                    SimulatedPulse::new(cfg.simulated_bpm, cfg.pulse_sample_period_ms),
                    PulseDetector::new(cfg.pulse),
                    Arc::clone(&pulse_q),
                )
            }),
            aggregator: Aggregator::new(motion_q, pulse_q, Arc::clone(&link)),
            link,
            cfg,
        }
    }

    /// Advance the virtual clock 10 ms at a time up to `until_ms`.
    fn run_for(&mut self, until_ms: u64) {
        let motion_every = u64::from(self.cfg.motion_period_ms);
        let pulse_every = u64::from(self.cfg.pulse_sample_period_ms);
        let frame_every = u64::from(self.cfg.frame_period_ms);
        let mut t = 0;
        while t < until_ms {
            if t % pulse_every == 0 {
                if let Some(p) = self.pulse.as_mut() {
                    p.step(t);
                }
            }
            if t % motion_every == 0 {
                if let Some(m) = self.motion.as_mut() {
                    m.step(t);
                }
            }
            if t % frame_every == 0 {
                self.aggregator.run_cycle();
            }
            t += 10;
        }
    }
}

#[test]
fn simulated_session_streams_motion_and_heart_rate() {
    let mut rig = Rig::new(true, true);
    rig.link.on_connected(0);
    rig.link.on_mtu_changed(LOCAL_ATT_MTU);
    rig.run_for(20_000);

    let frames: Vec<_> = rig
        .link
        .take_sim_notifications()
        .iter()
        .map(|bytes| decode(bytes).expect("every notification decodes"))
        .collect();
    assert_eq!(frames.len(), 1000);
    assert!(frames.iter().all(|f| f.flags() & FLAG_MOTION != 0));
    assert!(frames.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));

    let bpms: Vec<u16> = frames.iter().filter_map(|f| f.bpm).collect();
    assert!(bpms.len() >= 20, "only {} pulse frames", bpms.len());
    let last = *bpms.last().unwrap();
    assert!((68..=76).contains(&last), "bpm={last}");

    let stats = rig.aggregator.stats();
    assert_eq!(stats.frames_sent, 1000);
    assert_eq!(stats.frames_delivered, 1000);
    assert_eq!(stats.empty_cycles, 0);
    assert_eq!(stats.motion_dropped + stats.pulse_dropped, 0);
    assert_eq!(rig.link.frames_dropped(), 0);
}

#[test]
fn no_peer_means_frames_are_built_but_not_delivered() {
    let mut rig = Rig::new(true, false);
    rig.run_for(1_000);

    assert_eq!(rig.aggregator.stats().frames_sent, 50);
    assert_eq!(rig.aggregator.stats().frames_delivered, 0);
    assert_eq!(rig.link.frames_sent(), 0);
    assert_eq!(rig.link.frames_dropped(), 50);
    assert!(rig.link.take_sim_notifications().is_empty());
}

#[test]
fn default_mtu_only_carries_pulse_only_frames() {
    let mut motion_rig = Rig::new(true, false);
    motion_rig.link.on_connected(0);
    motion_rig.run_for(400);
    assert_eq!(motion_rig.link.frames_sent(), 0);
    assert_eq!(motion_rig.link.frames_dropped(), 20);
    assert_eq!(motion_rig.aggregator.stats().frames_sent, 20);
    assert_eq!(motion_rig.aggregator.stats().frames_delivered, 0);

    let mut pulse_rig = Rig::new(false, true);
    pulse_rig.link.on_connected(0);
    pulse_rig.run_for(5_000);
    let sent = pulse_rig.link.take_sim_notifications();
    assert!(!sent.is_empty());
    for bytes in &sent {
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes[0], FLAG_PULSE);
    }
    assert_eq!(pulse_rig.link.frames_dropped(), 0);
}

#[test]
fn stalled_aggregator_drops_newest_and_reports_it() {
    let motion_q = Arc::new(MotionQueue::new());
    let pulse_q = Arc::new(PulseQueue::new());
    let mut producer = MotionProducer::new(SimulatedImu::new(), Arc::clone(&motion_q));

    let outcomes: Vec<_> = (0..100).map(|i| producer.step(i * 20)).collect();
    assert_eq!(outcomes.iter().filter(|o| **o == StepOutcome::Queued).count(), 32);
    assert_eq!(outcomes.iter().filter(|o| **o == StepOutcome::Dropped).count(), 68);

    let link = BleLink::new(TelemetryConfig::default().device_name);
    link.on_connected(0);
    link.on_mtu_changed(LOCAL_ATT_MTU);
    let mut aggregator = Aggregator::new(motion_q, pulse_q, &link);

    // Drop-newest: the last sample that fit was queued at t = 31 * 20.
    assert!(matches!(aggregator.run_cycle(), CycleOutcome::Sent { len: 23, flags: FLAG_MOTION }));
    let sent = link.take_sim_notifications();
    assert_eq!(decode(&sent[0]).unwrap().timestamp_ms, 620);
    assert_eq!(aggregator.stats().motion_dropped, 68);
    assert_eq!(aggregator.run_cycle(), CycleOutcome::Idle);
    assert!(link.is_connected());
}

#[test]
fn pulse_only_cycle_carries_the_beat_timestamp() {
    let motion_q = Arc::new(MotionQueue::new());
    let pulse_q = Arc::new(PulseQueue::new());
    let mut producer = PulseProducer::new(
        SimulatedPulse::new(60.0, 10),
        PulseDetector::default(),
        Arc::clone(&pulse_q),
    );
    let beat_at = (0..500u64)
        .map(|i| i * 10)
        .find(|&t| producer.step(t) == StepOutcome::Queued)
        .expect("a beat within five seconds");

    let link = BleLink::new(TelemetryConfig::default().device_name);
    link.on_connected(0);
    let mut aggregator = Aggregator::new(motion_q, pulse_q, &link);
    aggregator.run_cycle();

    let frame = decode(&link.take_sim_notifications()[0]).unwrap();
    assert_eq!(frame.timestamp_ms, beat_at);
    assert_eq!(frame.motion, None);
    assert!(frame.bpm.is_some_and(|bpm| (58..=62).contains(&bpm)), "{:?}", frame.bpm);
}
