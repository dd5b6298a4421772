//! Sensor sources and the periodic producer loops that drain them.
//!
//! Each producer owns one source and pushes into its queue without ever
//! blocking.  A failed read is logged and retried on the next tick; a long
//! fault streak on the pulse path also resets the beat detector so stale
//! timing never leaks into the first beats after recovery.

pub mod mpu6050;
pub mod pulse_adc;
pub mod simulated;

use std::sync::Arc;

use log::{info, warn};

use crate::app::ports::{Clock, MotionSource, PulseSignalSource};
use crate::error::SensorError;
use crate::scheduler::Ticker;
use crate::telemetry::pulse::PulseDetector;
use crate::telemetry::queue::{MotionQueue, PulseQueue};

/// Consecutive pulse read failures after which the detector is reset.
pub const DETECTOR_RESET_STREAK: u32 = 50;

/// Re-log an ongoing fault every this many failures.
const FAULT_LOG_EVERY: u32 = 100;

/// Result of one producer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A sample was queued.
    Queued,
    /// A sample was produced but the queue was full.
    Dropped,
    /// Read fine, nothing to queue (no beat this sample).
    NoSample,
    /// The source failed.
    Fault(SensorError),
}

/// Consecutive-failure tracker that keeps fault logging bounded.
#[derive(Debug)]
struct FaultStreak {
    name: &'static str,
    count: u32,
}

impl FaultStreak {
    const fn new(name: &'static str) -> Self {
        Self { name, count: 0 }
    }

    fn fail(&mut self, e: SensorError) -> u32 {
        self.count = self.count.saturating_add(1);
        if self.count == 1 || self.count % FAULT_LOG_EVERY == 0 {
            warn!("{}: read failed ({}), {} in a row", self.name, e, self.count);
        }
        self.count
    }

    fn recover(&mut self) {
        if self.count > 0 {
            info!("{}: recovered after {} failed reads", self.name, self.count);
            self.count = 0;
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Motion producer
// ───────────────────────────────────────────────────────────────

pub struct MotionProducer<S: MotionSource> {
    source: S,
    queue: Arc<MotionQueue>,
    faults: FaultStreak,
}

impl<S: MotionSource> MotionProducer<S> {
    pub fn new(source: S, queue: Arc<MotionQueue>) -> Self {
        Self { source, queue, faults: FaultStreak::new("IMU") }
    }

    pub fn step(&mut self, now_ms: u64) -> StepOutcome {
        match self.source.read_motion(now_ms) {
            Ok(sample) => {
                self.faults.recover();
                if self.queue.try_push(sample) {
                    StepOutcome::Queued
                } else {
                    StepOutcome::Dropped
                }
            }
            Err(e) => {
                self.faults.fail(e);
                StepOutcome::Fault(e)
            }
        }
    }

    pub fn run<C: Clock>(&mut self, clock: &C, period_ms: u32) -> ! {
        let mut ticker = Ticker::new(period_ms, clock.now_ms());
        info!("IMU: producer running every {} ms", ticker.period_ms());
        loop {
            ticker.wait(clock);
            self.step(clock.now_ms());
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Pulse producer
// ───────────────────────────────────────────────────────────────

pub struct PulseProducer<S: PulseSignalSource> {
    source: S,
    detector: PulseDetector,
    queue: Arc<PulseQueue>,
    faults: FaultStreak,
}

impl<S: PulseSignalSource> PulseProducer<S> {
    pub fn new(source: S, detector: PulseDetector, queue: Arc<PulseQueue>) -> Self {
        Self { source, detector, queue, faults: FaultStreak::new("PULSE") }
    }

    pub fn detector(&self) -> &PulseDetector {
        &self.detector
    }

    pub fn step(&mut self, now_ms: u64) -> StepOutcome {
        let raw = match self.source.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                if self.faults.fail(e) == DETECTOR_RESET_STREAK {
                    warn!("PULSE: resetting detector after {} failed reads", DETECTOR_RESET_STREAK);
                    self.detector.reset();
                }
                return StepOutcome::Fault(e);
            }
        };
        self.faults.recover();

        match self.detector.feed(raw, now_ms) {
            Some(beat) => {
                log::debug!("PULSE: beat {} bpm at {}", beat.bpm, beat.timestamp_ms);
                if self.queue.try_push(beat) {
                    StepOutcome::Queued
                } else {
                    StepOutcome::Dropped
                }
            }
            None => StepOutcome::NoSample,
        }
    }

    pub fn run<C: Clock>(&mut self, clock: &C, period_ms: u32) -> ! {
        let mut ticker = Ticker::new(period_ms, clock.now_ms());
        info!("PULSE: producer sampling every {} ms", ticker.period_ms());
        loop {
            ticker.wait(clock);
            self.step(clock.now_ms());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::samples::MotionSample;

    struct Scripted<T> {
        script: Vec<Result<T, SensorError>>,
    }

    impl MotionSource for Scripted<()> {
        fn read_motion(&mut self, now_ms: u64) -> Result<MotionSample, SensorError> {
            let next = self.script.remove(0);
            next.map(|()| MotionSample { timestamp_ms: now_ms, ..MotionSample::default() })
        }
    }

    impl PulseSignalSource for Scripted<u16> {
        fn read_raw(&mut self) -> Result<u16, SensorError> {
            self.script.remove(0)
        }
    }

    #[test]
    fn motion_fault_is_reported_and_retried() {
        let src = Scripted { script: vec![Err(SensorError::BusFailed), Ok(())] };
        let q = Arc::new(MotionQueue::new());
        let mut p = MotionProducer::new(src, q.clone());
        assert_eq!(p.step(0), StepOutcome::Fault(SensorError::BusFailed));
        assert_eq!(p.step(20), StepOutcome::Queued);
        assert_eq!(q.drain_latest().map(|s| s.timestamp_ms), Some(20));
    }

    #[test]
    fn motion_overflow_reports_drop() {
        let src = Scripted { script: vec![Ok(()); 33] };
        let q = Arc::new(MotionQueue::new());
        let mut p = MotionProducer::new(src, q.clone());
        for i in 0..32 {
            assert_eq!(p.step(i), StepOutcome::Queued);
        }
        assert_eq!(p.step(32), StepOutcome::Dropped);
        assert_eq!(q.dropped(), 1);
    }

    #[test]
    fn pulse_beats_are_queued() {
        let src = Scripted { script: vec![Ok(3000), Ok(2000), Ok(3000)] };
        let q = Arc::new(PulseQueue::new());
        let mut p = PulseProducer::new(src, PulseDetector::default(), q.clone());
        assert_eq!(p.step(0), StepOutcome::NoSample);
        assert_eq!(p.step(10), StepOutcome::NoSample);
        assert_eq!(p.step(1000), StepOutcome::Queued);
        assert_eq!(q.drain_latest().map(|s| s.bpm), Some(60));
    }

    #[test]
    fn long_fault_streak_resets_detector() {
        let mut script = vec![Ok(3000)];
        let outage = DETECTOR_RESET_STREAK as usize;
        script.extend(std::iter::repeat(Err(SensorError::AdcReadFailed)).take(outage));
        script.push(Ok(2000));
        script.push(Ok(3000));
        let q = Arc::new(PulseQueue::new());
        let mut p = PulseProducer::new(Scripted { script }, PulseDetector::default(), q.clone());

        assert_eq!(p.step(0), StepOutcome::NoSample);
        assert!(p.detector().is_above_threshold());
        for i in 0..DETECTOR_RESET_STREAK {
            assert!(matches!(p.step(u64::from(i) * 10), StepOutcome::Fault(_)));
        }
        assert!(!p.detector().is_above_threshold());
        // The armed beat from before the outage is gone: this crossing only arms.
        p.step(1000);
        assert_eq!(p.step(1500), StepOutcome::NoSample);
        assert!(q.is_empty());
    }
}
