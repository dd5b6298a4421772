//! Fixed-cadence frame aggregator.
//!
//! Each cycle drains both sample queues, keeps the newest sample of each
//! kind, encodes one frame and hands it to the transport.  The loop is
//! paced by an absolute-deadline [`Ticker`], so a slow cycle delays only
//! itself, never the schedule.

use std::sync::Arc;

use log::{debug, info};

use super::frame::{self, Frame};
use super::queue::{MotionQueue, PulseQueue};
use crate::app::ports::{Clock, Transport};
use crate::diagnostics::PipelineStats;
use crate::scheduler::Ticker;

/// What one aggregation cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A frame was encoded and passed to the transport.
    Sent { len: usize, flags: u8 },
    /// Both queues were empty; nothing emitted.
    Idle,
}

pub struct Aggregator<T: Transport> {
    motion: Arc<MotionQueue>,
    pulse: Arc<PulseQueue>,
    transport: T,
    stats: PipelineStats,
    stats_interval_cycles: u32,
}

impl<T: Transport> Aggregator<T> {
    pub fn new(motion: Arc<MotionQueue>, pulse: Arc<PulseQueue>, transport: T) -> Self {
        Self {
            motion,
            pulse,
            transport,
            stats: PipelineStats::default(),
            stats_interval_cycles: 250,
        }
    }

    /// Log a stats line every `cycles` cycles (0 disables).
    pub fn with_stats_interval(mut self, cycles: u32) -> Self {
        self.stats_interval_cycles = cycles;
        self
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one aggregation cycle.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let motion = self.motion.drain_latest();
        let pulse = self.pulse.drain_latest();

        self.stats.cycles += 1;
        self.stats.motion_dropped = self.motion.dropped();
        self.stats.pulse_dropped = self.pulse.dropped();

        let outcome = match Frame::from_samples(motion.as_ref(), pulse.as_ref()) {
            Some(frame) => {
                let bytes = frame::encode(&frame);
                if self.transport.send(&bytes) {
                    self.stats.frames_delivered += 1;
                }
                self.stats.frames_sent += 1;
                debug!(
                    "AGG: frame ts={} flags=0x{:02x} len={}",
                    frame.timestamp_ms,
                    frame.flags(),
                    bytes.len()
                );
                CycleOutcome::Sent { len: bytes.len(), flags: frame.flags() }
            }
            None => {
                self.stats.empty_cycles += 1;
                CycleOutcome::Idle
            }
        };

        if self.stats_interval_cycles > 0
            && self.stats.cycles % u64::from(self.stats_interval_cycles) == 0
        {
            info!("AGG: {}", self.stats);
        }
        outcome
    }

    /// Run forever at `period_ms`.  `heartbeat` is called after every
    /// cycle (watchdog feed on target).
    pub fn run<C: Clock>(&mut self, clock: &C, period_ms: u32, mut heartbeat: impl FnMut()) -> ! {
        let mut ticker = Ticker::new(period_ms, clock.now_ms());
        info!("AGG: running every {} ms", ticker.period_ms());
        loop {
            ticker.wait(clock);
            self.run_cycle();
            self.stats.overruns = ticker.overruns();
            heartbeat();
        }
    }
}
