//! Bounded, non-blocking sample queues between producers and the aggregator.
//!
//! Built on `embassy-sync` bounded channels over a critical-section raw
//! mutex, shared between threads through an `Arc`.
//!
//! ```text
//! ┌────────────────┐  try_push   ┌──────────────┐  drain_all  ┌────────────┐
//! │ Motion/Pulse   │────────────▶│ SampleQueue  │────────────▶│ Aggregator │
//! │ producer task  │  (never     │  (cap N)     │  (newest    │ (50 Hz)    │
//! └────────────────┘   blocks)   └──────────────┘   kept)     └────────────┘
//! ```
//!
//! Full queue policy is **drop-newest**: the incoming sample is rejected and
//! counted, queued samples are untouched.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

use super::samples::{MotionSample, PulseSample};

/// Pulse queue depth.
pub const PULSE_QUEUE_CAPACITY: usize = 64;

/// Motion queue depth.
pub const MOTION_QUEUE_CAPACITY: usize = 32;

pub type PulseQueue = SampleQueue<PulseSample, PULSE_QUEUE_CAPACITY>;
pub type MotionQueue = SampleQueue<MotionSample, MOTION_QUEUE_CAPACITY>;

/// FIFO of at most `N` samples with a drop counter.
pub struct SampleQueue<T, const N: usize> {
    channel: Channel<CriticalSectionRawMutex, T, N>,
    dropped: AtomicU32,
}

impl<T, const N: usize> Default for SampleQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> SampleQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue without blocking.  Returns `false` (and counts a drop) when
    /// the queue is full.
    pub fn try_push(&self, sample: T) -> bool {
        if self.channel.try_send(sample).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Remove everything currently queued, oldest first.
    ///
    /// At most `N` items are taken per call; samples pushed concurrently
    /// beyond that stay queued for the next drain.
    pub fn drain_all(&self) -> Vec<T, N> {
        let mut out = Vec::new();
        for _ in 0..N {
            let Ok(sample) = self.channel.try_receive() else {
                break;
            };
            // Cannot fail: at most N iterations into a capacity-N vec.
            let _ = out.push(sample);
        }
        out
    }

    /// Drain and keep only the newest sample.
    pub fn drain_latest(&self) -> Option<T> {
        self.drain_all().pop()
    }

    /// Total samples rejected because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}
