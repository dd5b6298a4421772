//! Telemetry pipeline: sample queues, beat detection, framing, aggregation.
//!
//! ```text
//!  motion producer ──▶ MotionQueue (32) ─┐
//!                                        ├──▶ Aggregator ──▶ encode ──▶ Transport
//!  pulse producer ──▶ PulseDetector ──▶ PulseQueue (64) ─┘   (every P ms)
//! ```
//!
//! Everything here is pure logic over the port traits and runs unchanged
//! on the host.

pub mod aggregator;
pub mod frame;
pub mod pulse;
pub mod queue;
pub mod samples;

pub use aggregator::{Aggregator, CycleOutcome};
pub use frame::{decode, encode, Frame, FrameError};
pub use pulse::{PulseDetector, PulseDetectorConfig};
pub use queue::{MotionQueue, PulseQueue, SampleQueue};
pub use samples::{MotionSample, PulseSample};
