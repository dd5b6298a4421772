//! Port traits: the hexagonal boundary between the pipeline and the outside world.
//!
//! ```text
//!   MotionSource ──┐                        ┌──▶ Transport (BLE notify)
//!                  ├──▶ queues ──▶ Aggregator
//!   PulseSignal ───┘
//!
//!   Transport (BLE write) ──▶ InboundHandler ──▶ OtaReceiver ──▶ UpdateStorage
//! ```
//!
//! Driven adapters (sensors, BLE, flash, clock) implement these traits.
//! The pipeline consumes them via generics, so the core never touches
//! hardware directly and every port has an in-memory fake for host tests.

use std::sync::Arc;

use crate::config::TelemetryConfig;
use crate::error::{SensorError, StorageError};
use crate::telemetry::samples::MotionSample;

// ───────────────────────────────────────────────────────────────
// Sensor ports (driven adapter: hardware → pipeline)
// ───────────────────────────────────────────────────────────────

/// Six-axis motion source.  Calibration, if any, happens inside.
pub trait MotionSource {
    /// Read one sample, stamped with `now_ms`.
    fn read_motion(&mut self, now_ms: u64) -> Result<MotionSample, SensorError>;
}

/// Raw analog pulse front end.
pub trait PulseSignalSource {
    /// Read one raw amplitude value (ADC counts).
    fn read_raw(&mut self) -> Result<u16, SensorError>;
}

// Boxed sources let `main` pick real or simulated hardware at runtime.

impl<T: MotionSource + ?Sized> MotionSource for Box<T> {
    fn read_motion(&mut self, now_ms: u64) -> Result<MotionSample, SensorError> {
        (**self).read_motion(now_ms)
    }
}

impl<T: PulseSignalSource + ?Sized> PulseSignalSource for Box<T> {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        (**self).read_raw()
    }
}

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: pipeline ↔ BLE peer)
// ───────────────────────────────────────────────────────────────

/// Connection-oriented notify channel.
///
/// `send` takes `&self`: the aggregator calls it while inbound callbacks
/// fire on the BLE host task, so implementations own their synchronisation.
pub trait Transport {
    /// Best-effort send.  Returns `true` only when the frame was handed to
    /// the radio; with no peer, an oversized frame or a failed notify it
    /// is dropped and `false` comes back.
    fn send(&self, frame: &[u8]) -> bool;

    fn is_connected(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, frame: &[u8]) -> bool {
        (**self).send(frame)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, frame: &[u8]) -> bool {
        (**self).send(frame)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Receives bytes written by the peer.  Installed on the transport.
pub trait InboundHandler: Send {
    fn on_receive(&mut self, bytes: &[u8]);

    /// The peer went away.  Default: nothing to clean up.
    fn on_peer_disconnected(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Update storage port (driven adapter: OTA receiver → flash)
// ───────────────────────────────────────────────────────────────

/// Append-only firmware image sink.
///
/// A partial image must never become bootable: only a successful
/// [`commit_and_activate`](Self::commit_and_activate) switches the boot slot.
pub trait UpdateStorage {
    /// Open a fresh image on the inactive slot.
    fn begin_update(&mut self) -> Result<(), StorageError>;

    /// Append a chunk to the open image.
    fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError>;

    /// Verify the image and mark it as the next boot target.
    fn commit_and_activate(&mut self) -> Result<(), StorageError>;

    /// Discard a partially written image.  Default: nothing to discard.
    fn abort_update(&mut self) {}
}

/// Deferred device restart, requested after a committed update.
pub trait RestartPort: Send {
    fn schedule_restart(&mut self, delay_ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock with absolute-deadline sleep.
pub trait Clock {
    fn now_ms(&self) -> u64;

    /// Block until `deadline_ms`.  Returns immediately if it already passed.
    fn sleep_until_ms(&self, deadline_ms: u64);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn sleep_until_ms(&self, deadline_ms: u64) {
        (**self).sleep_until_ms(deadline_ms);
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: pipeline ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`TelemetryConfig`].
///
/// Implementations MUST call [`TelemetryConfig::validate`] before
/// persisting.  Invalid ranges are rejected, not silently clamped.
pub trait ConfigPort {
    /// Returns [`ConfigError::NotFound`] on first boot.
    fn load(&self) -> Result<TelemetryConfig, ConfigError>;

    fn save(&mut self, config: &TelemetryConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored blob failed to deserialize.
    Corrupted,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::NotFound => Self::Config("not found"),
            ConfigError::Corrupted => Self::Config("corrupted"),
            ConfigError::IoError => Self::Config("storage I/O"),
        }
    }
}
