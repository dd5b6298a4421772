//! Unified error types for the vitalstream firmware.
//!
//! Each subsystem owns a small `Copy` error enum.  The ones that can fail
//! bring-up (sensors, peripheral init, config) convert into the top-level
//! [`Error`] that `main`'s bootstrap helpers return.  Once running none of
//! these are fatal: producers retry, the OTA receiver resets its session,
//! and the transport drops frames.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Bring-up failure.  `main` logs it and falls back (simulated source,
/// default config) instead of aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor did not respond as expected during init.
    Sensor(SensorError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The I2C transaction with the motion sensor failed.
    BusFailed,
    /// The device answered with an unexpected identity.
    WrongDevice(u8),
    /// ADC read returned an error or timed out.
    AdcReadFailed,
    /// The source has not been initialised yet.
    NotReady,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusFailed => write!(f, "I2C transaction failed"),
            Self::WrongDevice(id) => write!(f, "unexpected WHO_AM_I 0x{id:02x}"),
            Self::AdcReadFailed => write!(f, "ADC read failed"),
            Self::NotReady => write!(f, "sensor not initialised"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Update storage errors
// ---------------------------------------------------------------------------

/// Failures reported by an [`UpdateStorage`](crate::app::ports::UpdateStorage)
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// No inactive partition is available for the new image.
    NoPartition,
    /// Opening the update session failed.
    BeginFailed,
    /// Writing a chunk to flash failed.
    WriteFailed,
    /// The image failed verification when closing the session.
    VerifyFailed,
    /// Marking the new image bootable failed.
    ActivateFailed,
    /// An operation was attempted without an open session.
    NotOpen,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPartition => write!(f, "no inactive OTA partition available"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::VerifyFailed => write!(f, "OTA image verification failed"),
            Self::ActivateFailed => write!(f, "set boot partition failed"),
            Self::NotOpen => write!(f, "no update session open"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// `Result` alias for bring-up paths.
pub type Result<T> = core::result::Result<T, Error>;
