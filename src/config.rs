//! Runtime configuration parameters
//!
//! All tunable parameters for the telemetry pipeline and the OTA receiver.
//! Values are persisted as a postcard blob in NVS (see
//! [`ConfigStore`](crate::adapters::nvs::ConfigStore)) and fall back to
//! [`TelemetryConfig::default`] when missing or invalid.

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::telemetry::pulse::PulseDetectorConfig;

/// Longest advertised BLE device name we accept.
pub const DEVICE_NAME_MAX: usize = 24;

/// Core telemetry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    // --- Cadence ---
    /// Aggregator period (milliseconds). 20 ms = 50 frames/s.
    pub frame_period_ms: u32,
    /// Motion producer period (milliseconds)
    pub motion_period_ms: u32,
    /// Pulse ADC sampling period (milliseconds)
    pub pulse_sample_period_ms: u32,

    // --- Pulse detection ---
    pub pulse: PulseDetectorConfig,

    // --- OTA ---
    /// Delay between a successful commit and the device restart
    pub restart_delay_ms: u32,

    // --- Diagnostics ---
    /// Aggregator cycles between two `PipelineStats` log lines
    pub stats_interval_cycles: u32,

    // --- Sources ---
    /// Use the synthetic IMU / pulse generators instead of real hardware
    pub use_simulated_sensors: bool,
    /// Heart rate produced by the simulated pulse waveform
    pub simulated_bpm: f32,

    // --- BLE ---
    pub device_name: String<DEVICE_NAME_MAX>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let mut device_name = String::new();
        // Fits: 11 bytes into a 24-byte buffer.
        let _ = device_name.push_str("VitalStream");
        Self {
            // Cadence
            frame_period_ms: 20,        // 50 Hz
            motion_period_ms: 20,       // 50 Hz
            pulse_sample_period_ms: 10, // 100 Hz

            pulse: PulseDetectorConfig::default(),

            restart_delay_ms: 1000,
            stats_interval_cycles: 250, // ~5 s at 50 Hz

            use_simulated_sensors: false,
            simulated_bpm: 72.0,

            device_name,
        }
    }
}

impl TelemetryConfig {
    /// Range-check every field.
    ///
    /// Invalid values are rejected, not clamped: a config that fails here is
    /// never persisted and is replaced by the defaults at boot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(5..=1000).contains(&self.frame_period_ms) {
            return Err(ConfigError::ValidationFailed("frame_period_ms must be 5..=1000"));
        }
        if !(5..=1000).contains(&self.motion_period_ms) {
            return Err(ConfigError::ValidationFailed("motion_period_ms must be 5..=1000"));
        }
        if !(1..=100).contains(&self.pulse_sample_period_ms) {
            return Err(ConfigError::ValidationFailed("pulse_sample_period_ms must be 1..=100"));
        }
        if self.restart_delay_ms > 10_000 {
            return Err(ConfigError::ValidationFailed("restart_delay_ms must be <= 10000"));
        }
        if self.stats_interval_cycles == 0 {
            return Err(ConfigError::ValidationFailed("stats_interval_cycles must be > 0"));
        }
        if !(30.0..=220.0).contains(&self.simulated_bpm) {
            return Err(ConfigError::ValidationFailed("simulated_bpm must be 30..=220"));
        }
        if self.device_name.is_empty() {
            return Err(ConfigError::ValidationFailed("device_name must not be empty"));
        }
        self.pulse.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = TelemetryConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.frame_period_ms, 20);
        assert_eq!(c.restart_delay_ms, 1000);
        assert_eq!(c.device_name.as_str(), "VitalStream");
    }

    #[test]
    fn pulse_sampling_faster_than_frames() {
        let c = TelemetryConfig::default();
        assert!(
            c.pulse_sample_period_ms < c.frame_period_ms,
            "beat detection needs several raw samples per frame"
        );
        assert!(c.motion_period_ms <= c.frame_period_ms);
    }

    #[test]
    fn zero_frame_period_rejected() {
        let c = TelemetryConfig { frame_period_ms: 0, ..TelemetryConfig::default() };
        assert!(matches!(c.validate(), Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn empty_device_name_rejected() {
        let c = TelemetryConfig { device_name: String::new(), ..TelemetryConfig::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn nested_pulse_config_is_validated() {
        let mut c = TelemetryConfig::default();
        c.pulse.bpm_min = 200;
        c.pulse.bpm_max = 100;
        assert!(c.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let c = TelemetryConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: TelemetryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn postcard_roundtrip() {
        let mut c = TelemetryConfig::default();
        c.use_simulated_sensors = true;
        c.pulse.refractory_ms = 300;
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: TelemetryConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c, c2);
    }
}
