//! Synthetic sensor sources for bench testing without hardware.
//!
//! - [`SimulatedImu`]: slow sinusoids on every axis, ~1 g on Z.
//! - [`SimulatedPulse`]: a `sin²` waveform at a fixed heart rate with a
//!   little deterministic noise, shaped so the default
//!   [`PulseDetector`](crate::telemetry::PulseDetector) locks onto it.

use core::f32::consts::PI;

use crate::app::ports::{MotionSource, PulseSignalSource};
use crate::error::SensorError;
use crate::telemetry::samples::MotionSample;

/// Phase advance per read (radians of the base oscillator).
const IMU_STEP: f32 = 0.05;

#[derive(Debug, Default)]
pub struct SimulatedImu {
    t: f32,
}

impl SimulatedImu {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MotionSource for SimulatedImu {
    fn read_motion(&mut self, now_ms: u64) -> Result<MotionSample, SensorError> {
        let t = self.t;
        let accel = [0.05 * (t * 2.0).sin(), 0.04 * (t * 1.3).sin(), 9.81 + 0.02 * (t * 0.7).sin()];
        let gyro = [(t * 1.1).sin(), 0.5 * (t * 0.9).sin(), 0.3 * (t * 1.7).sin()];
        self.t += IMU_STEP;
        Ok(MotionSample::from_physical(accel, gyro, now_ms))
    }
}

pub struct SimulatedPulse {
    bpm: f32,
    sample_period_ms: f32,
    base: f32,
    amplitude: f32,
    noise: f32,
    t_ms: f32,
    rng: u32,
}

impl SimulatedPulse {
    /// Waveform sampled every `sample_period_ms`, beating at `bpm`.
    pub fn new(bpm: f32, sample_period_ms: u32) -> Self {
        Self {
            bpm,
            sample_period_ms: sample_period_ms.max(1) as f32,
            base: 1800.0,
            amplitude: 1200.0,
            noise: 20.0,
            t_ms: 0.0,
            rng: 0x1234_5678,
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// xorshift32 mapped to [-0.5, 0.5).
    fn next_noise(&mut self) -> f32 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (x % 1000) as f32 / 1000.0 - 0.5
    }
}

impl PulseSignalSource for SimulatedPulse {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        // sin² has twice the frequency of sin, so half the phase rate.
        let phase = PI * (self.bpm / 60.0) * (self.t_ms / 1000.0);
        let s = phase.sin();
        let value = self.base + self.amplitude * s * s + self.next_noise() * self.noise;
        self.t_ms += self.sample_period_ms;
        Ok(value.clamp(0.0, f32::from(u16::MAX)) as u16)
    }
}
