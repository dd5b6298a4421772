//! Heart-beat detection on a raw analog pulse stream.
//!
//! An adaptive threshold tracks the signal baseline with a slow EMA; a beat
//! is a rising crossing of `baseline + margin`.  Hysteresis re-arms the
//! detector only once the signal falls back under the baseline, and a
//! refractory window rejects crossings that come too soon after the last.
//!
//! ```text
//!   raw ─┐      ╱╲            ╱╲
//!        │     ╱  ╲          ╱  ╲        ── baseline + margin
//!        │    ╱    ╲        ╱    ╲
//!        │ ──╱──────╲──────╱──────╲───   ── baseline
//!              ▲ beat         ▲ beat
//!              └── interval ──┘  → 60000 / interval = instant BPM
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

use super::samples::PulseSample;
use crate::app::ports::ConfigError;

/// Tunables for [`PulseDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseDetectorConfig {
    /// Counts above the baseline that count as a rising edge.
    pub margin: f32,
    /// Minimum interval between two accepted beats (ms).
    pub refractory_ms: u32,
    /// Weight of the previous baseline in the EMA (0..1).
    pub baseline_weight: f32,
    /// Weight of the previous smoothed BPM (0..1).
    pub smoothing_weight: f32,
    /// Baseline before any sample has been seen (ADC counts).
    pub initial_baseline: f32,
    pub bpm_min: u16,
    pub bpm_max: u16,
}

impl Default for PulseDetectorConfig {
    fn default() -> Self {
        Self {
            margin: 250.0,
            refractory_ms: 250,
            baseline_weight: 0.95,
            smoothing_weight: 0.8,
            initial_baseline: 2000.0,
            bpm_min: 30,
            bpm_max: 220,
        }
    }
}

impl PulseDetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.margin > 0.0) {
            return Err(ConfigError::ValidationFailed("pulse.margin must be > 0"));
        }
        if !(100..=2000).contains(&self.refractory_ms) {
            return Err(ConfigError::ValidationFailed("pulse.refractory_ms must be 100..=2000"));
        }
        if !(self.baseline_weight > 0.0 && self.baseline_weight < 1.0) {
            return Err(ConfigError::ValidationFailed("pulse.baseline_weight must be in (0, 1)"));
        }
        if !(0.0..1.0).contains(&self.smoothing_weight) {
            return Err(ConfigError::ValidationFailed("pulse.smoothing_weight must be in [0, 1)"));
        }
        if !self.initial_baseline.is_finite() || self.initial_baseline < 0.0 {
            return Err(ConfigError::ValidationFailed("pulse.initial_baseline must be >= 0"));
        }
        if self.bpm_min < 20 || self.bpm_max > 300 || self.bpm_min >= self.bpm_max {
            return Err(ConfigError::ValidationFailed("pulse bpm range must satisfy 20 <= min < max <= 300"));
        }
        Ok(())
    }
}

/// Streaming beat detector.  Feed it every raw sample, in time order.
#[derive(Debug, Clone)]
pub struct PulseDetector {
    cfg: PulseDetectorConfig,
    baseline: f32,
    above_threshold: bool,
    last_beat_ms: Option<u64>,
    /// `None` until the first valid interval seeds it.
    smoothed_bpm: Option<f32>,
}

impl PulseDetector {
    pub fn new(cfg: PulseDetectorConfig) -> Self {
        Self {
            baseline: cfg.initial_baseline,
            cfg,
            above_threshold: false,
            last_beat_ms: None,
            smoothed_bpm: None,
        }
    }

    pub fn config(&self) -> &PulseDetectorConfig {
        &self.cfg
    }

    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    pub fn is_above_threshold(&self) -> bool {
        self.above_threshold
    }

    /// Back to the power-on state.
    pub fn reset(&mut self) {
        *self = Self::new(self.cfg);
    }

    /// Process one raw reading taken at `t_ms`.  Returns a sample when a
    /// beat is accepted.
    pub fn feed(&mut self, raw: u16, t_ms: u64) -> Option<PulseSample> {
        let r = f32::from(raw);
        let w = self.cfg.baseline_weight;
        self.baseline = w * self.baseline + (1.0 - w) * r;

        if !self.above_threshold && r > self.baseline + self.cfg.margin {
            self.above_threshold = true;
            let beat = self.last_beat_ms.and_then(|last| self.on_crossing(last, t_ms));
            // Every crossing re-arms the interval, accepted or not.
            self.last_beat_ms = Some(t_ms);
            return beat;
        }

        if self.above_threshold && r < self.baseline {
            self.above_threshold = false;
        }
        None
    }

    fn on_crossing(&mut self, last_ms: u64, t_ms: u64) -> Option<PulseSample> {
        let interval = t_ms.checked_sub(last_ms).filter(|&iv| iv > 0)?;
        if interval < u64::from(self.cfg.refractory_ms) {
            debug!("PULSE: crossing {} ms after last, inside refractory window", interval);
            return None;
        }

        let lo = f32::from(self.cfg.bpm_min);
        let hi = f32::from(self.cfg.bpm_max);
        let instant = (60_000.0 / interval as f32).clamp(lo, hi);
        let s = self.cfg.smoothing_weight;
        let smoothed = match self.smoothed_bpm {
            Some(prev) => s * prev + (1.0 - s) * instant,
            None => instant,
        };
        self.smoothed_bpm = Some(smoothed);

        let bpm = smoothed.round().clamp(lo, hi) as u16;
        Some(PulseSample { bpm, timestamp_ms: t_ms })
    }
}

impl Default for PulseDetector {
    fn default() -> Self {
        Self::new(PulseDetectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOW: u16 = 2000;
    const HIGH: u16 = 3000;

    /// Square-ish wave: one HIGH sample per beat, LOW otherwise, 10 ms steps.
    fn run_beats(det: &mut PulseDetector, interval_ms: u64, beats: u64) -> Vec<PulseSample> {
        let mut out = Vec::new();
        let steps = interval_ms / 10 * beats;
        for i in 0..=steps {
            let t = 1000 + i * 10;
            let raw = if (t - 1000) % interval_ms == 0 { HIGH } else { LOW };
            if let Some(s) = det.feed(raw, t) {
                out.push(s);
            }
        }
        out
    }

    #[test]
    fn steady_800ms_beats_give_75_bpm() {
        let mut det = PulseDetector::default();
        let out = run_beats(&mut det, 800, 6);
        assert_eq!(out.len(), 6, "first crossing only arms");
        assert!(out.iter().all(|s| s.bpm == 75));
        assert_eq!(out[0].timestamp_ms, 1800);
    }

    #[test]
    fn first_crossing_only_arms() {
        let mut det = PulseDetector::default();
        assert_eq!(det.feed(HIGH, 0), None);
        assert!(det.is_above_threshold());
    }

    #[test]
    fn crossing_inside_refractory_is_suppressed_but_rearms() {
        let mut det = PulseDetector::default();
        assert_eq!(det.feed(HIGH, 0), None);
        assert_eq!(det.feed(LOW, 50), None);
        // 200 ms after the first crossing: too soon.
        assert_eq!(det.feed(HIGH, 200), None);
        assert_eq!(det.feed(LOW, 250), None);
        // 600 ms after the suppressed crossing: accepted against it.
        let s = det.feed(HIGH, 800).unwrap();
        assert_eq!(s.bpm, 100);
    }

    #[test]
    fn no_retrigger_while_above_threshold() {
        let mut det = PulseDetector::default();
        det.feed(HIGH, 0);
        det.feed(LOW, 10);
        assert!(det.feed(HIGH, 1000).is_some());
        // Still high 500 ms later: no new rising edge.
        assert_eq!(det.feed(HIGH, 1500), None);
    }

    #[test]
    fn smoothing_blends_toward_new_rate() {
        let mut det = PulseDetector::default();
        det.feed(HIGH, 0);
        det.feed(LOW, 10);
        assert_eq!(det.feed(HIGH, 1000).unwrap().bpm, 60);
        det.feed(LOW, 1010);
        // instant 120, smoothed 0.8*60 + 0.2*120 = 72
        assert_eq!(det.feed(HIGH, 1500).unwrap().bpm, 72);
    }

    #[test]
    fn long_gap_is_clamped_to_minimum() {
        let mut det = PulseDetector::default();
        det.feed(HIGH, 0);
        det.feed(LOW, 10);
        // 10 s gap → 6 bpm instant, clamped to 30.
        assert_eq!(det.feed(HIGH, 10_000).unwrap().bpm, 30);
    }

    #[test]
    fn non_monotonic_time_never_emits() {
        let mut det = PulseDetector::default();
        det.feed(HIGH, 5000);
        det.feed(LOW, 5010);
        assert_eq!(det.feed(HIGH, 4000), None);
        det.feed(LOW, 4010);
        assert_eq!(det.feed(HIGH, 4000), None, "zero interval never divides");
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut det = PulseDetector::default();
        det.feed(HIGH, 0);
        det.reset();
        assert!(!det.is_above_threshold());
        assert!((det.baseline() - 2000.0).abs() < f32::EPSILON);
        assert_eq!(det.feed(HIGH, 1000), None, "reset clears the armed beat");
    }

    #[test]
    fn default_config_is_valid_and_bad_ranges_are_not() {
        assert!(PulseDetectorConfig::default().validate().is_ok());
        let bad = PulseDetectorConfig { refractory_ms: 0, ..PulseDetectorConfig::default() };
        assert!(bad.validate().is_err());
        let bad = PulseDetectorConfig { margin: f32::NAN, ..PulseDetectorConfig::default() };
        assert!(bad.validate().is_err());
    }
}
