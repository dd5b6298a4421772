//! Analog pulse front end (ADC1 oneshot).
//!
//! On ESP-IDF the raw 12-bit reading comes from the oneshot unit set up in
//! [`hw_init`](crate::drivers::hw_init).  On host the level is an atomic
//! that tests or a simulation harness drive through [`PulseLevel`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::app::ports::PulseSignalSource;
use crate::error::SensorError;

/// Shared handle to the injected host-side ADC level.
#[derive(Debug, Clone, Default)]
pub struct PulseLevel(Arc<AtomicU16>);

impl PulseLevel {
    pub fn set(&self, raw: u16) {
        self.0.store(raw, Ordering::Relaxed);
    }

    pub fn get(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct AdcPulseSource {
    channel: u32,
    #[cfg(not(target_os = "espidf"))]
    level: PulseLevel,
}

impl AdcPulseSource {
    pub fn new(channel: u32) -> Self {
        Self {
            channel,
            #[cfg(not(target_os = "espidf"))]
            level: PulseLevel::default(),
        }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Handle for driving the simulated ADC input.
    #[cfg(not(target_os = "espidf"))]
    pub fn level(&self) -> PulseLevel {
        self.level.clone()
    }
}

impl PulseSignalSource for AdcPulseSource {
    #[cfg(target_os = "espidf")]
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        crate::drivers::hw_init::adc1_read(self.channel)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        Ok(self.level.get())
    }
}
