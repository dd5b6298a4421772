//! Vitalstream firmware library.
//!
//! Exposes the pure-logic modules for integration testing, fuzzing and
//! host tooling. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

#[cfg(all(target_os = "espidf", not(feature = "espidf")))]
compile_error!("building for ESP-IDF requires `--features espidf`");

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ota;
pub mod pins;
pub mod scheduler;
pub mod telemetry;

// Hardware-facing modules; the ESP-IDF halves are cfg-gated inside, the
// host halves are simulation stubs.
pub mod adapters;
pub mod drivers;
pub mod sensors;

// Unit tests link the std critical-section implementation for the queues.
#[cfg(test)]
use critical_section as _;
