//! Application core boundary.
//!
//! The pipeline itself lives in [`crate::telemetry`] and [`crate::ota`];
//! this module only holds the **port traits** those cores are generic
//! over, keeping them fully testable without real peripherals.

pub mod ports;
