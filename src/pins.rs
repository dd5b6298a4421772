//! GPIO / peripheral pin assignments for the ESP32 DevKit wearable board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// I²C bus (MPU6050 on a GY-521 breakout)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
/// Standard-mode I²C.
pub const I2C_BAUD_HZ: u32 = 100_000;

/// AD0 tied low on the GY-521.
pub const MPU6050_ADDR: u8 = 0x68;

// ---------------------------------------------------------------------------
// Sensors — Analog (ADC1)
// ---------------------------------------------------------------------------

/// Optical pulse sensor analog output.
/// ADC1 channel 0 (GPIO 36 / SENSOR_VP on ESP32).
pub const PULSE_ADC_GPIO: i32 = 36;
pub const PULSE_ADC_CHANNEL: u32 = 0;
