//! One-shot hardware peripheral initialization.
//!
//! Configures the ADC1 oneshot unit for the analog pulse front end and
//! brings up the I2C master for the motion sensor.  Called once from
//! `main()` before the producer threads are spawned.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicPtr, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::error::SensorError;
#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    I2cInitFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::I2cInitFailed(rc) => write!(f, "I2C master init failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

impl From<HwInitError> for crate::error::Error {
    fn from(e: HwInitError) -> Self {
        match e {
            HwInitError::AdcInitFailed(_) => Self::Init("adc1"),
            HwInitError::I2cInitFailed(_) => Self::Init("i2c"),
        }
    }
}

// ── ADC (oneshot) ─────────────────────────────────────────────

/// Written once by `init_pulse_adc`, read by the pulse producer thread.
#[cfg(target_os = "espidf")]
static ADC1_HANDLE: AtomicPtr<adc_oneshot_unit_ctx_t> = AtomicPtr::new(core::ptr::null_mut());

#[cfg(target_os = "espidf")]
pub fn init_pulse_adc() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
    // SAFETY: called once at boot before any reader exists.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
    if ret != ESP_OK {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    // 12 dB attenuation gives the full 0 – 3.1 V range of the sensor.
    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    // SAFETY: `handle` was just created by adc_oneshot_new_unit.
    let ret = unsafe { adc_oneshot_config_channel(handle, pins::PULSE_ADC_CHANNEL, &chan_cfg) };
    if ret != ESP_OK {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    ADC1_HANDLE.store(handle, Ordering::Release);
    info!("hw_init: ADC1 configured (CH{}=pulse)", pins::PULSE_ADC_CHANNEL);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_pulse_adc() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ADC init skipped");
    Ok(())
}

/// Raw 12-bit reading from an ADC1 channel.
#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> Result<u16, SensorError> {
    let handle = ADC1_HANDLE.load(Ordering::Acquire);
    if handle.is_null() {
        return Err(SensorError::NotReady);
    }
    let mut raw: i32 = 0;
    // SAFETY: the handle stays valid for the device lifetime and only the
    // pulse producer thread reads from the unit.
    let ret = unsafe { adc_oneshot_read(handle, channel, &mut raw) };
    if ret != ESP_OK {
        return Err(SensorError::AdcReadFailed);
    }
    Ok(raw.clamp(0, 4095) as u16)
}

#[cfg(not(target_os = "espidf"))]
pub fn adc1_read(_channel: u32) -> Result<u16, SensorError> {
    Err(SensorError::NotReady)
}

// ── I2C master ────────────────────────────────────────────────

/// Bring up I2C0 on the motion sensor pins.
#[cfg(target_os = "espidf")]
pub fn init_motion_i2c(
    i2c: esp_idf_svc::hal::i2c::I2C0,
    sda: esp_idf_svc::hal::gpio::Gpio21,
    scl: esp_idf_svc::hal::gpio::Gpio22,
) -> Result<esp_idf_svc::hal::i2c::I2cDriver<'static>, HwInitError> {
    use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_svc::hal::units::Hertz;

    let config = I2cConfig::new().baudrate(Hertz(pins::I2C_BAUD_HZ));
    let driver = I2cDriver::new(i2c, sda, scl, &config)
        .map_err(|e| HwInitError::I2cInitFailed(e.code()))?;
    info!(
        "hw_init: I2C0 up (SDA={}, SCL={}, {} Hz)",
        pins::I2C_SDA_GPIO,
        pins::I2C_SCL_GPIO,
        pins::I2C_BAUD_HZ
    );
    Ok(driver)
}
