//! Vitalstream Firmware — Main Entry Point
//!
//! Two producer threads feed bounded queues; the main task aggregates them
//! into fixed-cadence frames and notifies them over BLE.  Writes from the
//! BLE peer drive the OTA receiver.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  core 1                        core 0 / main task              │
//! │                                                                │
//! │  MotionProducer ──▶ MotionQueue ──┐                            │
//! │  (MPU6050 / sim)                  ├──▶ Aggregator ──▶ BleLink  │
//! │  PulseProducer  ──▶ PulseQueue  ──┘    (+ watchdog)    │  ▲    │
//! │  (ADC / sim, PulseDetector)                    notify ◀─┘  │    │
//! │                                                  write ────┘    │
//! │                           OtaLinkHandler ◀── BleLink::on_write │
//! │                           OtaReceiver ──▶ FlashUpdateStorage   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use esp_idf_svc::hal::gpio::{Gpio21, Gpio22};
use esp_idf_svc::hal::i2c::{I2cDriver, I2C0};
use esp_idf_svc::hal::peripherals::Peripherals;

use vitalstream::adapters::ble::BleLink;
use vitalstream::adapters::nvs::ConfigStore;
use vitalstream::adapters::ota_storage::{self, DeviceRestart, FlashUpdateStorage};
use vitalstream::adapters::time::MonotonicClock;
use vitalstream::app::ports::{MotionSource, PulseSignalSource};
use vitalstream::config::TelemetryConfig;
use vitalstream::diagnostics;
use vitalstream::drivers::hw_init;
use vitalstream::drivers::task_pin::{spawn_on_core, Core};
use vitalstream::drivers::watchdog::Watchdog;
use vitalstream::ota::{OtaLinkHandler, OtaReceiver};
use vitalstream::pins;
use vitalstream::sensors::mpu6050::Mpu6050;
use vitalstream::sensors::pulse_adc::AdcPulseSource;
use vitalstream::sensors::simulated::{SimulatedImu, SimulatedPulse};
use vitalstream::sensors::{MotionProducer, PulseProducer};
use vitalstream::telemetry::{Aggregator, MotionQueue, PulseDetector, PulseQueue};

// ── Task layout ───────────────────────────────────────────────

const PRODUCER_PRIORITY: u8 = 5;
const PRODUCER_STACK_KB: usize = 4;

type BoxedMotion = Box<dyn MotionSource + Send>;
type BoxedPulse = Box<dyn PulseSignalSource + Send>;

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    diagnostics::install_panic_handler();

    info!("Vitalstream v{} booting", env!("CARGO_PKG_VERSION"));

    // Reaching main means the image boots; cancel any pending rollback.
    ota_storage::mark_running_image_valid();

    // ── Configuration ─────────────────────────────────────────
    let cfg = load_config().unwrap_or_else(|e| {
        warn!("NVS: {}, running with defaults and no persistence", e);
        TelemetryConfig::default()
    });
    match serde_json::to_string(&cfg) {
        Ok(json) => info!("Config: {}", json),
        Err(e) => warn!("Config: could not render as JSON ({})", e),
    }

    // ── Sources ───────────────────────────────────────────────
    let Peripherals { i2c0, pins: gpio, modem, .. } = Peripherals::take()?;
    let (motion_source, pulse_source) = if cfg.use_simulated_sensors {
        info!("Sensors: simulated ({} bpm)", cfg.simulated_bpm);
        simulated_sources(&cfg)
    } else {
        let motion: BoxedMotion = match init_mpu6050(i2c0, gpio.gpio21, gpio.gpio22) {
            Ok(imu) => Box::new(imu),
            Err(e) => {
                warn!("MPU6050: {}, falling back to simulated motion", e);
                Box::new(SimulatedImu::new())
            }
        };
        let pulse: BoxedPulse = match init_pulse_source() {
            Ok(src) => Box::new(src),
            Err(e) => {
                warn!("PULSE: {}, falling back to simulated waveform", e);
                Box::new(SimulatedPulse::new(cfg.simulated_bpm, cfg.pulse_sample_period_ms))
            }
        };
        (motion, pulse)
    };

    // ── Producers ─────────────────────────────────────────────
    let motion_queue = Arc::new(MotionQueue::new());
    let pulse_queue = Arc::new(PulseQueue::new());

    {
        let queue = Arc::clone(&motion_queue);
        let period = cfg.motion_period_ms;
        spawn_on_core(Core::App, PRODUCER_PRIORITY, PRODUCER_STACK_KB, "imu\0", move || {
            MotionProducer::new(motion_source, queue).run(&MonotonicClock::new(), period)
        })?;
    }
    {
        let queue = Arc::clone(&pulse_queue);
        let period = cfg.pulse_sample_period_ms;
        let detector = PulseDetector::new(cfg.pulse);
        spawn_on_core(Core::App, PRODUCER_PRIORITY, PRODUCER_STACK_KB, "pulse\0", move || {
            PulseProducer::new(pulse_source, detector, queue).run(&MonotonicClock::new(), period)
        })?;
    }

    // ── BLE link + OTA ────────────────────────────────────────
    let link = Arc::new(BleLink::new(cfg.device_name.clone()));
    link.set_inbound_handler(Box::new(OtaLinkHandler::new(
        OtaReceiver::new(FlashUpdateStorage::new()),
        DeviceRestart,
        cfg.restart_delay_ms,
    )));
    link.start(modem)?;

    info!("Boot complete, free heap {} bytes", diagnostics::free_heap_bytes());

    // ── Aggregator (main task) ────────────────────────────────
    let watchdog = Watchdog::default();
    let clock = MonotonicClock::new();
    let mut aggregator = Aggregator::new(motion_queue, pulse_queue, Arc::clone(&link))
        .with_stats_interval(cfg.stats_interval_cycles);
    aggregator.run(&clock, cfg.frame_period_ms, || watchdog.feed())
}

fn simulated_sources(cfg: &TelemetryConfig) -> (BoxedMotion, BoxedPulse) {
    (
        Box::new(SimulatedImu::new()),
        Box::new(SimulatedPulse::new(cfg.simulated_bpm, cfg.pulse_sample_period_ms)),
    )
}

// ── Bring-up helpers ──────────────────────────────────────────

fn load_config() -> vitalstream::error::Result<TelemetryConfig> {
    let mut store = ConfigStore::new()?;
    Ok(store.load_or_init())
}

fn init_mpu6050(
    i2c: I2C0,
    sda: Gpio21,
    scl: Gpio22,
) -> vitalstream::error::Result<Mpu6050<I2cDriver<'static>>> {
    let i2c = hw_init::init_motion_i2c(i2c, sda, scl)?;
    let mut imu = Mpu6050::new(i2c, pins::MPU6050_ADDR);
    imu.init()?;
    Ok(imu)
}

fn init_pulse_source() -> vitalstream::error::Result<AdcPulseSource> {
    hw_init::init_pulse_adc()?;
    Ok(AdcPulseSource::new(pins::PULSE_ADC_CHANNEL))
}
