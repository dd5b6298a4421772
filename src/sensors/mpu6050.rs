//! MPU6050 6-axis IMU driver (GY-521 breakout).
//!
//! Register-level driver over any `embedded_hal::i2c::I2c` bus.  Default
//! full-scale ranges are kept (±2 g, ±250 °/s).  X and Y are swapped on
//! both sensors to match the axes printed on the GY-521 board.

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::app::ports::MotionSource;
use crate::error::SensorError;
use crate::telemetry::samples::MotionSample;

pub const DEFAULT_ADDR: u8 = 0x68;

const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

/// WHO_AM_I values of the MPU6050 and the MPU6500-family parts sold on
/// GY-521 clones.
const KNOWN_IDS: [u8; 3] = [0x68, 0x70, 0x72];

/// LSB per g at ±2 g.
const ACCEL_LSB_PER_G: f32 = 16_384.0;
/// LSB per °/s at ±250 °/s.
const GYRO_LSB_PER_DPS: f32 = 131.0;
const STANDARD_GRAVITY: f32 = 9.806_65;

pub struct Mpu6050<I2C> {
    i2c: I2C,
    addr: u8,
    ready: bool,
}

impl<I2C: I2c> Mpu6050<I2C> {
    pub fn new(i2c: I2C, addr: u8) -> Self {
        Self { i2c, addr, ready: false }
    }

    /// Check the device identity and wake it from sleep.
    pub fn init(&mut self) -> Result<(), SensorError> {
        let mut id = [0u8; 1];
        self.i2c
            .write_read(self.addr, &[REG_WHO_AM_I], &mut id)
            .map_err(|_| SensorError::BusFailed)?;
        if !KNOWN_IDS.contains(&id[0]) {
            warn!("MPU6050: unexpected WHO_AM_I 0x{:02x}", id[0]);
            return Err(SensorError::WrongDevice(id[0]));
        }
        self.i2c
            .write(self.addr, &[REG_PWR_MGMT_1, 0x00])
            .map_err(|_| SensorError::BusFailed)?;
        self.ready = true;
        info!("MPU6050: awake at 0x{:02x} (id 0x{:02x})", self.addr, id[0]);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Burst-read accel + temp + gyro and convert to m/s² and °/s.
    pub fn read_physical(&mut self) -> Result<([f32; 3], [f32; 3]), SensorError> {
        if !self.ready {
            return Err(SensorError::NotReady);
        }
        let mut raw = [0u8; 14];
        self.i2c
            .write_read(self.addr, &[REG_ACCEL_XOUT_H], &mut raw)
            .map_err(|_| SensorError::BusFailed)?;

        let word = |i: usize| f32::from(i16::from_be_bytes([raw[i], raw[i + 1]]));
        let (ax, ay, az) = (word(0), word(2), word(4));
        // raw[6..8] is the die temperature.
        let (gx, gy, gz) = (word(8), word(10), word(12));

        let g = STANDARD_GRAVITY / ACCEL_LSB_PER_G;
        let accel = [ay * g, ax * g, az * g];
        let gyro = [gy / GYRO_LSB_PER_DPS, gx / GYRO_LSB_PER_DPS, gz / GYRO_LSB_PER_DPS];
        Ok((accel, gyro))
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> MotionSource for Mpu6050<I2C> {
    fn read_motion(&mut self, now_ms: u64) -> Result<MotionSample, SensorError> {
        let (accel, gyro) = self.read_physical()?;
        Ok(MotionSample::from_physical(accel, gyro, now_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    /// Register-file fake: a write sets the pointer (and value when two
    /// bytes are written); a read returns consecutive registers.
    struct FakeBus {
        regs: [u8; 128],
        pointer: usize,
        fail: bool,
    }

    impl FakeBus {
        fn new(who_am_i: u8) -> Self {
            let mut regs = [0u8; 128];
            regs[usize::from(REG_WHO_AM_I)] = who_am_i;
            regs[usize::from(REG_PWR_MGMT_1)] = 0x40; // sleep bit set at power-on
            Self { regs, pointer: 0, fail: false }
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(&mut self, addr: u8, ops: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
            if self.fail || addr != DEFAULT_ADDR {
                return Err(ErrorKind::Other);
            }
            for op in ops {
                match op {
                    Operation::Write(bytes) => {
                        self.pointer = usize::from(bytes[0]);
                        for (i, b) in bytes[1..].iter().enumerate() {
                            self.regs[self.pointer + i] = *b;
                        }
                    }
                    Operation::Read(buf) => {
                        let n = buf.len();
                        buf.copy_from_slice(&self.regs[self.pointer..self.pointer + n]);
                    }
                }
            }
            Ok(())
        }
    }

    fn put_be(regs: &mut [u8], at: u8, v: i16) {
        regs[usize::from(at)..usize::from(at) + 2].copy_from_slice(&v.to_be_bytes());
    }

    #[test]
    fn init_wakes_the_chip() {
        let mut imu = Mpu6050::new(FakeBus::new(0x68), DEFAULT_ADDR);
        imu.init().unwrap();
        assert!(imu.is_ready());
        assert_eq!(imu.release().regs[usize::from(REG_PWR_MGMT_1)], 0x00);
    }

    #[test]
    fn unknown_identity_is_rejected() {
        let mut imu = Mpu6050::new(FakeBus::new(0x12), DEFAULT_ADDR);
        assert_eq!(imu.init(), Err(SensorError::WrongDevice(0x12)));
        assert_eq!(imu.read_motion(0), Err(SensorError::NotReady));
    }

    #[test]
    fn burst_converts_with_xy_swap() {
        let mut bus = FakeBus::new(0x68);
        put_be(&mut bus.regs, 0x3B, 0); // accel X
        put_be(&mut bus.regs, 0x3D, 8192); // accel Y = 0.5 g
        put_be(&mut bus.regs, 0x3F, 16_384); // accel Z = 1 g
        put_be(&mut bus.regs, 0x43, 131); // gyro X = 1 °/s
        put_be(&mut bus.regs, 0x45, -262); // gyro Y = -2 °/s
        put_be(&mut bus.regs, 0x47, 0);
        let mut imu = Mpu6050::new(bus, DEFAULT_ADDR);
        imu.init().unwrap();

        let s = imu.read_motion(500).unwrap();
        // Y lands on X and vice versa.
        assert_eq!(s.ax, 490); // 0.5 g = 4.903 m/s²
        assert_eq!(s.ay, 0);
        assert_eq!(s.az, 981);
        assert_eq!(s.gx, -200);
        assert_eq!(s.gy, 100);
        assert_eq!(s.gz, 0);
        assert_eq!(s.timestamp_ms, 500);
    }

    #[test]
    fn bus_failure_maps_to_sensor_error() {
        let mut imu = Mpu6050::new(FakeBus::new(0x68), DEFAULT_ADDR);
        imu.init().unwrap();
        let mut bus = imu.release();
        bus.fail = true;
        let mut imu = Mpu6050 { i2c: bus, addr: DEFAULT_ADDR, ready: true };
        assert_eq!(imu.read_motion(0), Err(SensorError::BusFailed));
    }
}
