//! Sample types produced by the sensor tasks.

/// Fixed-point scale: wire units are physical value × 100.
pub const FIXED_POINT_SCALE: f32 = 100.0;

/// One accepted heart beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseSample {
    pub bpm: u16,
    pub timestamp_ms: u64,
}

/// One six-axis reading in fixed point (m/s² × 100, °/s × 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionSample {
    pub ax: i16,
    pub ay: i16,
    pub az: i16,
    pub gx: i16,
    pub gy: i16,
    pub gz: i16,
    pub timestamp_ms: u64,
}

impl MotionSample {
    /// Convert physical readings (m/s², °/s) into fixed point.
    ///
    /// Rounds to nearest and saturates at the `i16` range; NaN maps to 0.
    pub fn from_physical(accel: [f32; 3], gyro: [f32; 3], timestamp_ms: u64) -> Self {
        Self {
            ax: to_fixed(accel[0]),
            ay: to_fixed(accel[1]),
            az: to_fixed(accel[2]),
            gx: to_fixed(gyro[0]),
            gy: to_fixed(gyro[1]),
            gz: to_fixed(gyro[2]),
            timestamp_ms,
        }
    }

    /// Axes in wire order.
    pub fn axes(&self) -> [i16; 6] {
        [self.ax, self.ay, self.az, self.gx, self.gy, self.gz]
    }
}

fn to_fixed(value: f32) -> i16 {
    // `as` saturates and maps NaN to 0.
    (value * FIXED_POINT_SCALE).round() as i16
}
