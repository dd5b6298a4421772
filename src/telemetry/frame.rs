//! Telemetry frame codec.
//!
//! Wire format (little-endian, 11..=25 bytes):
//!
//! ```text
//!  offset  size      field
//!  ──────  ────────  ───────────────────────────────────────────────
//!  0       1         flags   bit7 = motion present, bit6 = pulse present,
//!                            bits0-5 reserved (zero)
//!  1       8         timestamp_ms (u64)
//!  9       1         imu_count   (0 | 1)
//!  10      1         pulse_count (0 | 1)
//!  11      12 × imu  ax ay az gx gy gz (i16 each, unit × 100)
//!  11+12i  2 × pulse bpm (u16)
//! ```
//!
//! [`encode`] is infallible and allocation-free.  [`decode`] is strict: it is
//! the host-side mirror of `encode` and the fuzzing entry point.

use core::fmt;
use core::ops::Deref;

use super::samples::{MotionSample, PulseSample};

pub const FLAG_MOTION: u8 = 0x80;
pub const FLAG_PULSE: u8 = 0x40;
const RESERVED_MASK: u8 = 0x3F;

pub const HEADER_LEN: usize = 11;
pub const MOTION_PAYLOAD_LEN: usize = 12;
pub const PULSE_PAYLOAD_LEN: usize = 2;
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MOTION_PAYLOAD_LEN + PULSE_PAYLOAD_LEN;

/// One outbound telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub timestamp_ms: u64,
    /// ax, ay, az, gx, gy, gz
    pub motion: Option<[i16; 6]>,
    pub bpm: Option<u16>,
}

impl Frame {
    /// Build a frame from the newest samples of a cycle.
    ///
    /// Timestamp: motion if present, else pulse.  `None` when both are
    /// absent (such a frame is never emitted).
    pub fn from_samples(
        motion: Option<&MotionSample>,
        pulse: Option<&PulseSample>,
    ) -> Option<Self> {
        let timestamp_ms = motion.map(|m| m.timestamp_ms).or(pulse.map(|p| p.timestamp_ms))?;
        Some(Self {
            timestamp_ms,
            motion: motion.map(MotionSample::axes),
            bpm: pulse.map(|p| p.bpm),
        })
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.motion.is_some() {
            flags |= FLAG_MOTION;
        }
        if self.bpm.is_some() {
            flags |= FLAG_PULSE;
        }
        flags
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + usize::from(self.motion.is_some()) * MOTION_PAYLOAD_LEN
            + usize::from(self.bpm.is_some()) * PULSE_PAYLOAD_LEN
    }
}

/// Encoded frame bytes in a fixed stack buffer.
#[derive(Clone, Copy)]
pub struct EncodedFrame {
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Deref for EncodedFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedFrame({:02x?})", &**self)
    }
}

pub fn encode(frame: &Frame) -> EncodedFrame {
    let mut buf = [0u8; MAX_FRAME_LEN];
    buf[0] = frame.flags();
    buf[1..9].copy_from_slice(&frame.timestamp_ms.to_le_bytes());
    buf[9] = u8::from(frame.motion.is_some());
    buf[10] = u8::from(frame.bpm.is_some());

    let mut at = HEADER_LEN;
    if let Some(axes) = frame.motion {
        for v in axes {
            buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
            at += 2;
        }
    }
    if let Some(bpm) = frame.bpm {
        buf[at..at + 2].copy_from_slice(&bpm.to_le_bytes());
        at += 2;
    }
    EncodedFrame { buf, len: at }
}

/// Why a byte string is not a valid frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Shorter than the fixed header.
    Truncated(usize),
    /// Reserved flag bits set.
    ReservedBits(u8),
    /// A count byte other than 0 or 1.
    BadCount(u8),
    /// Flag bits disagree with the counts.
    FlagMismatch,
    /// Neither motion nor pulse present.
    Empty,
    /// Payload length does not match the counts.
    LengthMismatch { expected: usize, actual: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated(n) => write!(f, "frame truncated ({n} < {HEADER_LEN} bytes)"),
            Self::ReservedBits(flags) => write!(f, "reserved flag bits set (0x{flags:02x})"),
            Self::BadCount(c) => write!(f, "count {c} out of range"),
            Self::FlagMismatch => write!(f, "flags disagree with counts"),
            Self::Empty => write!(f, "frame carries no samples"),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "length {actual}, expected {expected}")
            }
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < HEADER_LEN {
        return Err(FrameError::Truncated(bytes.len()));
    }
    let flags = bytes[0];
    if flags & RESERVED_MASK != 0 {
        return Err(FrameError::ReservedBits(flags));
    }
    let imu_count = bytes[9];
    let pulse_count = bytes[10];
    for c in [imu_count, pulse_count] {
        if c > 1 {
            return Err(FrameError::BadCount(c));
        }
    }
    let has_motion = imu_count == 1;
    let has_pulse = pulse_count == 1;
    if has_motion != (flags & FLAG_MOTION != 0) || has_pulse != (flags & FLAG_PULSE != 0) {
        return Err(FrameError::FlagMismatch);
    }
    if !has_motion && !has_pulse {
        return Err(FrameError::Empty);
    }

    let expected = HEADER_LEN
        + usize::from(has_motion) * MOTION_PAYLOAD_LEN
        + usize::from(has_pulse) * PULSE_PAYLOAD_LEN;
    if bytes.len() != expected {
        return Err(FrameError::LengthMismatch { expected, actual: bytes.len() });
    }

    let mut ts = [0u8; 8];
    ts.copy_from_slice(&bytes[1..9]);
    let read_u16 = |at: usize| [bytes[at], bytes[at + 1]];

    let mut at = HEADER_LEN;
    let motion = has_motion.then(|| {
        let mut axes = [0i16; 6];
        for v in &mut axes {
            *v = i16::from_le_bytes(read_u16(at));
            at += 2;
        }
        axes
    });
    let bpm = has_pulse.then(|| u16::from_le_bytes(read_u16(at)));

    Ok(Frame { timestamp_ms: u64::from_le_bytes(ts), motion, bpm })
}
