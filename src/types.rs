//! Core data types for frame store datasets

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample encodings a dataset may declare for its traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceFormat {
    /// 32-bit IEEE floating point
    Float,
    /// 64-bit IEEE floating point
    Double,
    /// Scaled 16-bit fixed point, one scalar per trace
    CompressedInt16,
    /// Scaled 8-bit fixed point, one scalar per trace
    CompressedInt08,
}

impl TraceFormat {
    /// Check if samples are stored as plain IEEE values
    pub fn is_ieee(&self) -> bool {
        matches!(self, TraceFormat::Float | TraceFormat::Double)
    }
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceFormat::Float => "FLOAT",
            TraceFormat::Double => "DOUBLE",
            TraceFormat::CompressedInt16 => "COMPRESSED_INT16",
            TraceFormat::CompressedInt08 => "COMPRESSED_INT08",
        };
        f.write_str(name)
    }
}

/// Byte order of binary words inside trace and header records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ByteOrder {
    BigEndian,
    #[default]
    LittleEndian,
}

// Callers guarantee `src`/`dst` hold at least the word size.
impl ByteOrder {
    pub fn read_i32(&self, src: &[u8]) -> i32 {
        let word = [src[0], src[1], src[2], src[3]];
        match self {
            ByteOrder::BigEndian => i32::from_be_bytes(word),
            ByteOrder::LittleEndian => i32::from_le_bytes(word),
        }
    }

    pub fn write_i32(&self, dst: &mut [u8], value: i32) {
        let word = match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        };
        dst[..4].copy_from_slice(&word);
    }

    pub fn read_i64(&self, src: &[u8]) -> i64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&src[..8]);
        match self {
            ByteOrder::BigEndian => i64::from_be_bytes(word),
            ByteOrder::LittleEndian => i64::from_le_bytes(word),
        }
    }

    pub fn write_i64(&self, dst: &mut [u8], value: i64) {
        let word = match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        };
        dst[..8].copy_from_slice(&word);
    }

    pub fn read_f32(&self, src: &[u8]) -> f32 {
        f32::from_bits(self.read_i32(src) as u32)
    }

    pub fn write_f32(&self, dst: &mut [u8], value: f32) {
        self.write_i32(dst, value.to_bits() as i32);
    }

    pub fn read_f64(&self, src: &[u8]) -> f64 {
        f64::from_bits(self.read_i64(src) as u64)
    }

    pub fn write_f64(&self, dst: &mut [u8], value: f64) {
        self.write_i64(dst, value.to_bits() as i64);
    }
}

/// The four axes of a frame store grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    /// Samples within a trace
    Sample = 0,
    /// Traces within a frame
    Trace = 1,
    /// Frames within a volume
    Frame = 2,
    /// Volumes within the dataset
    Volume = 3,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::Sample, Axis::Trace, Axis::Frame, Axis::Volume];

    /// Convert from usize index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Axis::Sample),
            1 => Some(Axis::Trace),
            2 => Some(Axis::Frame),
            3 => Some(Axis::Volume),
            _ => None,
        }
    }

    /// Convert to usize index
    pub fn to_index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Inclusive logical range `[start, end]` walked with `step`
///
/// The all-zero range is the "unrestricted" sentinel and stands for an
/// axis' full declared range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LogicalRange {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl LogicalRange {
    pub const UNRESTRICTED: Self = Self {
        start: 0,
        end: 0,
        step: 0,
    };

    pub fn new(start: i64, end: i64, step: i64) -> Self {
        Self { start, end, step }
    }

    /// A range holding exactly one value
    pub fn single(value: i64) -> Self {
        Self::new(value, value, 1)
    }

    pub fn is_unrestricted(&self) -> bool {
        *self == Self::UNRESTRICTED
    }

    /// Number of values visited when walking the range
    pub fn len(&self) -> usize {
        if self.step == 0 {
            return 0;
        }
        let span = self.end - self.start;
        if span != 0 && span.signum() != self.step.signum() {
            return 0;
        }
        (span / self.step) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the logical values of the range in order
    pub fn values(&self) -> impl Iterator<Item = i64> {
        let start = self.start;
        let step = self.step;
        (0..self.len()).map(move |i| start + step * i as i64)
    }
}

impl fmt::Display for LogicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.start, self.end, self.step)
    }
}
