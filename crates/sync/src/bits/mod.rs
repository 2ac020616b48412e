//! Bit-granular encoding with range quantization.
//!
//! Bits are packed LSB-first into a 64-bit scratch word. A full word is
//! written out in the configured [`ByteOrder`]; the final partial word is
//! truncated to the bytes it actually occupies, in the same order, so the
//! reader can mirror the layout without knowing where the writer stopped.

mod reader;
mod stream;
mod writer;

use serde::{Deserialize, Serialize};

pub use reader::BitReader;
pub use stream::{ReadStream, Stream, WriteStream};
pub use writer::BitWriter;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("buffer underflow: attempted to read {attempted} bits, only {available} available")]
    BufferUnderflow { attempted: usize, available: usize },
    #[error("value {value} outside of range [{min}, {max}]")]
    ValueOutOfRange { value: i64, min: i64, max: i64 },
    #[error("bit width {0} exceeds 64")]
    InvalidBitWidth(u32),
    #[error("invalid range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },
    #[error("field `{field}` does not match its declared range kind")]
    SchemaMismatch { field: &'static str },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    fn word_to_bytes(self, word: u64, len: usize) -> ([u8; 8], usize) {
        match self {
            ByteOrder::Little => (word.to_le_bytes(), 0),
            ByteOrder::Big => (word.to_be_bytes(), 8 - len),
        }
    }

    fn bytes_to_word(self, bytes: &[u8]) -> u64 {
        match self {
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | b as u64),
            ByteOrder::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
        }
    }
}

pub const WORD_BITS: usize = 32;

/// Number of bits needed to represent every integer in `[min, max]`.
#[inline]
pub fn bits_required(min: i64, max: i64) -> u32 {
    if max <= min {
        return 0;
    }
    let span = max.wrapping_sub(min) as u64;
    u64::BITS - span.leading_zeros()
}

/// Number of discrete levels a float range is quantized into.
pub fn float_steps(min: f32, max: f32, resolution: f32) -> Result<i64, CodecError> {
    if min.is_nan() || max.is_nan() || max <= min || resolution.is_nan() || resolution <= 0.0 {
        return Err(CodecError::InvalidRange {
            min: min as f64,
            max: max as f64,
        });
    }
    let steps = ((max as f64 - min as f64) / resolution as f64).ceil();
    if steps > (1u64 << 52) as f64 {
        return Err(CodecError::InvalidRange {
            min: min as f64,
            max: max as f64,
        });
    }
    Ok(steps as i64)
}

pub(crate) fn quantize(value: f32, min: f32, max: f32, steps: i64) -> i64 {
    if value <= min {
        return 0;
    }
    if value >= max {
        return steps;
    }
    let normalized = (value as f64 - min as f64) / (max as f64 - min as f64);
    ((normalized * steps as f64).round() as i64).clamp(0, steps)
}

pub(crate) fn dequantize(level: i64, min: f32, max: f32, steps: i64) -> f32 {
    if level <= 0 {
        return min;
    }
    if level >= steps {
        return max;
    }
    (min as f64 + (max as f64 - min as f64) * level as f64 / steps as f64) as f32
}

#[inline]
pub(crate) fn low_mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_required_matches_range_width() {
        assert_eq!(bits_required(0, 0), 0);
        assert_eq!(bits_required(0, 1), 1);
        assert_eq!(bits_required(0, 255), 8);
        assert_eq!(bits_required(0, 256), 9);
        assert_eq!(bits_required(-8, 7), 4);
        assert_eq!(bits_required(i64::MIN, i64::MAX), 64);
    }

    #[test]
    fn quantize_pins_boundaries() {
        let steps = float_steps(-1.0, 1.0, 0.001).unwrap();
        assert_eq!(quantize(-1.0, -1.0, 1.0, steps), 0);
        assert_eq!(quantize(1.0, -1.0, 1.0, steps), steps);
        assert_eq!(dequantize(0, -1.0, 1.0, steps), -1.0);
        assert_eq!(dequantize(steps, -1.0, 1.0, steps), 1.0);
    }

    #[test]
    fn float_steps_rejects_bad_ranges() {
        assert!(float_steps(1.0, 1.0, 0.1).is_err());
        assert!(float_steps(0.0, 1.0, 0.0).is_err());
        assert!(float_steps(0.0, 1.0, f32::NAN).is_err());
    }
}
