use std::borrow::Cow;

use super::{
    ByteOrder, CodecError, WORD_BITS, bits_required, dequantize, float_steps, low_mask,
};

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: Cow<'a, [u8]>,
    order: ByteOrder,
    scratch: u64,
    scratch_bits: u32,
    word_pos: usize,
    bits_read: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_order(Cow::Borrowed(data), ByteOrder::default())
    }

    pub fn with_order(data: Cow<'a, [u8]>, order: ByteOrder) -> Self {
        Self {
            data,
            order,
            scratch: 0,
            scratch_bits: 0,
            word_pos: 0,
            bits_read: 0,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn bits_read(&self) -> usize {
        self.bits_read
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.bits_read
    }

    pub fn rewind(&mut self) {
        self.scratch = 0;
        self.scratch_bits = 0;
        self.word_pos = 0;
        self.bits_read = 0;
    }

    pub fn read_bits(&mut self, bits: u32) -> Result<u64, CodecError> {
        if bits > 64 {
            return Err(CodecError::InvalidBitWidth(bits));
        }
        if bits == 0 {
            return Ok(0);
        }

        let available = self.bits_remaining();
        if bits as usize > available {
            return Err(CodecError::BufferUnderflow {
                attempted: bits as usize,
                available,
            });
        }

        let value = if bits <= self.scratch_bits {
            let value = self.scratch & low_mask(bits);
            self.scratch = self.scratch.checked_shr(bits).unwrap_or(0);
            self.scratch_bits -= bits;
            value
        } else {
            let low = self.scratch;
            let low_bits = self.scratch_bits;
            let (word, word_bits) = self.load_word();
            let needed = bits - low_bits;
            self.scratch = word.checked_shr(needed).unwrap_or(0);
            self.scratch_bits = word_bits - needed;
            (low | (word << low_bits)) & low_mask(bits)
        };

        self.bits_read += bits as usize;
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_bits(1)? != 0)
    }

    pub fn unpack_int(&mut self, min: i64, max: i64) -> Result<i64, CodecError> {
        let bits = bits_required(min, max);
        let raw = self.read_bits(bits)?;
        let value = min.wrapping_add(raw as i64);
        if value < min || value > max {
            return Err(CodecError::ValueOutOfRange { value, min, max });
        }
        Ok(value)
    }

    pub fn unpack_float(&mut self, min: f32, max: f32, resolution: f32) -> Result<f32, CodecError> {
        let steps = float_steps(min, max, resolution)?;
        let level = self.unpack_int(0, steps)?;
        Ok(dequantize(level, min, max, steps))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        let available = self.bits_remaining();
        if len * 8 > available {
            return Err(CodecError::BufferUnderflow {
                attempted: len * 8,
                available,
            });
        }
        (0..len).map(|_| self.read_bits(8).map(|b| b as u8)).collect()
    }

    pub fn skip_to_byte(&mut self) -> Result<(), CodecError> {
        let remainder = self.bits_read % 8;
        if remainder != 0 {
            self.read_bits((8 - remainder) as u32)?;
        }
        Ok(())
    }

    pub fn skip_to_word(&mut self) -> Result<(), CodecError> {
        let remainder = self.bits_read % WORD_BITS;
        if remainder != 0 {
            self.read_bits((WORD_BITS - remainder) as u32)?;
        }
        Ok(())
    }

    fn load_word(&mut self) -> (u64, u32) {
        let end = (self.word_pos + 8).min(self.data.len());
        let bytes = &self.data[self.word_pos..end];
        let word = self.order.bytes_to_word(bytes);
        let len = bytes.len();
        self.word_pos = end;
        (word, (len * 8) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    #[test]
    fn underflow_is_an_error() {
        let mut reader = BitReader::new(&[0xFF]);
        assert_eq!(reader.read_bits(4).unwrap(), 0xF);
        assert_eq!(
            reader.read_bits(5),
            Err(CodecError::BufferUnderflow {
                attempted: 5,
                available: 4
            })
        );
        assert_eq!(reader.read_bits(4).unwrap(), 0xF);
        assert!(reader.read_bool().is_err());
    }

    #[test]
    fn mixed_widths_across_words() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut writer = BitWriter::with_order(order);
            writer.write_bits(0x1234_5678_9ABC, 48).unwrap();
            writer.write_bits(0x3, 2).unwrap();
            writer.write_bits(u64::MAX - 1, 64).unwrap();
            writer.write_bits(0x55, 7).unwrap();

            let mut reader = writer.into_reader();
            assert_eq!(reader.order(), order);
            assert_eq!(reader.read_bits(48).unwrap(), 0x1234_5678_9ABC);
            assert_eq!(reader.read_bits(2).unwrap(), 0x3);
            assert_eq!(reader.read_bits(64).unwrap(), u64::MAX - 1);
            assert_eq!(reader.read_bits(7).unwrap(), 0x55);
            assert_eq!(reader.bits_remaining(), 7);
        }
    }

    #[test]
    fn unpack_detects_values_beyond_max() {
        // 0..=5 needs 3 bits, so a raw 7 is representable on the wire but invalid.
        let mut reader = BitReader::new(&[0b111]);
        assert!(matches!(
            reader.unpack_int(0, 5),
            Err(CodecError::ValueOutOfRange { value: 7, .. })
        ));
    }

    #[test]
    fn skip_mirrors_padding() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b1, 3).unwrap();
        writer.pad_to_word().unwrap();
        writer.write_bits(0xEE, 8).unwrap();
        writer.pad_to_byte().unwrap();
        writer.write_bytes(b"ok").unwrap();

        let mut reader = writer.into_reader();
        assert_eq!(reader.read_bits(3).unwrap(), 1);
        reader.skip_to_word().unwrap();
        assert_eq!(reader.bits_read(), 32);
        assert_eq!(reader.read_bits(8).unwrap(), 0xEE);
        reader.skip_to_byte().unwrap();
        assert_eq!(reader.read_bytes(2).unwrap(), b"ok".to_vec());
    }

    #[test]
    fn rewind_restarts_from_first_bit() {
        let mut writer = BitWriter::new();
        writer.pack_int(-3, -10, 10).unwrap();
        let mut reader = writer.into_reader();
        assert_eq!(reader.unpack_int(-10, 10).unwrap(), -3);
        reader.rewind();
        assert_eq!(reader.unpack_int(-10, 10).unwrap(), -3);
    }

    #[test]
    fn float_round_trip_within_resolution() {
        let mut writer = BitWriter::new();
        writer.pack_float(12.345, -100.0, 100.0, 0.01).unwrap();
        writer.pack_float(100.0, -100.0, 100.0, 0.01).unwrap();
        writer.pack_float(-250.0, -100.0, 100.0, 0.01).unwrap();

        let mut reader = writer.into_reader();
        let value = reader.unpack_float(-100.0, 100.0, 0.01).unwrap();
        assert!((value - 12.345).abs() <= 0.01);
        assert_eq!(reader.unpack_float(-100.0, 100.0, 0.01).unwrap(), 100.0);
        assert_eq!(reader.unpack_float(-100.0, 100.0, 0.01).unwrap(), -100.0);
    }
}
