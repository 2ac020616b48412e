use std::borrow::Cow;

use super::{
    BitReader, ByteOrder, CodecError, WORD_BITS, bits_required, float_steps, low_mask, quantize,
};

#[derive(Debug, Clone)]
pub struct BitWriter {
    buffer: Vec<u8>,
    scratch: u64,
    scratch_bits: u32,
    total_bits: usize,
    order: ByteOrder,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_order(ByteOrder::default())
    }

    pub fn with_order(order: ByteOrder) -> Self {
        Self {
            buffer: Vec::with_capacity(64),
            scratch: 0,
            scratch_bits: 0,
            total_bits: 0,
            order,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Total bits written so far, including padding.
    pub fn bits_written(&self) -> usize {
        self.total_bits
    }

    /// Bytes the payload occupies once flushed.
    pub fn bytes_written(&self) -> usize {
        self.total_bits.div_ceil(8)
    }

    pub fn write_bits(&mut self, value: u64, bits: u32) -> Result<(), CodecError> {
        if bits > 64 {
            return Err(CodecError::InvalidBitWidth(bits));
        }
        if bits == 0 {
            return Ok(());
        }

        let value = value & low_mask(bits);
        let free = 64 - self.scratch_bits;

        self.scratch |= value << self.scratch_bits;
        if bits < free {
            self.scratch_bits += bits;
        } else {
            let word = self.scratch;
            self.emit(word, 8);
            self.scratch = value.checked_shr(free).unwrap_or(0);
            self.scratch_bits = bits - free;
        }

        self.total_bits += bits as usize;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.write_bits(value as u64, 1)
    }

    /// Writes `value - min` using exactly `bits_required(min, max)` bits.
    pub fn pack_int(&mut self, value: i64, min: i64, max: i64) -> Result<(), CodecError> {
        if value < min || value > max {
            return Err(CodecError::ValueOutOfRange { value, min, max });
        }
        let bits = bits_required(min, max);
        self.write_bits(value.wrapping_sub(min) as u64, bits)
    }

    pub fn pack_float(
        &mut self,
        value: f32,
        min: f32,
        max: f32,
        resolution: f32,
    ) -> Result<(), CodecError> {
        let steps = float_steps(min, max, resolution)?;
        let level = quantize(value, min, max, steps);
        self.pack_int(level, 0, steps)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        for &byte in bytes {
            self.write_bits(byte as u64, 8)?;
        }
        Ok(())
    }

    pub fn pad_to_byte(&mut self) -> Result<(), CodecError> {
        let remainder = self.total_bits % 8;
        if remainder != 0 {
            self.write_bits(0, (8 - remainder) as u32)?;
        }
        Ok(())
    }

    pub fn pad_to_word(&mut self) -> Result<(), CodecError> {
        let remainder = self.total_bits % WORD_BITS;
        if remainder != 0 {
            self.write_bits(0, (WORD_BITS - remainder) as u32)?;
        }
        Ok(())
    }

    /// Pads the pending bits to a whole byte and writes them out.
    ///
    /// Bits written after a flush start a new scratch word, so a reader of
    /// the combined output has to start over at the flush boundary.
    pub fn flush(&mut self) {
        if self.scratch_bits == 0 {
            return;
        }
        let bytes = self.scratch_bits.div_ceil(8) as usize;
        let word = self.scratch;
        self.emit(word, bytes);
        self.total_bits = self.total_bits.div_ceil(8) * 8;
        self.scratch = 0;
        self.scratch_bits = 0;
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        self.buffer
    }

    /// Flushes and rewinds: the returned reader starts at the first bit.
    pub fn into_reader(mut self) -> BitReader<'static> {
        self.flush();
        BitReader::with_order(Cow::Owned(self.buffer), self.order)
    }

    fn emit(&mut self, word: u64, len: usize) {
        let (bytes, start) = self.order.word_to_bytes(word, len);
        self.buffer.extend_from_slice(&bytes[start..start + len]);
    }
}
