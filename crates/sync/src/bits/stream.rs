use super::{BitReader, BitWriter, CodecError};

/// A single serialize path shared by encoding and decoding.
///
/// When writing, values are read from the `&mut` arguments; when reading,
/// decoded values are stored into them. Implementors of a message shape write
/// one `serialize` method against this trait so both directions stay in the
/// same bit layout.
pub trait Stream {
    fn is_writing(&self) -> bool;

    fn serialize_bits(&mut self, value: &mut u64, bits: u32) -> Result<(), CodecError>;

    fn serialize_int(&mut self, value: &mut i64, min: i64, max: i64) -> Result<(), CodecError>;

    fn serialize_float(
        &mut self,
        value: &mut f32,
        min: f32,
        max: f32,
        resolution: f32,
    ) -> Result<(), CodecError>;

    /// Pads (writing) or skips (reading) to the next byte boundary.
    fn align(&mut self) -> Result<(), CodecError>;

    fn serialize_bool(&mut self, value: &mut bool) -> Result<(), CodecError> {
        let mut bit = *value as u64;
        self.serialize_bits(&mut bit, 1)?;
        *value = bit != 0;
        Ok(())
    }

    fn serialize_ranged<T>(&mut self, value: &mut T, min: i64, max: i64) -> Result<(), CodecError>
    where
        T: Copy + Into<i64> + TryFrom<i64>,
    {
        let mut wide: i64 = (*value).into();
        self.serialize_int(&mut wide, min, max)?;
        *value = T::try_from(wide).map_err(|_| CodecError::ValueOutOfRange {
            value: wide,
            min,
            max,
        })?;
        Ok(())
    }

    fn is_reading(&self) -> bool {
        !self.is_writing()
    }
}

#[derive(Debug, Default)]
pub struct WriteStream {
    writer: BitWriter,
}

impl WriteStream {
    pub fn new(writer: BitWriter) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> &BitWriter {
        &self.writer
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.finish()
    }
}

impl Stream for WriteStream {
    fn is_writing(&self) -> bool {
        true
    }

    fn serialize_bits(&mut self, value: &mut u64, bits: u32) -> Result<(), CodecError> {
        self.writer.write_bits(*value, bits)
    }

    fn serialize_int(&mut self, value: &mut i64, min: i64, max: i64) -> Result<(), CodecError> {
        self.writer.pack_int(*value, min, max)
    }

    fn serialize_float(
        &mut self,
        value: &mut f32,
        min: f32,
        max: f32,
        resolution: f32,
    ) -> Result<(), CodecError> {
        self.writer.pack_float(*value, min, max, resolution)
    }

    fn align(&mut self) -> Result<(), CodecError> {
        self.writer.pad_to_byte()
    }
}

#[derive(Debug)]
pub struct ReadStream<'a> {
    reader: BitReader<'a>,
}

impl<'a> ReadStream<'a> {
    pub fn new(reader: BitReader<'a>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &BitReader<'a> {
        &self.reader
    }
}

impl Stream for ReadStream<'_> {
    fn is_writing(&self) -> bool {
        false
    }

    fn serialize_bits(&mut self, value: &mut u64, bits: u32) -> Result<(), CodecError> {
        *value = self.reader.read_bits(bits)?;
        Ok(())
    }

    fn serialize_int(&mut self, value: &mut i64, min: i64, max: i64) -> Result<(), CodecError> {
        *value = self.reader.unpack_int(min, max)?;
        Ok(())
    }

    fn serialize_float(
        &mut self,
        value: &mut f32,
        min: f32,
        max: f32,
        resolution: f32,
    ) -> Result<(), CodecError> {
        *value = self.reader.unpack_float(min, max, resolution)?;
        Ok(())
    }

    fn align(&mut self) -> Result<(), CodecError> {
        self.reader.skip_to_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        health: u8,
        alive: bool,
        heading: f32,
    }

    impl Sample {
        fn serialize<S: Stream>(&mut self, stream: &mut S) -> Result<(), CodecError> {
            stream.serialize_ranged(&mut self.health, 0, 200)?;
            stream.serialize_bool(&mut self.alive)?;
            stream.serialize_float(&mut self.heading, 0.0, 360.0, 0.5)?;
            stream.align()
        }
    }

    #[test]
    fn one_method_encodes_and_decodes() {
        let mut original = Sample {
            health: 150,
            alive: true,
            heading: 90.0,
        };
        let mut out = WriteStream::default();
        original.serialize(&mut out).unwrap();
        assert!(out.is_writing());
        assert_eq!(out.writer().bits_written(), 24);

        let bytes = out.finish();
        let mut input = ReadStream::new(BitReader::new(&bytes));
        let mut decoded = Sample::default();
        decoded.serialize(&mut input).unwrap();
        assert!(input.is_reading());
        assert_eq!(decoded, original);
    }
}
