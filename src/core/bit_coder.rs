use crate::core::shared::{CoordWidth, IndexWidth, NOT_APPLICABLE, UNDEF};

pub trait ByteWriter: Sized {
    fn write_u8(&mut self, value: u8);
    fn write_u16(&mut self, value: u16) {
        self.write_u8(value as u8);
        self.write_u8((value >> 8) as u8);
    }
    fn write_u32(&mut self, value: u32) {
        self.write_u16(value as u16);
        self.write_u16((value >> 16) as u16);
    }
    fn write_u64(&mut self, value: u64) {
        self.write_u32(value as u32);
        self.write_u32((value >> 32) as u32);
    }
    fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }
    fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }
    fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_u8(b);
        }
    }

    /// Writes `value` with the given width. The two sentinels are written as the
    /// reserved top patterns of the width, an absent width writes nothing.
    fn write_index(&mut self, value: u32, width: IndexWidth) {
        match width {
            IndexWidth::Absent => {}
            IndexWidth::U8 => {
                debug_assert!(value < 254 || value >= NOT_APPLICABLE, "{value} does not fit one byte");
                self.write_u8(value as u8);
            }
            IndexWidth::U16 => {
                debug_assert!(value < 65534 || value >= NOT_APPLICABLE, "{value} does not fit two bytes");
                self.write_u16(value as u16);
            }
            IndexWidth::U32 => self.write_u32(value),
        }
    }

    /// Writes a signed, normalized vertex coordinate.
    fn write_coord(&mut self, value: f32, width: CoordWidth) {
        match width {
            CoordWidth::I8 => self.write_u8(quantize(value, 127.0) as i8 as u8),
            CoordWidth::I16 => self.write_u16(quantize(value, 32767.0) as i16 as u16),
            CoordWidth::F32 => self.write_f32(value),
            CoordWidth::F64 => self.write_f64(value as f64),
        }
    }

    /// Writes an unsigned, normalized texture coordinate.
    fn write_unorm(&mut self, value: f32, width: CoordWidth) {
        match width {
            CoordWidth::I8 => self.write_u8((value.clamp(0.0, 1.0) * 255.0).round() as u8),
            CoordWidth::I16 => self.write_u16((value.clamp(0.0, 1.0) * 65535.0).round() as u16),
            CoordWidth::F32 => self.write_f32(value),
            CoordWidth::F64 => self.write_f64(value as f64),
        }
    }
}

fn quantize(value: f32, max: f32) -> f32 {
    (value.clamp(-1.0, 1.0) * max).round()
}

impl ByteWriter for Vec<u8> {
    fn write_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn write_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Packs bit fields least significant bit first, the order DEFLATE streams use.
/// Pending bits are flushed into the buffer when the writer is dropped.
pub struct BitWriter<'buffer, Buffer: ByteWriter> {
    buffer: &'buffer mut Buffer,

    /// Bits not yet flushed. Only the lowest `num_pending` bits are meaningful.
    pending: u64,
    num_pending: u8,
}

impl<'buffer, Buffer: ByteWriter> BitWriter<'buffer, Buffer> {
    pub fn spown_from(buffer: &'buffer mut Buffer) -> Self {
        BitWriter {
            buffer,
            pending: 0,
            num_pending: 0,
        }
    }

    /// Writes the lowest `size` bits of `value`. `size` must be at most 32.
    pub fn write_bits(&mut self, (size, value): (u8, u32)) {
        debug_assert!(size <= 32, "Size must be at most 32 bits.");
        if size == 0 {
            return;
        }
        let mask = if size == 32 { u32::MAX } else { (1 << size) - 1 };
        self.pending |= ((value & mask) as u64) << self.num_pending;
        self.num_pending += size;
        while self.num_pending >= 8 {
            self.buffer.write_u8(self.pending as u8);
            self.pending >>= 8;
            self.num_pending -= 8;
        }
    }

    /// Pads the current byte with zero bits.
    pub fn align(&mut self) {
        if self.num_pending > 0 {
            self.buffer.write_u8(self.pending as u8);
            self.pending = 0;
            self.num_pending = 0;
        }
    }
}

impl<'buffer, Buffer: ByteWriter> Drop for BitWriter<'buffer, Buffer> {
    fn drop(&mut self) {
        self.align();
    }
}

pub trait ByteReader {
    fn read_u8(&mut self) -> Result<u8, ReaderErr>;
    fn read_u16(&mut self) -> Result<u16, ReaderErr> {
        let out = [self.read_u8()?, self.read_u8()?];
        Ok(u16::from_le_bytes(out))
    }
    fn read_u32(&mut self) -> Result<u32, ReaderErr> {
        let out = [
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ];
        Ok(u32::from_le_bytes(out))
    }
    fn read_u64(&mut self) -> Result<u64, ReaderErr> {
        let lo = self.read_u32()? as u64;
        let hi = self.read_u32()? as u64;
        Ok(lo | hi << 32)
    }
    fn read_f32(&mut self) -> Result<f32, ReaderErr> {
        Ok(f32::from_bits(self.read_u32()?))
    }
    fn read_f64(&mut self) -> Result<f64, ReaderErr> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Reads an index of the given width, mapping the reserved top patterns of
    /// one and two byte widths onto the sentinels. An absent width yields
    /// `UNDEF` without consuming input.
    fn read_index(&mut self, width: IndexWidth) -> Result<u32, ReaderErr> {
        Ok(match width {
            IndexWidth::Absent => UNDEF,
            IndexWidth::U8 => match self.read_u8()? {
                255 => UNDEF,
                254 => NOT_APPLICABLE,
                v => v as u32,
            },
            IndexWidth::U16 => match self.read_u16()? {
                65535 => UNDEF,
                65534 => NOT_APPLICABLE,
                v => v as u32,
            },
            IndexWidth::U32 => self.read_u32()?,
        })
    }

    fn read_coord(&mut self, width: CoordWidth) -> Result<f32, ReaderErr> {
        Ok(match width {
            CoordWidth::I8 => self.read_u8()? as i8 as f32 / 127.0,
            CoordWidth::I16 => self.read_u16()? as i16 as f32 / 32767.0,
            CoordWidth::F32 => self.read_f32()?,
            CoordWidth::F64 => self.read_f64()? as f32,
        })
    }

    fn read_unorm(&mut self, width: CoordWidth) -> Result<f32, ReaderErr> {
        Ok(match width {
            CoordWidth::I8 => self.read_u8()? as f32 / 255.0,
            CoordWidth::I16 => self.read_u16()? as f32 / 65535.0,
            CoordWidth::F32 => self.read_f32()?,
            CoordWidth::F64 => self.read_f64()? as f32,
        })
    }
}

/// Reads little endian values out of a borrowed byte slice.
#[derive(Clone, Debug)]
pub struct SliceReader<'data> {
    data: &'data [u8],
    pos: usize,
}

impl<'data> SliceReader<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Takes the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'data [u8], ReaderErr> {
        if len > self.remaining() {
            return Err(ReaderErr::NotEnoughData);
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Takes everything that is left.
    pub fn rest(&mut self) -> &'data [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }
}

impl ByteReader for SliceReader<'_> {
    fn read_u8(&mut self) -> Result<u8, ReaderErr> {
        let out = *self.data.get(self.pos).ok_or(ReaderErr::NotEnoughData)?;
        self.pos += 1;
        Ok(out)
    }

    fn read_u16(&mut self) -> Result<u16, ReaderErr> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ReaderErr> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderErr {
    #[error("Not enough data to read")]
    NotEnoughData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip_all_widths() {
        for width in [IndexWidth::U8, IndexWidth::U16, IndexWidth::U32] {
            let limit: u64 = match width {
                IndexWidth::U8 => 254,
                IndexWidth::U16 => 65534,
                _ => 100_000,
            };
            let mut buffer = Vec::new();
            let values = [0, 1, limit as u32 / 2, limit as u32 - 1, UNDEF, NOT_APPLICABLE];
            for &v in &values {
                buffer.write_index(v, width);
            }
            assert_eq!(buffer.len(), values.len() * width.bytes());
            let mut reader = SliceReader::new(&buffer);
            for &v in &values {
                assert_eq!(reader.read_index(width).unwrap(), v);
            }
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn sentinel_bit_patterns() {
        let mut buffer = Vec::new();
        buffer.write_index(UNDEF, IndexWidth::U8);
        buffer.write_index(NOT_APPLICABLE, IndexWidth::U8);
        buffer.write_index(UNDEF, IndexWidth::U16);
        assert_eq!(buffer, vec![0xFF, 0xFE, 0xFF, 0xFF]);
    }

    #[test]
    fn absent_width_is_implicit() {
        let mut buffer = Vec::new();
        buffer.write_index(42, IndexWidth::Absent);
        assert!(buffer.is_empty());
        let mut reader = SliceReader::new(&buffer);
        assert_eq!(reader.read_index(IndexWidth::Absent).unwrap(), UNDEF);
    }

    #[test]
    fn coords_quantize() {
        let mut buffer = Vec::new();
        buffer.write_coord(1.0, CoordWidth::I8);
        buffer.write_coord(-0.5, CoordWidth::I16);
        buffer.write_unorm(0.5, CoordWidth::I8);
        let mut reader = SliceReader::new(&buffer);
        assert_eq!(reader.read_coord(CoordWidth::I8).unwrap(), 1.0);
        assert!((reader.read_coord(CoordWidth::I16).unwrap() + 0.5).abs() < 1.0 / 32767.0);
        assert!((reader.read_unorm(CoordWidth::I8).unwrap() - 0.5).abs() < 1.0 / 255.0);
    }

    #[test]
    fn bit_writer_lsb_first() {
        let mut buffer = Vec::new();
        {
            let mut writer = BitWriter::spown_from(&mut buffer);
            writer.write_bits((1, 1));
            writer.write_bits((2, 0b01));
            writer.write_bits((9, 0b1_1010_1010));
        }
        assert_eq!(buffer, vec![0b0101_0011, 0b0000_1101]);
    }

    #[test]
    fn reader_reports_truncation() {
        let data = [1_u8, 2, 3];
        let mut reader = SliceReader::new(&data);
        assert_eq!(reader.read_u32(), Err(ReaderErr::NotEnoughData));
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert_eq!(reader.take(2), Err(ReaderErr::NotEnoughData));
    }
}
