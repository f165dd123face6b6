//! Fixed-layout little-endian packet encoding.
//!
//! Every packet starts with its one byte type tag followed by the body written
//! by [`Packet::write`]. Reads are bounds-checked up front so a short buffer
//! yields [`PacketError::Truncated`] instead of a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use glam::{Vec2, Vec3};

use super::DeliveryMethod;

/// One encoded velocity step in world units.
pub const VELOCITY_SCALE: f32 = 0.002;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("malformed packet: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("unexpected packet type {found} (expected {expected})")]
    UnexpectedType { expected: u8, found: u8 },
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("invalid player type {0}")]
    InvalidPlayerType(u8),
    #[error("invalid entry count {0}")]
    InvalidCount(i32),
}

/// Truncating conversion, values outside `0..=65535` wrap.
#[inline]
pub fn encode_position(value: f32) -> u16 {
    value as i64 as u16
}

#[inline]
pub fn encode_velocity(value: f32) -> i16 {
    (value / VELOCITY_SCALE).round() as i32 as i16
}

#[inline]
pub fn decode_velocity(raw: i16) -> f32 {
    raw as f32 * VELOCITY_SCALE
}

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn ensure(&self, needed: usize) -> Result<(), PacketError> {
        if self.buf.remaining() < needed {
            return Err(PacketError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_i16(&mut self) -> Result<i16, PacketError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32, PacketError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_i64(&mut self) -> Result<i64, PacketError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, PacketError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Everything not read yet.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    pub fn read_position(&mut self) -> Result<Vec3, PacketError> {
        self.ensure(6)?;
        let x = self.buf.get_u16_le();
        let y = self.buf.get_u16_le();
        let z = self.buf.get_u16_le();
        Ok(Vec3::new(x as f32, y as f32, z as f32))
    }

    pub fn read_velocity(&mut self) -> Result<Vec2, PacketError> {
        self.ensure(4)?;
        let x = self.buf.get_i16_le();
        let y = self.buf.get_i16_le();
        Ok(Vec2::new(decode_velocity(x), decode_velocity(y)))
    }
}

pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16_le(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    pub fn write_position(&mut self, pos: Vec3) {
        self.buf.put_u16_le(encode_position(pos.x));
        self.buf.put_u16_le(encode_position(pos.y));
        self.buf.put_u16_le(encode_position(pos.z));
    }

    pub fn write_velocity(&mut self, speed: Vec2) {
        self.buf.put_i16_le(encode_velocity(speed.x));
        self.buf.put_i16_le(encode_velocity(speed.y));
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

pub trait Packet: Sized {
    const TYPE: u8;
    const DELIVERY: DeliveryMethod;
    /// Expected encoded size including the type tag.
    const SIZE_HINT: usize;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError>;

    fn write(&self, writer: &mut PacketWriter);

    fn encode(&self) -> Bytes {
        let mut writer = PacketWriter::with_capacity(Self::SIZE_HINT);
        writer.write_u8(Self::TYPE);
        self.write(&mut writer);
        writer.finish()
    }

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let mut reader = PacketReader::new(data);
        let found = reader.read_u8().map_err(|_| PacketError::Empty)?;
        if found != Self::TYPE {
            return Err(PacketError::UnexpectedType {
                expected: Self::TYPE,
                found,
            });
        }
        Self::read(&mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_truncates_and_wraps() {
        assert_eq!(encode_position(100.9), 100);
        assert_eq!(encode_position(65535.0), 65535);
        assert_eq!(encode_position(65536.0), 0);
        assert_eq!(encode_position(-1.0), 65535);
    }

    #[test]
    fn velocity_quantization() {
        let raw = encode_velocity(10.0);
        assert_eq!(raw, 5000);
        assert!((decode_velocity(raw) - 10.0).abs() <= VELOCITY_SCALE);

        let raw = encode_velocity(-3.1237);
        assert!((decode_velocity(raw) - -3.1237).abs() <= VELOCITY_SCALE);
    }

    #[test]
    fn velocity_out_of_range_wraps_silently() {
        // 70 units is 35000 steps, past i16::MAX
        let raw = encode_velocity(70.0);
        assert_eq!(raw, 35000i32 as i16);
        assert!(decode_velocity(raw) < 0.0);
    }

    #[test]
    fn reader_reports_truncation() {
        let data = [1u8, 2, 3];
        let mut reader = PacketReader::new(&data);
        assert_eq!(
            reader.read_i64(),
            Err(PacketError::Truncated {
                needed: 8,
                remaining: 3
            })
        );
        assert_eq!(reader.remaining(), 3);
        assert_eq!(reader.read_u16(), Ok(0x0201));
    }

    #[test]
    fn writer_is_little_endian() {
        let mut writer = PacketWriter::with_capacity(8);
        writer.write_u16(0x0102);
        writer.write_bool(true);
        writer.write_i32(-2);
        assert_eq!(
            &writer.finish()[..],
            &[0x02, 0x01, 1, 0xFE, 0xFF, 0xFF, 0xFF]
        );
    }
}
