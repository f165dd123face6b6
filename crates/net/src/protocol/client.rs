//! Packets sent by the client.

use bytes::Bytes;
use glam::Vec3;

use super::DeliveryMethod;
use super::anim::AnimState;
use super::codec::{Packet, PacketError, PacketReader, PacketWriter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSelf {
    pub index: u8,
    pub update_time: i64,
    pub pos: Vec3,
    pub anim_state: AnimState,
    pub anim_time: f32,
    pub facing_left: bool,
    pub controllable: bool,
    pub fire_pressed: bool,
}

impl UpdateSelf {
    const BODY_SIZE: usize = 1 + 8 + 6 + 4 + 4 + 3;
}

impl Packet for UpdateSelf {
    const TYPE: u8 = 12;
    const DELIVERY: DeliveryMethod = DeliveryMethod::Unreliable;
    const SIZE_HINT: usize = 29;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        reader.ensure(Self::BODY_SIZE)?;
        Ok(Self {
            index: reader.read_u8()?,
            update_time: reader.read_i64()?,
            pos: reader.read_position()?,
            anim_state: AnimState::from_bits_retain(reader.read_u32()?),
            anim_time: reader.read_f32()?,
            facing_left: reader.read_bool()?,
            controllable: reader.read_bool()?,
            fire_pressed: reader.read_bool()?,
        })
    }

    fn write(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.index);
        writer.write_i64(self.update_time);
        writer.write_position(self.pos);
        writer.write_u32(self.anim_state.bits());
        writer.write_f32(self.anim_time);
        writer.write_bool(self.facing_left);
        writer.write_bool(self.controllable);
        writer.write_bool(self.fire_pressed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfDied {
    pub index: u8,
}

impl Packet for SelfDied {
    const TYPE: u8 = 2;
    const DELIVERY: DeliveryMethod = DeliveryMethod::ReliableUnordered;
    const SIZE_HINT: usize = 2;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            index: reader.read_u8()?,
        })
    }

    fn write(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.index);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientPacket {
    UpdateSelf(UpdateSelf),
    SelfDied(SelfDied),
}

impl ClientPacket {
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let tag = *data.first().ok_or(PacketError::Empty)?;
        match tag {
            UpdateSelf::TYPE => Ok(Self::UpdateSelf(UpdateSelf::decode(data)?)),
            SelfDied::TYPE => Ok(Self::SelfDied(SelfDied::decode(data)?)),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Self::UpdateSelf(p) => p.encode(),
            Self::SelfDied(p) => p.encode(),
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            Self::UpdateSelf(p) => p.index,
            Self::SelfDied(p) => p.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> UpdateSelf {
        UpdateSelf {
            index: 5,
            update_time: 1_700_000_000_123,
            pos: Vec3::new(640.0, 480.0, 1.0),
            anim_state: AnimState::RUN | AnimState::SHOOT,
            anim_time: 0.25,
            facing_left: true,
            controllable: true,
            fire_pressed: false,
        }
    }

    #[test]
    fn update_self_round_trip() {
        let data = update().encode();
        assert_eq!(data.len(), 1 + UpdateSelf::BODY_SIZE);
        assert_eq!(UpdateSelf::decode(&data).unwrap(), update());
    }

    #[test]
    fn short_update_self_fails_to_decode() {
        let data = [UpdateSelf::TYPE, 5, 0];
        assert!(matches!(
            UpdateSelf::decode(&data),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn every_truncation_of_update_self_fails() {
        let data = update().encode();
        for len in 0..data.len() {
            assert!(UpdateSelf::decode(&data[..len]).is_err(), "len {len}");
        }
    }

    #[test]
    fn client_packet_decodes_by_tag() {
        let data = SelfDied { index: 9 }.encode();
        let packet = ClientPacket::decode(&data).unwrap();
        assert_eq!(packet, ClientPacket::SelfDied(SelfDied { index: 9 }));
        assert_eq!(packet.index(), 9);
    }
}
