use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::anim::AnimState;
use super::codec::{
    PacketError, PacketReader, PacketWriter, decode_velocity, encode_position, encode_velocity,
};

/// Snapshot of a remotely simulated entity as carried by `UpdateAllPlayers`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EntitySample {
    pub pos: Vec3,
    pub speed: Vec2,
    pub anim_state: AnimState,
    pub anim_time: f32,
    pub facing_left: bool,
}

impl EntitySample {
    /// pos (3 x u16) + speed (2 x i16) + anim state + anim time + facing
    pub const WIRE_SIZE: usize = 6 + 4 + 4 + 4 + 1;

    pub fn new(pos: Vec3, speed: Vec2) -> Self {
        Self {
            pos,
            speed,
            ..Default::default()
        }
    }

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        reader.ensure(Self::WIRE_SIZE)?;
        Ok(Self {
            pos: reader.read_position()?,
            speed: reader.read_velocity()?,
            anim_state: AnimState::from_bits_retain(reader.read_u32()?),
            anim_time: reader.read_f32()?,
            facing_left: reader.read_bool()?,
        })
    }

    pub fn write(&self, writer: &mut PacketWriter) {
        writer.write_position(self.pos);
        writer.write_velocity(self.speed);
        writer.write_u32(self.anim_state.bits());
        writer.write_f32(self.anim_time);
        writer.write_bool(self.facing_left);
    }

    /// The sample as a peer will decode it.
    pub fn quantized(&self) -> Self {
        Self {
            pos: Vec3::new(
                encode_position(self.pos.x) as f32,
                encode_position(self.pos.y) as f32,
                encode_position(self.pos.z) as f32,
            ),
            speed: Vec2::new(
                decode_velocity(encode_velocity(self.speed.x)),
                decode_velocity(encode_velocity(self.speed.y)),
            ),
            ..*self
        }
    }
}

/// Per-player entry of `UpdateAllPlayers`. `sample` is `None` for players that
/// own a slot but are not spawned; on the wire that is a zero flags byte with
/// no further fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerUpdate {
    pub index: u8,
    pub sample: Option<EntitySample>,
}

impl PlayerUpdate {
    pub const FLAG_SPAWNED: u8 = 0x01;
    /// index + flags + sample
    pub const SPAWNED_WIRE_SIZE: usize = 2 + EntitySample::WIRE_SIZE;

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        let index = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let sample = if flags == 0 {
            None
        } else {
            Some(EntitySample::read(reader)?)
        };
        Ok(Self { index, sample })
    }

    pub fn write(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.index);
        match &self.sample {
            Some(sample) => {
                writer.write_u8(Self::FLAG_SPAWNED);
                sample.write(writer);
            }
            None => writer.write_u8(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectUpdate {
    pub index: i32,
    pub flags: u8,
    pub sample: EntitySample,
}

impl ObjectUpdate {
    pub const WIRE_SIZE: usize = 4 + 1 + EntitySample::WIRE_SIZE;

    pub fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        reader.ensure(Self::WIRE_SIZE)?;
        Ok(Self {
            index: reader.read_i32()?,
            flags: reader.read_u8()?,
            sample: EntitySample::read(reader)?,
        })
    }

    pub fn write(&self, writer: &mut PacketWriter) {
        writer.write_i32(self.index);
        writer.write_u8(self.flags);
        self.sample.write(writer);
    }
}
