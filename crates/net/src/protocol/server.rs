//! Packets sent by the server.

use bytes::Bytes;
use glam::Vec3;

use super::anim::PlayerType;
use super::codec::{Packet, PacketError, PacketReader, PacketWriter};
use super::sample::{ObjectUpdate, PlayerUpdate};
use super::{DeliveryMethod, MAX_PACKET_SIZE};
use crate::net::DatagramHeader;

fn read_player_type(reader: &mut PacketReader<'_>) -> Result<PlayerType, PacketError> {
    let raw = reader.read_u8()?;
    PlayerType::from_u8(raw).ok_or(PacketError::InvalidPlayerType(raw))
}

/// Assigns the receiving client its player slot and spawn point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreateControllablePlayer {
    pub index: u8,
    pub player_type: PlayerType,
    pub pos: Vec3,
}

impl Packet for CreateControllablePlayer {
    const TYPE: u8 = 10;
    const DELIVERY: DeliveryMethod = DeliveryMethod::ReliableUnordered;
    const SIZE_HINT: usize = 1 + 1 + 1 + 6;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        reader.ensure(Self::SIZE_HINT - 1)?;
        Ok(Self {
            index: reader.read_u8()?,
            player_type: read_player_type(reader)?,
            pos: reader.read_position()?,
        })
    }

    fn write(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.index);
        writer.write_u8(self.player_type as u8);
        writer.write_position(self.pos);
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateAllPlayers {
    pub server_time: i64,
    pub players: Vec<PlayerUpdate>,
    pub objects: Vec<ObjectUpdate>,
}

impl UpdateAllPlayers {
    /// Spawned players that fit one unreliable datagram with no objects.
    pub const MAX_PLAYERS: usize = (MAX_PACKET_SIZE
        - DatagramHeader::SIZE
        - <Self as Packet>::SIZE_HINT)
        / PlayerUpdate::SPAWNED_WIRE_SIZE;
}

impl Packet for UpdateAllPlayers {
    const TYPE: u8 = 11;
    const DELIVERY: DeliveryMethod = DeliveryMethod::Unreliable;
    const SIZE_HINT: usize = 1 + 8 + 1 + 4;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        let server_time = reader.read_i64()?;

        let player_count = reader.read_u8()? as usize;
        // Every entry carries at least its index and flags.
        reader.ensure(player_count * 2)?;
        let mut players = Vec::with_capacity(player_count);
        for _ in 0..player_count {
            players.push(PlayerUpdate::read(reader)?);
        }

        let object_count = reader.read_i32()?;
        if object_count < 0 {
            return Err(PacketError::InvalidCount(object_count));
        }
        let object_count = object_count as usize;
        reader.ensure(object_count.saturating_mul(ObjectUpdate::WIRE_SIZE))?;
        let mut objects = Vec::with_capacity(object_count);
        for _ in 0..object_count {
            objects.push(ObjectUpdate::read(reader)?);
        }

        Ok(Self {
            server_time,
            players,
            objects,
        })
    }

    fn write(&self, writer: &mut PacketWriter) {
        let player_count = self.players.len().min(u8::MAX as usize);
        if player_count < self.players.len() {
            log::warn!(
                "UpdateAllPlayers: dropping {} player entries past the u8 count",
                self.players.len() - player_count
            );
        }

        writer.write_i64(self.server_time);
        writer.write_u8(player_count as u8);
        for player in &self.players[..player_count] {
            player.write(writer);
        }

        writer.write_i32(self.objects.len() as i32);
        for object in &self.objects {
            object.write(writer);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreateRemotePlayer {
    pub index: u8,
    pub player_type: PlayerType,
    pub pos: Vec3,
}

impl Packet for CreateRemotePlayer {
    const TYPE: u8 = 13;
    const DELIVERY: DeliveryMethod = DeliveryMethod::ReliableUnordered;
    const SIZE_HINT: usize = 1 + 1 + 1 + 6;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        reader.ensure(Self::SIZE_HINT - 1)?;
        Ok(Self {
            index: reader.read_u8()?,
            player_type: read_player_type(reader)?,
            pos: reader.read_position()?,
        })
    }

    fn write(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.index);
        writer.write_u8(self.player_type as u8);
        writer.write_position(self.pos);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyRemotePlayer {
    pub index: u8,
}

impl Packet for DestroyRemotePlayer {
    const TYPE: u8 = 14;
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
pub struct CreateRemoteObject {
    pub index: i32,
    pub pos: Vec3,
}

impl Packet for CreateRemoteObject {
    const TYPE: u8 = 15;
    const DELIVERY: DeliveryMethod = DeliveryMethod::ReliableUnordered;
    const SIZE_HINT: usize = 1 + 4 + 6;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        reader.ensure(Self::SIZE_HINT - 1)?;
        Ok(Self {
            index: reader.read_i32()?,
            pos: reader.read_position()?,
        })
    }

    fn write(&self, writer: &mut PacketWriter) {
        writer.write_i32(self.index);
        writer.write_position(self.pos);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyRemoteObject {
    pub index: i32,
}

impl Packet for DestroyRemoteObject {
    const TYPE: u8 = 16;
    const DELIVERY: DeliveryMethod = DeliveryMethod::ReliableUnordered;
    const SIZE_HINT: usize = 1 + 4;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            index: reader.read_i32()?,
        })
    }

    fn write(&self, writer: &mut PacketWriter) {
        writer.write_i32(self.index);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecreasePlayerHealth {
    pub index: u8,
    pub amount: u8,
}

impl Packet for DecreasePlayerHealth {
    const TYPE: u8 = 17;
    const DELIVERY: DeliveryMethod = DeliveryMethod::ReliableUnordered;
    const SIZE_HINT: usize = 3;

    fn read(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        reader.ensure(2)?;
        Ok(Self {
            index: reader.read_u8()?,
            amount: reader.read_u8()?,
        })
    }

    fn write(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.index);
        writer.write_u8(self.amount);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePlayerDied {
    pub index: u8,
}

impl Packet for RemotePlayerDied {
    const TYPE: u8 = 18;
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

/// Any server packet, decoded by its type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    CreateControllablePlayer(CreateControllablePlayer),
    UpdateAllPlayers(UpdateAllPlayers),
    CreateRemotePlayer(CreateRemotePlayer),
    DestroyRemotePlayer(DestroyRemotePlayer),
    CreateRemoteObject(CreateRemoteObject),
    DestroyRemoteObject(DestroyRemoteObject),
    DecreasePlayerHealth(DecreasePlayerHealth),
    RemotePlayerDied(RemotePlayerDied),
}

impl ServerPacket {
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let tag = *data.first().ok_or(PacketError::Empty)?;
        let packet = match tag {
            CreateControllablePlayer::TYPE => {
                Self::CreateControllablePlayer(CreateControllablePlayer::decode(data)?)
            }
            UpdateAllPlayers::TYPE => Self::UpdateAllPlayers(UpdateAllPlayers::decode(data)?),
            CreateRemotePlayer::TYPE => Self::CreateRemotePlayer(CreateRemotePlayer::decode(data)?),
            DestroyRemotePlayer::TYPE => {
                Self::DestroyRemotePlayer(DestroyRemotePlayer::decode(data)?)
            }
            CreateRemoteObject::TYPE => Self::CreateRemoteObject(CreateRemoteObject::decode(data)?),
            DestroyRemoteObject::TYPE => {
                Self::DestroyRemoteObject(DestroyRemoteObject::decode(data)?)
            }
            DecreasePlayerHealth::TYPE => {
                Self::DecreasePlayerHealth(DecreasePlayerHealth::decode(data)?)
            }
            RemotePlayerDied::TYPE => Self::RemotePlayerDied(RemotePlayerDied::decode(data)?),
            other => return Err(PacketError::UnknownType(other)),
        };
        Ok(packet)
    }

    pub fn encode(&self) -> Bytes {
        match self {
            Self::CreateControllablePlayer(p) => p.encode(),
            Self::UpdateAllPlayers(p) => p.encode(),
            Self::CreateRemotePlayer(p) => p.encode(),
            Self::DestroyRemotePlayer(p) => p.encode(),
            Self::CreateRemoteObject(p) => p.encode(),
            Self::DestroyRemoteObject(p) => p.encode(),
            Self::DecreasePlayerHealth(p) => p.encode(),
            Self::RemotePlayerDied(p) => p.encode(),
        }
    }

    pub fn delivery(&self) -> DeliveryMethod {
        match self {
            Self::UpdateAllPlayers(_) => UpdateAllPlayers::DELIVERY,
            _ => DeliveryMethod::ReliableUnordered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AnimState, EntitySample};
    use glam::Vec2;

    fn sample(x: f32, y: f32) -> EntitySample {
        EntitySample {
            pos: Vec3::new(x, y, 0.0),
            speed: Vec2::new(1.5, -0.25),
            anim_state: AnimState::JUMP,
            anim_time: 0.5,
            facing_left: false,
        }
    }

    #[test]
    fn create_remote_player_layout() {
        let packet = CreateRemotePlayer {
            index: 3,
            player_type: PlayerType::Spaz,
            pos: Vec3::new(258.0, 1.0, 0.0),
        };
        let data = packet.encode();
        assert_eq!(&data[..], &[13, 3, 1, 2, 1, 1, 0, 0, 0]);
        assert_eq!(CreateRemotePlayer::decode(&data).unwrap(), packet);
    }

    #[test]
    fn update_all_players_round_trip() {
        let packet = UpdateAllPlayers {
            server_time: 123_456,
            players: vec![
                PlayerUpdate {
                    index: 0,
                    sample: Some(sample(10.0, 20.0)),
                },
                PlayerUpdate {
                    index: 4,
                    sample: None,
                },
            ],
            objects: vec![ObjectUpdate {
                index: 9001,
                flags: 1,
                sample: sample(300.0, 40.0),
            }],
        };

        let decoded = UpdateAllPlayers::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.server_time, 123_456);
        assert_eq!(decoded.players.len(), 2);
        assert_eq!(decoded.players[0].sample, Some(sample(10.0, 20.0).quantized()));
        assert_eq!(decoded.players[1].sample, None);
        assert_eq!(decoded.objects[0].index, 9001);
        assert_eq!(decoded.objects[0].sample.pos, Vec3::new(300.0, 40.0, 0.0));
    }

    #[test]
    fn update_all_players_rejects_negative_object_count() {
        let mut writer = PacketWriter::with_capacity(16);
        writer.write_u8(UpdateAllPlayers::TYPE);
        writer.write_i64(1);
        writer.write_u8(0);
        writer.write_i32(-5);
        assert_eq!(
            UpdateAllPlayers::decode(&writer.finish()),
            Err(PacketError::InvalidCount(-5))
        );
    }

    #[test]
    fn update_all_players_rejects_inflated_counts() {
        let mut writer = PacketWriter::with_capacity(16);
        writer.write_u8(UpdateAllPlayers::TYPE);
        writer.write_i64(1);
        writer.write_u8(0);
        writer.write_i32(i32::MAX);
        assert!(matches!(
            UpdateAllPlayers::decode(&writer.finish()),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn full_snapshot_fits_one_datagram() {
        let snapshot = |count: usize| UpdateAllPlayers {
            server_time: i64::MAX,
            players: (0..count)
                .map(|index| PlayerUpdate {
                    index: index as u8,
                    sample: Some(sample(index as f32, 8.0)),
                })
                .collect(),
            objects: Vec::new(),
        };

        let full = snapshot(UpdateAllPlayers::MAX_PLAYERS).encode();
        assert!(DatagramHeader::SIZE + full.len() <= MAX_PACKET_SIZE);

        let over = snapshot(UpdateAllPlayers::MAX_PLAYERS + 1).encode();
        assert!(DatagramHeader::SIZE + over.len() > MAX_PACKET_SIZE);
    }

    #[test]
    fn server_packet_dispatches_on_tag() {
        let data = DecreasePlayerHealth {
            index: 1,
            amount: 2,
        }
        .encode();
        assert_eq!(
            ServerPacket::decode(&data).unwrap(),
            ServerPacket::DecreasePlayerHealth(DecreasePlayerHealth {
                index: 1,
                amount: 2
            })
        );
        assert_eq!(ServerPacket::decode(&[200]), Err(PacketError::UnknownType(200)));
        assert_eq!(ServerPacket::decode(&[]), Err(PacketError::Empty));
    }

    #[test]
    fn invalid_player_type_is_rejected() {
        let data = [CreateControllablePlayer::TYPE, 0, 77, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            CreateControllablePlayer::decode(&data),
            Err(PacketError::InvalidPlayerType(77))
        );
    }
}
