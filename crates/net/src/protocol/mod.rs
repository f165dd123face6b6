mod anim;
mod client;
mod codec;
mod sample;
mod server;

use serde::{Deserialize, Serialize};

pub use anim::{AnimState, PlayerType};
pub use client::{ClientPacket, SelfDied, UpdateSelf};
pub use codec::{
    Packet, PacketError, PacketReader, PacketWriter, VELOCITY_SCALE, decode_velocity,
    encode_position, encode_velocity,
};
pub use sample::{EntitySample, ObjectUpdate, PlayerUpdate};
pub use server::{
    CreateControllablePlayer, CreateRemoteObject, CreateRemotePlayer, DecreasePlayerHealth,
    DestroyRemoteObject, DestroyRemotePlayer, RemotePlayerDied, ServerPacket, UpdateAllPlayers,
};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x4A5A_324E;
pub const DEFAULT_PORT: u16 = 10666;
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Player slots addressable by a `u8` index.
pub const MAX_PLAYERS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeliveryMethod {
    Unreliable = 0,
    ReliableUnordered = 1,
}

impl DeliveryMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unreliable),
            1 => Some(Self::ReliableUnordered),
            _ => None,
        }
    }

    #[inline]
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::ReliableUnordered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    #[default]
    Main = 0,
}

impl Channel {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Main),
            _ => None,
        }
    }
}
