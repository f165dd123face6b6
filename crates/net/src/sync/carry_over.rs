use rkyv::rancor;
use rkyv::util::AlignedVec;
use serde::{Deserialize, Serialize};

use crate::protocol::PlayerType;

pub const WEAPON_COUNT: usize = 9;

#[derive(Debug, thiserror::Error)]
pub enum CarryOverError {
    #[error("carry-over serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("carry-over deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

/// Player progress handed from one level instance to the next.
///
/// Arrays may differ in length from the receiver's when the two sides were
/// built with a different weapon count; only the common prefix is copied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
pub struct PlayerCarryOver {
    pub player_type: PlayerType,
    pub lives: i32,
    pub score: i32,
    pub food_eaten: i32,
    pub current_weapon: u8,
    pub ammo: Vec<i16>,
    pub weapon_upgrades: Vec<u8>,
}

impl PlayerCarryOver {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CarryOverError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(CarryOverError::Serialize)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CarryOverError> {
        // Archived data must be aligned; input slices coming off the wire or
        // disk may not be.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(CarryOverError::Deserialize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProgress {
    pub player_type: PlayerType,
    pub lives: i32,
    pub score: i32,
    pub food_eaten: i32,
    pub current_weapon: u8,
    pub ammo: [i16; WEAPON_COUNT],
    pub weapon_upgrades: [u8; WEAPON_COUNT],
}

impl PlayerProgress {
    pub fn new(player_type: PlayerType) -> Self {
        Self {
            player_type,
            lives: 3,
            score: 0,
            food_eaten: 0,
            current_weapon: 0,
            ammo: [0; WEAPON_COUNT],
            weapon_upgrades: [0; WEAPON_COUNT],
        }
    }

    pub fn prepare_carry_over(&self) -> PlayerCarryOver {
        PlayerCarryOver {
            player_type: self.player_type,
            lives: self.lives,
            score: self.score,
            food_eaten: self.food_eaten,
            current_weapon: self.current_weapon,
            ammo: self.ammo.to_vec(),
            weapon_upgrades: self.weapon_upgrades.to_vec(),
        }
    }

    /// Takes over counters and as many ammo/upgrade entries as both sides
    /// have. The player type is kept.
    pub fn receive_carry_over(&mut self, carry_over: &PlayerCarryOver) {
        self.lives = carry_over.lives;
        self.score = carry_over.score;
        self.food_eaten = carry_over.food_eaten;
        self.current_weapon = carry_over.current_weapon;

        let n = self.ammo.len().min(carry_over.ammo.len());
        self.ammo[..n].copy_from_slice(&carry_over.ammo[..n]);

        let n = self.weapon_upgrades.len().min(carry_over.weapon_upgrades.len());
        self.weapon_upgrades[..n].copy_from_slice(&carry_over.weapon_upgrades[..n]);
    }
}
