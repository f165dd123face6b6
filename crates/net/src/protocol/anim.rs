use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Animation state of a player or object. Base poses can be combined with
    /// action overlays, e.g. `RUN | SHOOT`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AnimState: u32 {
        const WALK = 0x0000_0001;
        const RUN = 0x0000_0002;
        const DASH = 0x0000_0004;
        const JUMP = 0x0000_0008;
        const FALL = 0x0000_0010;
        const HOOK = 0x0000_0020;
        const HURT = 0x0000_0040;
        const COPTER = 0x0000_0080;
        const CROUCH = 0x0000_0100;
        const LOOKUP = 0x0000_0200;
        const SWIM = 0x0000_0400;
        const BUTTSTOMP = 0x0000_0800;
        const AIRBOARD = 0x0000_1000;
        const PUSH = 0x0000_2000;
        const SWING = 0x0000_4000;
        const FREEFALL = 0x0000_8000;
        const SHOOT = 0x0001_0000;
        const VINE = 0x0002_0000;
        const UPPERCUT = 0x0004_0000;
        const SIDEKICK = 0x0008_0000;
        const TRANSITION = 0x4000_0000;

        const _ = !0;
    }
}

impl AnimState {
    pub const IDLE: Self = Self::empty();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[rkyv(derive(Debug))]
#[repr(u8)]
pub enum PlayerType {
    #[default]
    Jazz = 0,
    Spaz = 1,
    Lori = 2,
    Frog = 3,
}

impl PlayerType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Jazz),
            1 => Some(Self::Spaz),
            2 => Some(Self::Lori),
            3 => Some(Self::Frog),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jazz => "Jazz",
            Self::Spaz => "Spaz",
            Self::Lori => "Lori",
            Self::Frog => "Frog",
        }
    }
}
