mod carry_over;
mod dispatch;
mod extrapolate;
mod level;
mod registry;
mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use carry_over::{CarryOverError, PlayerCarryOver, PlayerProgress, WEAPON_COUNT};
pub use dispatch::MainThreadQueue;
pub use extrapolate::extrapolate;
pub use level::{
    ActorId, LevelApi, LevelInit, LevelState, LocalPlayer, LocalPlayerState, NetworkLevelHandler,
    PacketSink, SessionState,
};
pub use registry::{EntityRegistry, RemoteObject, RemotePlayer};
pub use router::{HandlerId, PacketRouter, SharedRouter};
