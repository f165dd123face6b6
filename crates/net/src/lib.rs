pub mod net;
pub mod protocol;
pub mod sync;

pub use net::{
    ClientTransport, ConnectionId, ConnectionState, DeliveryFailure, DisconnectReason,
    MessageContext, NetworkStats, PacketLossSimulation, ServerTransport, TransportConfig,
    TransportError, TransportEvent,
};
pub use protocol::{
    AnimState, Channel, ClientPacket, DEFAULT_PORT, DEFAULT_TICK_RATE, DeliveryMethod,
    EntitySample, MAX_PACKET_SIZE, MAX_PLAYERS, PROTOCOL_VERSION, Packet, PacketError, PlayerType,
    ServerPacket,
};
pub use sync::{
    ActorId, EntityRegistry, LevelApi, LevelInit, LocalPlayerState, MainThreadQueue,
    NetworkLevelHandler, PacketRouter, PacketSink, PlayerCarryOver, PlayerProgress,
    SessionState, SharedRouter,
};
