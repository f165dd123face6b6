mod client;
mod config;
mod connection;
mod datagram;
mod endpoint;
mod events;
mod reliable;
mod server;
mod stats;
mod tracking;

pub use client::ClientTransport;
pub use config::TransportConfig;
pub use connection::{Connection, ConnectionId, ConnectionManager, ConnectionState, Incoming};
pub use datagram::{ControlMessage, DatagramHeader, DatagramKind};
pub use endpoint::NetworkEndpoint;
pub use events::{
    DeliveryFailure, DisconnectReason, MessageContext, TransportError, TransportEvent,
};
pub use reliable::{PendingMessage, ReliableQueue};
pub use server::ServerTransport;
pub use stats::{NetworkStats, PacketLossSimulation};
pub use tracking::{ACK_WINDOW, AckTracker, ReceiveTracker, ReliableWindow, sequence_greater_than};
