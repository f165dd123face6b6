use std::net::SocketAddr;

use super::connection::ConnectionId;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected {
        connection: ConnectionId,
        addr: SocketAddr,
    },
    Disconnected {
        connection: ConnectionId,
        reason: DisconnectReason,
    },
    DeliveryFailed {
        connection: ConnectionId,
        failure: DeliveryFailure,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Kicked,
    Denied(String),
    ConnectFailed,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::Denied(reason) => reason,
            DisconnectReason::ConnectFailed => "connection failed",
        }
    }
}

/// A message the transport gave up on. Unreliable messages are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    SendBufferFull,
    ReliableQueueFull,
    ResendLimit { message_id: u32 },
    Io(std::io::ErrorKind),
}

/// Per-message information handed to packet handlers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageContext {
    pub connection: ConnectionId,
    /// Smoothed round-trip time in seconds when the message was processed.
    pub round_trip_time: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not connected")]
    NotConnected,
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("datagram of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
}
