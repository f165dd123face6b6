use glam::Vec3;
use serde::{Deserialize, Serialize};

use jazz2_net::protocol::UpdateAllPlayers;
use jazz2_net::{PacketLossSimulation, PlayerType, TransportConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_clients: usize,
    pub spawn_point: Vec3,
    pub player_type: PlayerType,
    pub global_packet_loss: Option<PacketLossSimulation>,
}

impl ServerConfig {
    /// Slots actually handed out. Every tick's snapshot has to fit one
    /// datagram, which bounds the table below `max_clients` when that is large.
    pub fn player_capacity(&self) -> usize {
        self.max_clients.min(UpdateAllPlayers::MAX_PLAYERS)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            max_connections: self.player_capacity(),
            packet_loss: self.global_packet_loss.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: jazz2_net::DEFAULT_TICK_RATE,
            max_clients: 32,
            spawn_point: Vec3::new(320.0, 160.0, 0.0),
            player_type: PlayerType::Jazz,
            global_packet_loss: None,
        }
    }
}
