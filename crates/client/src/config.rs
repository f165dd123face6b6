use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use jazz2_net::{PacketLossSimulation, TransportConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub frame_rate: u32,
    /// Radius of the local player's circle, in level units.
    pub orbit_radius: f32,
    /// Radians per second.
    pub orbit_speed: f32,
    pub duration: Option<Duration>,
    pub report_interval: Duration,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl ClientConfig {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            packet_loss: self.packet_loss.clone().unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: (Ipv4Addr::LOCALHOST, jazz2_net::DEFAULT_PORT).into(),
            frame_rate: 60,
            orbit_radius: 48.0,
            orbit_speed: 1.5,
            duration: None,
            report_interval: Duration::from_secs(2),
            packet_loss: None,
        }
    }
}
