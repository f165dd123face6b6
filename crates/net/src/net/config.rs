use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::stats::PacketLossSimulation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub max_connections: usize,
    pub connection_timeout: Duration,
    pub connect_timeout: Duration,
    pub connect_retry_interval: Duration,
    pub keep_alive_interval: Duration,
    pub resend_min_interval: Duration,
    pub max_send_attempts: u32,
    pub max_pending_reliable: usize,
    /// Round-trip time assumed before the first ack arrives.
    pub initial_rtt: Duration,
    pub packet_loss: PacketLossSimulation,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_connections: 32,
            connection_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            connect_retry_interval: Duration::from_millis(250),
            keep_alive_interval: Duration::from_millis(100),
            resend_min_interval: Duration::from_millis(50),
            max_send_attempts: 30,
            max_pending_reliable: 1024,
            initial_rtt: Duration::from_millis(100),
            packet_loss: PacketLossSimulation::default(),
        }
    }
}
