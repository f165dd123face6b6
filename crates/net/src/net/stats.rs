use serde::{Deserialize, Serialize};

/// Drops a share of outgoing datagrams to exercise loss tolerance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// 0-100
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn new(loss_percent: f32) -> Self {
        Self {
            enabled: loss_percent > 0.0,
            loss_percent: loss_percent.clamp(0.0, 100.0),
        }
    }

    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand::random::<f32>() * 100.0 < self.loss_percent
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub duplicates: u64,
    pub resends: u64,
    /// Up
    pub bytes_sent: u64,
    /// Down
    pub bytes_received: u64,
    pub rtt_ms: f32,
    pub rtt_variance_ms: f32,
}
