use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::config::TransportConfig;
use super::datagram::{ControlMessage, DatagramHeader, DatagramKind};
use super::events::DeliveryFailure;
use super::reliable::ReliableQueue;
use super::stats::{NetworkStats, PacketLossSimulation};
use super::tracking::{AckTracker, ReceiveTracker, ReliableWindow};
use crate::protocol::{Channel, DeliveryMethod, PacketError, PacketReader, PacketWriter};

static NEXT_CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

const MAX_TRACKED_DATAGRAMS: usize = 256;
const RELIABLE_WINDOW: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub fn new_unique() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// What a received datagram turned out to be.
#[derive(Debug, PartialEq)]
pub enum Incoming<'a> {
    Control(ControlMessage),
    Data {
        payload: &'a [u8],
        delivery: DeliveryMethod,
        channel: Channel,
    },
    Duplicate,
}

/// One peer link: sequencing, acks, round-trip time, reliable resends and
/// bandwidth counters.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub state: ConnectionState,
    send_sequence: u32,
    ack_tracker: AckTracker,
    receive_tracker: ReceiveTracker,
    reliable: ReliableQueue,
    reliable_window: ReliableWindow,
    stats: NetworkStats,
    packet_loss_sim: PacketLossSimulation,
    last_receive_time: Instant,
    last_send_time: Instant,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, config: &TransportConfig) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            state: ConnectionState::Connecting,
            // Sequence 0 is never sent, so an ack of 0 from a peer that has
            // received nothing yet acknowledges nothing.
            send_sequence: 1,
            ack_tracker: AckTracker::new(MAX_TRACKED_DATAGRAMS, config.initial_rtt.as_secs_f32()),
            receive_tracker: ReceiveTracker::new(),
            reliable: ReliableQueue::new(config.max_pending_reliable),
            reliable_window: ReliableWindow::new(RELIABLE_WINDOW),
            stats: NetworkStats::default(),
            packet_loss_sim: config.packet_loss.clone(),
            last_receive_time: now,
            last_send_time: now,
        }
    }

    /// Smoothed round-trip time in seconds.
    pub fn round_trip_time(&self) -> f32 {
        self.ack_tracker.srtt()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn pending_reliable(&self) -> usize {
        self.reliable.len()
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_receive_time) > timeout
    }

    pub fn needs_keep_alive(&self, now: Instant, interval: Duration) -> bool {
        self.state == ConnectionState::Connected
            && now.saturating_duration_since(self.last_send_time) >= interval
    }

    fn resend_interval(&self, config: &TransportConfig) -> Duration {
        Duration::from_secs_f32(self.ack_tracker.srtt() * 1.5).max(config.resend_min_interval)
    }

    fn frame(
        &mut self,
        kind: DatagramKind,
        delivery: DeliveryMethod,
        channel: Channel,
        now: Instant,
        body: impl FnOnce(&mut PacketWriter),
    ) -> (u32, Bytes) {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1).max(1);

        let (ack, ack_bitfield) = self.receive_tracker.ack_data();
        let header = DatagramHeader {
            kind,
            delivery,
            channel,
            sequence,
            ack,
            ack_bitfield,
        };

        let mut writer = PacketWriter::with_capacity(DatagramHeader::SIZE + 32);
        header.write(&mut writer);
        body(&mut writer);

        self.ack_tracker.track(sequence, now);
        self.last_send_time = now;
        (sequence, writer.finish())
    }

    pub fn write_control(&mut self, message: &ControlMessage, now: Instant) -> Bytes {
        let (_, datagram) = self.frame(
            message.kind(),
            DeliveryMethod::Unreliable,
            Channel::Main,
            now,
            |writer| message.write_body(writer),
        );
        datagram
    }

    pub fn write_data(
        &mut self,
        payload: &[u8],
        delivery: DeliveryMethod,
        channel: Channel,
        now: Instant,
    ) -> Result<Bytes, DeliveryFailure> {
        match delivery {
            DeliveryMethod::Unreliable => {
                let (_, datagram) = self.frame(DatagramKind::Data, delivery, channel, now, |w| {
                    w.write_bytes(payload)
                });
                Ok(datagram)
            }
            DeliveryMethod::ReliableUnordered => {
                if self.reliable.is_full() {
                    return Err(DeliveryFailure::ReliableQueueFull);
                }
                let message_id = self.reliable.next_message_id();
                let (sequence, datagram) =
                    self.frame(DatagramKind::Data, delivery, channel, now, |w| {
                        w.write_u32(message_id);
                        w.write_bytes(payload);
                    });
                self.reliable.push(
                    message_id,
                    Bytes::copy_from_slice(payload),
                    channel,
                    sequence,
                    now,
                );
                Ok(datagram)
            }
        }
    }

    /// Applies the header's ack information and classifies the datagram.
    pub fn process<'a>(
        &mut self,
        header: &DatagramHeader,
        reader: &mut PacketReader<'a>,
        size: usize,
        now: Instant,
    ) -> Result<Incoming<'a>, PacketError> {
        self.last_receive_time = now;
        self.stats.packets_received += 1;
        self.stats.bytes_received += size as u64;

        if !self.receive_tracker.record_received(header.sequence) {
            self.stats.duplicates += 1;
            return Ok(Incoming::Duplicate);
        }

        let acked = self
            .ack_tracker
            .process_ack(header.ack, header.ack_bitfield, now);
        self.reliable.acknowledge(&acked);
        self.stats.rtt_ms = self.ack_tracker.srtt() * 1000.0;
        self.stats.rtt_variance_ms = self.ack_tracker.rtt_var() * 1000.0;

        if let Some(control) = ControlMessage::read_body(header.kind, reader)? {
            return Ok(Incoming::Control(control));
        }

        if header.delivery.is_reliable() {
            let message_id = reader.read_u32()?;
            if !self.reliable_window.insert(message_id) {
                self.stats.duplicates += 1;
                return Ok(Incoming::Duplicate);
            }
        }

        Ok(Incoming::Data {
            payload: reader.rest(),
            delivery: header.delivery,
            channel: header.channel,
        })
    }

    /// Re-frames reliable messages whose acknowledgement is overdue and
    /// reports those that ran out of attempts.
    pub fn poll_resends(
        &mut self,
        now: Instant,
        config: &TransportConfig,
    ) -> (Vec<Bytes>, Vec<DeliveryFailure>) {
        let interval = self.resend_interval(config);

        let failures = self
            .reliable
            .expire(now, interval, config.max_send_attempts)
            .into_iter()
            .map(|message_id| DeliveryFailure::ResendLimit { message_id })
            .collect();

        let mut datagrams = Vec::new();
        for (message_id, payload, channel) in self.reliable.due(now, interval) {
            let (sequence, datagram) = self.frame(
                DatagramKind::Data,
                DeliveryMethod::ReliableUnordered,
                channel,
                now,
                |w| {
                    w.write_u32(message_id);
                    w.write_bytes(&payload);
                },
            );
            self.reliable.mark_sent(message_id, sequence, now);
            self.stats.resends += 1;
            datagrams.push(datagram);
        }

        (datagrams, failures)
    }

    /// Bookkeeping for a datagram handed to the socket. Returns false when
    /// the loss simulation swallowed it.
    pub fn record_sent(&mut self, size: usize) -> bool {
        if self.packet_loss_sim.should_drop() {
            self.stats.packets_dropped += 1;
            return false;
        }
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += size as u64;
        true
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.reliable.clear();
    }
}

/// Server-side connection table keyed by peer address.
#[derive(Debug)]
pub struct ConnectionManager {
    clients_by_addr: HashMap<SocketAddr, ConnectionId>,
    clients: HashMap<ConnectionId, Connection>,
    max_clients: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients_by_addr: HashMap::new(),
            clients: HashMap::new(),
            max_clients,
            timeout,
        }
    }

    /// Returns the existing connection for `addr` or opens a new one.
    pub fn get_or_create(
        &mut self,
        addr: SocketAddr,
        config: &TransportConfig,
    ) -> Result<&mut Connection, &'static str> {
        let id = match self.clients_by_addr.get(&addr) {
            Some(&id) => id,
            None => {
                if self.clients.len() >= self.max_clients {
                    return Err("Server full");
                }
                let id = ConnectionId::new_unique();
                self.clients.insert(id, Connection::new(id, addr, config));
                self.clients_by_addr.insert(addr, id);
                id
            }
        };

        self.clients.get_mut(&id).ok_or("Connection table out of sync")
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut Connection> {
        let id = self.clients_by_addr.get(addr)?;
        self.clients.get_mut(id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.clients.get_mut(&id)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.clients.remove(&id)?;
        self.clients_by_addr.remove(&conn.addr);
        Some(conn)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.clients.values_mut()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.clients.keys().copied().collect()
    }

    pub fn cleanup_timed_out(&mut self, now: Instant) -> Vec<Connection> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_timed_out(now, self.timeout))
            .map(|(&id, _)| id)
            .collect();

        timed_out.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn connected_count(&self) -> usize {
        self.clients
            .values()
            .filter(|c| c.state == ConnectionState::Connected)
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.clients.len()
    }
}
