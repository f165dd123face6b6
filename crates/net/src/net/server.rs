use std::collections::VecDeque;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;

use bytes::Bytes;

use super::config::TransportConfig;
use super::connection::{Connection, ConnectionId, ConnectionManager, ConnectionState, Incoming};
use super::datagram::{ControlMessage, DatagramHeader, DatagramKind};
use super::endpoint::{NetworkEndpoint, ensure_fits};
use super::events::{DisconnectReason, MessageContext, TransportError, TransportEvent};
use crate::protocol::{Channel, DeliveryMethod, PROTOCOL_VERSION, PacketReader};

/// Server side of the transport. Single threaded: the owner calls
/// [`ServerTransport::poll`] once per tick.
pub struct ServerTransport {
    endpoint: NetworkEndpoint,
    connections: ConnectionManager,
    config: TransportConfig,
    events: VecDeque<TransportEvent>,
}

impl ServerTransport {
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let endpoint = NetworkEndpoint::bind(addr)?;
        log::info!("Listening on {}", endpoint.local_addr());

        Ok(Self {
            endpoint,
            connections: ConnectionManager::new(config.max_connections, config.connection_timeout),
            config,
            events: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connected_count(&self) -> usize {
        self.connections.connected_count()
    }

    /// Receives pending datagrams, runs connection maintenance and returns
    /// the application payloads that arrived.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<(MessageContext, Bytes)>, TransportError> {
        let mut inbound = Vec::new();
        for (data, addr) in self.endpoint.receive()? {
            self.handle_datagram(data, addr, now, &mut inbound);
        }
        self.maintain(now);
        Ok(inbound)
    }

    fn handle_datagram(
        &mut self,
        data: Bytes,
        addr: SocketAddr,
        now: Instant,
        inbound: &mut Vec<(MessageContext, Bytes)>,
    ) {
        let mut reader = PacketReader::new(&data);
        let header = match DatagramHeader::read(&mut reader) {
            Ok(Some(header)) => header,
            Ok(None) => return,
            Err(e) => {
                log::debug!("Dropping datagram from {}: {}", addr, e);
                return;
            }
        };

        if self.connections.get_by_addr_mut(&addr).is_none() {
            if header.kind != DatagramKind::ConnectRequest {
                log::trace!("Ignoring datagram from unknown peer {}", addr);
                return;
            }
            if let Err(reason) = self.admit(addr, header.kind, reader.clone()) {
                self.deny(addr, reason, now);
                return;
            }
        }

        let Some(connection) = self.connections.get_by_addr_mut(&addr) else {
            return;
        };

        let incoming = match connection.process(&header, &mut reader, data.len(), now) {
            Ok(incoming) => incoming,
            Err(e) => {
                log::debug!("Dropping datagram from {}: {}", addr, e);
                return;
            }
        };
        let id = connection.id;

        match incoming {
            Incoming::Control(ControlMessage::ConnectRequest { .. }) => {
                if connection.state == ConnectionState::Connecting {
                    connection.state = ConnectionState::Connected;
                    log::info!("Client {} connected from {}", id, addr);
                    self.events.push_back(TransportEvent::Connected {
                        connection: id,
                        addr,
                    });
                }
                // Retried requests mean our accept was lost, so answer every one.
                let accept = connection.write_control(&ControlMessage::ConnectAccept, now);
                self.endpoint
                    .transmit(connection, &accept, &mut self.events);
            }
            Incoming::Control(ControlMessage::Disconnect) => {
                self.connections.remove(id);
                log::info!("Client {} disconnected", id);
                self.events.push_back(TransportEvent::Disconnected {
                    connection: id,
                    reason: DisconnectReason::Graceful,
                });
            }
            Incoming::Control(_) | Incoming::Duplicate => {}
            Incoming::Data { payload, .. } => {
                if connection.state == ConnectionState::Connected {
                    let context = MessageContext {
                        connection: id,
                        round_trip_time: connection.round_trip_time(),
                    };
                    inbound.push((context, data.slice_ref(payload)));
                }
            }
        }
    }

    fn admit(
        &mut self,
        addr: SocketAddr,
        kind: DatagramKind,
        mut reader: PacketReader<'_>,
    ) -> Result<(), String> {
        match ControlMessage::read_body(kind, &mut reader) {
            Ok(Some(ControlMessage::ConnectRequest { protocol_version }))
                if protocol_version == PROTOCOL_VERSION => {}
            Ok(Some(ControlMessage::ConnectRequest { protocol_version })) => {
                return Err(format!(
                    "Protocol version mismatch (server {}, client {})",
                    PROTOCOL_VERSION, protocol_version
                ));
            }
            _ => return Err("Malformed connect request".to_string()),
        }

        self.connections
            .get_or_create(addr, &self.config)
            .map(|_| ())
            .map_err(str::to_string)
    }

    fn deny(&mut self, addr: SocketAddr, reason: String, now: Instant) {
        log::info!("Denying connection from {}: {}", addr, reason);
        let mut connection = Connection::new(ConnectionId(0), addr, &self.config);
        let datagram = connection.write_control(&ControlMessage::ConnectDeny { reason }, now);
        if let Err(e) = self.endpoint.send_to(&datagram, addr) {
            log::debug!("Failed to deny {}: {}", addr, e);
        }
    }

    fn maintain(&mut self, now: Instant) {
        for connection in self.connections.cleanup_timed_out(now) {
            log::info!("Client {} timed out", connection.id);
            self.events.push_back(TransportEvent::Disconnected {
                connection: connection.id,
                reason: DisconnectReason::Timeout,
            });
        }

        for connection in self.connections.iter_mut() {
            if connection.state != ConnectionState::Connected {
                continue;
            }

            let (resends, failures) = connection.poll_resends(now, &self.config);
            for datagram in resends {
                self.endpoint
                    .transmit(connection, &datagram, &mut self.events);
            }
            for failure in failures {
                log::debug!("Delivery to client {} failed: {:?}", connection.id, failure);
                self.events.push_back(TransportEvent::DeliveryFailed {
                    connection: connection.id,
                    failure,
                });
            }

            if connection.needs_keep_alive(now, self.config.keep_alive_interval) {
                let keep_alive = connection.write_control(&ControlMessage::KeepAlive, now);
                self.endpoint
                    .transmit(connection, &keep_alive, &mut self.events);
            }
        }
    }

    pub fn send_to(
        &mut self,
        id: ConnectionId,
        payload: &[u8],
        delivery: DeliveryMethod,
        channel: Channel,
    ) -> Result<(), TransportError> {
        ensure_fits(payload.len(), delivery)?;

        let connection = self
            .connections
            .get_mut(id)
            .ok_or(TransportError::UnknownConnection(id))?;
        if connection.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }

        match connection.write_data(payload, delivery, channel, Instant::now()) {
            Ok(datagram) => self
                .endpoint
                .transmit(connection, &datagram, &mut self.events),
            Err(failure) => self.events.push_back(TransportEvent::DeliveryFailed {
                connection: id,
                failure,
            }),
        }
        Ok(())
    }

    /// Sends `payload` to every connected client except `except`.
    pub fn broadcast(
        &mut self,
        payload: &[u8],
        delivery: DeliveryMethod,
        channel: Channel,
        except: Option<ConnectionId>,
    ) -> Result<(), TransportError> {
        ensure_fits(payload.len(), delivery)?;

        let now = Instant::now();
        for connection in self.connections.iter_mut() {
            if connection.state != ConnectionState::Connected || Some(connection.id) == except {
                continue;
            }

            match connection.write_data(payload, delivery, channel, now) {
                Ok(datagram) => self
                    .endpoint
                    .transmit(connection, &datagram, &mut self.events),
                Err(failure) => self.events.push_back(TransportEvent::DeliveryFailed {
                    connection: connection.id,
                    failure,
                }),
            }
        }
        Ok(())
    }

    /// Drops a client, telling it so.
    pub fn disconnect(&mut self, id: ConnectionId) {
        let Some(mut connection) = self.connections.remove(id) else {
            return;
        };

        let datagram = connection.write_control(&ControlMessage::Disconnect, Instant::now());
        self.endpoint
            .transmit(&mut connection, &datagram, &mut self.events);
        connection.close();

        log::info!("Client {} kicked", id);
        self.events.push_back(TransportEvent::Disconnected {
            connection: id,
            reason: DisconnectReason::Kicked,
        });
    }

    pub fn shutdown(&mut self) {
        for id in self.connections.ids() {
            self.disconnect(id);
        }
        self.endpoint.shutdown();
    }

    pub fn drain_events(&mut self) -> Vec<TransportEvent> {
        self.events.drain(..).collect()
    }
}
