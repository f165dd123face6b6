use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use super::config::TransportConfig;
use super::connection::{Connection, ConnectionId, ConnectionState, Incoming};
use super::datagram::{ControlMessage, DatagramHeader};
use super::endpoint::{NetworkEndpoint, ensure_fits};
use super::events::{DisconnectReason, MessageContext, TransportError, TransportEvent};
use super::stats::NetworkStats;
use crate::protocol::{Channel, DeliveryMethod, PROTOCOL_VERSION, PacketReader};
use crate::sync::{PacketSink, SharedRouter};

const IO_SLEEP: Duration = Duration::from_millis(1);

struct Session {
    connection: Connection,
    events: VecDeque<TransportEvent>,
    connect_started: Instant,
    last_connect_request: Instant,
}

impl Session {
    fn request_connect(&mut self, endpoint: &NetworkEndpoint, now: Instant) {
        let request = self.connection.write_control(
            &ControlMessage::ConnectRequest {
                protocol_version: PROTOCOL_VERSION,
            },
            now,
        );
        self.last_connect_request = now;
        endpoint.transmit(&mut self.connection, &request, &mut self.events);
    }

    fn accept(&mut self) {
        if self.connection.state == ConnectionState::Connecting {
            self.connection.state = ConnectionState::Connected;
            log::info!("Connected to {}", self.connection.addr);
            self.events.push_back(TransportEvent::Connected {
                connection: self.connection.id,
                addr: self.connection.addr,
            });
        }
    }

    fn close(&mut self, reason: DisconnectReason) {
        if self.connection.state == ConnectionState::Disconnected {
            return;
        }
        log::info!(
            "Disconnected from {}: {}",
            self.connection.addr,
            reason.as_str()
        );
        self.connection.close();
        self.events.push_back(TransportEvent::Disconnected {
            connection: self.connection.id,
            reason,
        });
    }

    fn handle_datagram(
        &mut self,
        data: Bytes,
        now: Instant,
        inbound: &mut Vec<(MessageContext, Bytes)>,
    ) {
        if self.connection.state == ConnectionState::Disconnected {
            return;
        }

        let mut reader = PacketReader::new(&data);
        let header = match DatagramHeader::read(&mut reader) {
            Ok(Some(header)) => header,
            Ok(None) => return,
            Err(e) => {
                log::debug!("Dropping datagram from server: {}", e);
                return;
            }
        };

        let incoming = match self
            .connection
            .process(&header, &mut reader, data.len(), now)
        {
            Ok(incoming) => incoming,
            Err(e) => {
                log::debug!("Dropping datagram from server: {}", e);
                return;
            }
        };

        match incoming {
            Incoming::Duplicate => {}
            Incoming::Control(ControlMessage::ConnectAccept) => self.accept(),
            Incoming::Control(ControlMessage::ConnectDeny { reason }) => {
                self.close(DisconnectReason::Denied(reason))
            }
            Incoming::Control(ControlMessage::Disconnect) => self.close(DisconnectReason::Kicked),
            Incoming::Control(_) => {}
            Incoming::Data { payload, .. } => {
                // Data implies the server accepted us even if the accept was lost.
                self.accept();
                let context = MessageContext {
                    connection: self.connection.id,
                    round_trip_time: self.connection.round_trip_time(),
                };
                inbound.push((context, data.slice_ref(payload)));
            }
        }
    }

    fn maintain(&mut self, endpoint: &NetworkEndpoint, config: &TransportConfig, now: Instant) {
        match self.connection.state {
            ConnectionState::Connecting => {
                if now.saturating_duration_since(self.connect_started) > config.connect_timeout {
                    log::warn!("No answer from {}", self.connection.addr);
                    self.close(DisconnectReason::ConnectFailed);
                } else if now.saturating_duration_since(self.last_connect_request)
                    >= config.connect_retry_interval
                {
                    self.request_connect(endpoint, now);
                }
            }
            ConnectionState::Connected => {
                if self
                    .connection
                    .is_timed_out(now, config.connection_timeout)
                {
                    self.close(DisconnectReason::Timeout);
                    return;
                }

                let (resends, failures) = self.connection.poll_resends(now, config);
                for datagram in resends {
                    endpoint.transmit(&mut self.connection, &datagram, &mut self.events);
                }
                for failure in failures {
                    log::debug!("Delivery to {} failed: {:?}", self.connection.addr, failure);
                    self.events.push_back(TransportEvent::DeliveryFailed {
                        connection: self.connection.id,
                        failure,
                    });
                }

                if self
                    .connection
                    .needs_keep_alive(now, config.keep_alive_interval)
                {
                    let keep_alive = self.connection.write_control(&ControlMessage::KeepAlive, now);
                    endpoint.transmit(&mut self.connection, &keep_alive, &mut self.events);
                }
            }
            ConnectionState::Disconnected => {}
        }
    }
}

/// Client side of the transport: one server connection whose socket is
/// serviced on a dedicated I/O thread. Received packets are handed to the
/// router on that thread.
pub struct ClientTransport {
    endpoint: Arc<NetworkEndpoint>,
    session: Arc<Mutex<Session>>,
    connection_id: ConnectionId,
    server_addr: SocketAddr,
    io_thread: Option<JoinHandle<()>>,
}

impl ClientTransport {
    pub fn connect(
        server_addr: SocketAddr,
        config: TransportConfig,
        router: SharedRouter,
    ) -> Result<Self, TransportError> {
        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let endpoint = Arc::new(NetworkEndpoint::bind(bind_addr)?);

        let now = Instant::now();
        let connection = Connection::new(ConnectionId::new_unique(), server_addr, &config);
        let connection_id = connection.id;
        let mut session = Session {
            connection,
            events: VecDeque::new(),
            connect_started: now,
            last_connect_request: now,
        };

        log::info!("Connecting to {}", server_addr);
        session.request_connect(&endpoint, now);

        let session = Arc::new(Mutex::new(session));
        let io_thread = thread::Builder::new().name("net-io".into()).spawn({
            let endpoint = Arc::clone(&endpoint);
            let session = Arc::clone(&session);
            move || run_io(endpoint, server_addr, config, session, router)
        })?;

        Ok(Self {
            endpoint,
            session,
            connection_id,
            server_addr,
            io_thread: Some(io_thread),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.session.lock().connection.state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// Smoothed round-trip time in seconds.
    pub fn round_trip_time(&self) -> f32 {
        self.session.lock().connection.round_trip_time()
    }

    pub fn stats(&self) -> NetworkStats {
        self.session.lock().connection.stats().clone()
    }

    /// Queues one encoded packet. Delivery problems are reported through
    /// [`ClientTransport::drain_events`], not here.
    pub fn send_bytes(
        &self,
        payload: &[u8],
        delivery: DeliveryMethod,
        channel: Channel,
    ) -> Result<(), TransportError> {
        ensure_fits(payload.len(), delivery)?;

        let mut session = self.session.lock();
        let session = &mut *session;
        if session.connection.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }

        match session
            .connection
            .write_data(payload, delivery, channel, Instant::now())
        {
            Ok(datagram) => {
                self.endpoint
                    .transmit(&mut session.connection, &datagram, &mut session.events)
            }
            Err(failure) => session.events.push_back(TransportEvent::DeliveryFailed {
                connection: session.connection.id,
                failure,
            }),
        }
        Ok(())
    }

    pub fn drain_events(&self) -> Vec<TransportEvent> {
        self.session.lock().events.drain(..).collect()
    }

    pub fn disconnect(&mut self) {
        {
            let mut session = self.session.lock();
            let session = &mut *session;
            if session.connection.state != ConnectionState::Disconnected {
                let datagram = session
                    .connection
                    .write_control(&ControlMessage::Disconnect, Instant::now());
                self.endpoint
                    .transmit(&mut session.connection, &datagram, &mut session.events);
                session.close(DisconnectReason::Graceful);
            }
        }

        self.endpoint.shutdown();
        if let Some(handle) = self.io_thread.take() {
            if handle.join().is_err() {
                log::error!("Network I/O thread panicked");
            }
        }
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl PacketSink for ClientTransport {
    fn send_bytes(
        &self,
        payload: &[u8],
        delivery: DeliveryMethod,
        channel: Channel,
    ) -> Result<(), TransportError> {
        ClientTransport::send_bytes(self, payload, delivery, channel)
    }

    fn round_trip_time(&self) -> f32 {
        ClientTransport::round_trip_time(self)
    }

    fn stats(&self) -> NetworkStats {
        ClientTransport::stats(self)
    }
}

fn run_io(
    endpoint: Arc<NetworkEndpoint>,
    server_addr: SocketAddr,
    config: TransportConfig,
    session: Arc<Mutex<Session>>,
    router: SharedRouter,
) {
    log::debug!("Network I/O thread started");

    while endpoint.is_running() {
        let now = Instant::now();
        let datagrams = endpoint.receive().unwrap_or_else(|e| {
            log::warn!("Receive failed: {}", e);
            Vec::new()
        });

        let mut inbound = Vec::new();
        {
            let mut session = session.lock();
            for (data, addr) in datagrams {
                if addr != server_addr {
                    log::trace!("Ignoring datagram from {}", addr);
                    continue;
                }
                session.handle_datagram(data, now, &mut inbound);
            }
            session.maintain(&endpoint, &config, now);

            if session.connection.state == ConnectionState::Disconnected {
                endpoint.shutdown();
            }
        }

        if !inbound.is_empty() {
            let router = router.read();
            for (context, payload) in inbound {
                match router.dispatch(&payload, &context) {
                    Ok(true) => {}
                    Ok(false) => log::trace!("No handler for packet type {:?}", payload.first()),
                    Err(e) => log::debug!("Dropping malformed packet from server: {}", e),
                }
            }
        }

        thread::sleep(IO_SLEEP);
    }

    log::debug!("Network I/O thread stopped");
}
