use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use jazz2_net::protocol::{Channel, ClientPacket, ServerPacket};
use jazz2_net::{ServerTransport, TransportError, TransportEvent};

use crate::config::ServerConfig;
use crate::players::{Outgoing, PlayerTable};

pub struct GameServer {
    transport: ServerTransport,
    players: PlayerTable,
    config: ServerConfig,
    tick: u32,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    running: Arc<AtomicBool>,
    start_time: Instant,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> Result<Self, TransportError> {
        let capacity = config.player_capacity();
        if capacity < config.max_clients {
            log::warn!(
                "Limiting the server to {} players so snapshots fit one datagram",
                capacity
            );
        }
        let transport = ServerTransport::bind(bind_addr, config.transport())?;
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64);

        Ok(Self {
            transport,
            players: PlayerTable::new(capacity, config.spawn_point, config.player_type),
            tick: 0,
            tick_duration,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown();
    }

    pub fn shutdown(&mut self) {
        log::info!("Disconnecting {} clients", self.transport.connected_count());
        self.transport.shutdown();
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.accumulator += now - self.last_tick_time;
        self.last_tick_time = now;

        if let Err(e) = self.process_network(now) {
            log::error!("Network error: {}", e);
        }

        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.tick();
        }
    }

    fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        if self.tick % (self.config.tick_rate.max(1) * 10) == 0 {
            let stats = self.stats();
            log::debug!(
                "Tick {}: {}/{} clients, {} players",
                stats.tick,
                stats.client_count,
                stats.max_clients,
                stats.player_count
            );
        }
        if self.players.is_empty() {
            return;
        }

        let server_time = self.start_time.elapsed().as_millis() as i64;
        let snapshot = self.players.snapshot(server_time);
        self.flush(vec![Outgoing::Broadcast {
            packet: ServerPacket::UpdateAllPlayers(snapshot),
            except: None,
        }]);
    }

    fn process_network(&mut self, now: Instant) -> Result<(), TransportError> {
        let inbound = self.transport.poll(now)?;

        for event in self.transport.drain_events() {
            match event {
                TransportEvent::Connected { connection, addr } => {
                    match self.players.join(connection) {
                        Some(outgoing) => self.flush(outgoing),
                        None => {
                            log::warn!("No free player slot for {}", addr);
                            self.transport.disconnect(connection);
                        }
                    }
                }
                TransportEvent::Disconnected { connection, reason } => {
                    log::info!("Client {} {}", connection, reason.as_str());
                    let outgoing = self.players.leave(connection);
                    self.flush(outgoing);
                }
                TransportEvent::DeliveryFailed {
                    connection,
                    failure,
                } => {
                    log::debug!("Delivery to client {} failed: {:?}", connection, failure);
                }
            }
        }

        for (context, payload) in inbound {
            match ClientPacket::decode(&payload) {
                Ok(packet) => {
                    let outgoing = self.players.handle(context.connection, packet);
                    self.flush(outgoing);
                }
                Err(e) => log::debug!("Malformed packet from client {}: {}", context.connection, e),
            }
        }

        Ok(())
    }

    fn flush(&mut self, outgoing: Vec<Outgoing>) {
        for message in outgoing {
            let result = match &message {
                Outgoing::To(connection, packet) => self.transport.send_to(
                    *connection,
                    &packet.encode(),
                    packet.delivery(),
                    Channel::Main,
                ),
                Outgoing::Broadcast { packet, except } => self.transport.broadcast(
                    &packet.encode(),
                    packet.delivery(),
                    Channel::Main,
                    *except,
                ),
            };
            if let Err(e) = result {
                log::warn!("Failed to send {:?}: {}", message, e);
            }
        }
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.tick,
            client_count: self.transport.connected_count(),
            max_clients: self.config.player_capacity(),
            player_count: self.players.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u32,
    pub client_count: usize,
    pub max_clients: usize,
    pub player_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use jazz2_net::protocol::{CreateControllablePlayer, CreateRemotePlayer, UpdateAllPlayers};
    use jazz2_net::{ClientTransport, PacketRouter};
    use parking_lot::Mutex;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn run_until(server: &mut GameServer, mut done: impl FnMut(&GameServer) -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < TIMEOUT {
            server.tick_once();
            if done(server) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[derive(Default)]
    struct Seen {
        controllable: Vec<CreateControllablePlayer>,
        remote: Vec<CreateRemotePlayer>,
        snapshots: Vec<UpdateAllPlayers>,
    }

    fn client(server: &GameServer) -> (ClientTransport, Arc<Mutex<Seen>>) {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let router = PacketRouter::shared();
        {
            let mut router = router.write();
            let s = Arc::clone(&seen);
            router.register::<CreateControllablePlayer, _>(move |p, _| {
                s.lock().controllable.push(p)
            });
            let s = Arc::clone(&seen);
            router.register::<CreateRemotePlayer, _>(move |p, _| s.lock().remote.push(p));
            let s = Arc::clone(&seen);
            router.register::<UpdateAllPlayers, _>(move |p, _| s.lock().snapshots.push(p));
        }

        let transport =
            ClientTransport::connect(server.local_addr(), Default::default(), router).unwrap();
        (transport, seen)
    }

    #[test]
    fn players_are_introduced_and_snapshots_flow() {
        let mut server = GameServer::new("127.0.0.1:0", ServerConfig::default()).unwrap();

        let (_first, first_seen) = client(&server);
        assert!(run_until(&mut server, |_| !first_seen.lock().controllable.is_empty()));
        assert_eq!(first_seen.lock().controllable[0].index, 0);

        let (_second, second_seen) = client(&server);
        assert!(run_until(&mut server, |_| {
            !second_seen.lock().controllable.is_empty() && !first_seen.lock().remote.is_empty()
        }));
        assert_eq!(second_seen.lock().controllable[0].index, 1);
        assert_eq!(first_seen.lock().remote[0].index, 1);
        assert!(run_until(&mut server, |_| !second_seen.lock().remote.is_empty()));
        assert_eq!(second_seen.lock().remote[0].index, 0);

        assert!(run_until(&mut server, |_| !second_seen.lock().snapshots.is_empty()));
        assert_eq!(server.stats().player_count, 2);
    }

    #[test]
    fn leaving_frees_the_slot() {
        let mut server = GameServer::new("127.0.0.1:0", ServerConfig::default()).unwrap();

        let (first, first_seen) = client(&server);
        assert!(run_until(&mut server, |_| !first_seen.lock().controllable.is_empty()));
        drop(first);

        assert!(run_until(&mut server, |server| server.stats().player_count == 0));

        let (_second, second_seen) = client(&server);
        assert!(run_until(&mut server, |_| !second_seen.lock().controllable.is_empty()));
        assert_eq!(second_seen.lock().controllable[0].index, 0);
    }
}
