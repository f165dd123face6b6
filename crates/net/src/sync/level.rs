use std::time::Instant;

use glam::{Vec2, Vec3};

use super::carry_over::PlayerCarryOver;
use super::dispatch::MainThreadQueue;
use super::extrapolate::extrapolate;
use super::registry::EntityRegistry;
use super::router::{HandlerId, PacketRouter, SharedRouter};
use crate::net::{ConnectionId, NetworkStats, TransportError};
use crate::protocol::{
    AnimState, Channel, CreateControllablePlayer, CreateRemoteObject, CreateRemotePlayer,
    DecreasePlayerHealth, DeliveryMethod, DestroyRemoteObject, DestroyRemotePlayer,
    EntitySample, Packet, PlayerType, RemotePlayerDied, SelfDied, UpdateAllPlayers, UpdateSelf,
};

pub type ActorId = u32;

/// What the level exposes to the network layer. Implemented by the game
/// (or a headless stand-in); every call happens on the logic thread.
pub trait LevelApi {
    /// Spawns the locally controlled player and attaches camera and HUD.
    fn spawn_player(&mut self, index: u8, player_type: PlayerType, pos: Vec3) -> ActorId;

    fn respawn_player(&mut self, actor: ActorId, pos: Vec2);

    fn spawn_remote_player(&mut self, index: u8, player_type: PlayerType, pos: Vec3) -> ActorId;

    fn spawn_remote_object(&mut self, index: i32, pos: Vec3) -> ActorId;

    fn spawn_corpse(&mut self, player_type: PlayerType, pos: Vec3, facing_left: bool);

    fn remove_actor(&mut self, actor: ActorId);

    fn damage_player(&mut self, actor: ActorId, amount: u8);

    fn apply_carry_over(&mut self, actor: ActorId, carry_over: &PlayerCarryOver);

    /// Drives a proxy actor to a received state.
    fn sync_actor(&mut self, actor: ActorId, sample: &EntitySample);

    /// `None` while the local player cannot report its state.
    fn sample_player(&self, actor: ActorId) -> Option<LocalPlayerState>;
}

/// Outbound side of a connection as seen by the level.
pub trait PacketSink {
    fn send_bytes(
        &self,
        payload: &[u8],
        delivery: DeliveryMethod,
        channel: Channel,
    ) -> Result<(), TransportError>;

    /// Smoothed round-trip time in seconds.
    fn round_trip_time(&self) -> f32;

    fn stats(&self) -> NetworkStats;

    fn send<P: Packet>(&self, packet: &P) -> Result<(), TransportError>
    where
        Self: Sized,
    {
        self.send_bytes(&packet.encode(), P::DELIVERY, Channel::Main)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPlayerState {
    pub pos: Vec3,
    pub anim_state: AnimState,
    pub anim_time: f32,
    pub facing_left: bool,
    pub controllable: bool,
    pub fire_pressed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LevelInit {
    /// Known when moving between levels of the same session.
    pub player_index: Option<u8>,
    pub carry_over: Option<PlayerCarryOver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    /// Connected, waiting for the server to assign the local slot.
    Synchronizing,
    Active,
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Synchronizing => "synchronizing",
            SessionState::Active => "active",
            SessionState::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPlayer {
    pub actor: ActorId,
    pub player_type: PlayerType,
}

/// Everything the level handler mutates. Lives on the logic thread; packet
/// handlers reach it only through queued jobs.
pub struct LevelState<A> {
    api: A,
    registry: EntityRegistry,
    session: SessionState,
    local_index: Option<u8>,
    local_player: Option<LocalPlayer>,
    last_server_time: Option<i64>,
    pending_carry_over: Option<PlayerCarryOver>,
}

impl<A: LevelApi> LevelState<A> {
    pub fn new(api: A, init: LevelInit) -> Self {
        Self {
            api,
            registry: EntityRegistry::new(),
            session: SessionState::Connecting,
            local_index: init.player_index,
            local_player: None,
            last_server_time: None,
            pending_carry_over: init.carry_over,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn local_index(&self) -> Option<u8> {
        self.local_index
    }

    pub fn local_player(&self) -> Option<LocalPlayer> {
        self.local_player
    }

    pub fn last_server_time(&self) -> Option<i64> {
        self.last_server_time
    }

    fn is_local(&self, index: u8) -> bool {
        self.local_index == Some(index)
    }

    pub fn connected(&mut self) {
        if self.session == SessionState::Connecting {
            self.session = if self.local_player.is_some() {
                SessionState::Active
            } else {
                SessionState::Synchronizing
            };
        }
    }

    pub fn create_controllable_player(&mut self, packet: &CreateControllablePlayer) {
        log::info!(
            "Assigned player slot {} as {}",
            packet.index,
            packet.player_type.as_str()
        );
        self.local_index = Some(packet.index);
        self.session = SessionState::Active;

        if self.registry.destroy_player(&mut self.api, packet.index) {
            log::debug!("Removed proxy occupying local slot {}", packet.index);
        }

        let actor = match self.local_player {
            Some(local) if local.player_type == packet.player_type => {
                self.api.respawn_player(local.actor, packet.pos.truncate());
                local.actor
            }
            previous => {
                if let Some(previous) = previous {
                    self.api.remove_actor(previous.actor);
                }
                let actor = self
                    .api
                    .spawn_player(packet.index, packet.player_type, packet.pos);
                self.local_player = Some(LocalPlayer {
                    actor,
                    player_type: packet.player_type,
                });
                actor
            }
        };

        if let Some(carry_over) = self.pending_carry_over.take() {
            self.api.apply_carry_over(actor, &carry_over);
        }
    }

    /// Applies a state snapshot. Returns false when it was not newer than the
    /// last applied one and was discarded.
    pub fn update_all_players(&mut self, packet: &UpdateAllPlayers, round_trip_time: f32) -> bool {
        if let Some(last) = self.last_server_time {
            if packet.server_time <= last {
                log::trace!(
                    "Discarding stale update {} (last applied {})",
                    packet.server_time,
                    last
                );
                return false;
            }
        }
        self.last_server_time = Some(packet.server_time);

        for update in &packet.players {
            let Some(sample) = update.sample else {
                continue;
            };
            if self.is_local(update.index) {
                continue;
            }
            let sample = extrapolate(&sample, round_trip_time);
            self.registry
                .apply_player(&mut self.api, update.index, &sample);
        }

        for update in &packet.objects {
            let sample = extrapolate(&update.sample, round_trip_time);
            self.registry
                .apply_object(&mut self.api, update.index, &sample);
        }

        true
    }

    pub fn create_remote_player(&mut self, packet: &CreateRemotePlayer) {
        if self.is_local(packet.index) {
            log::debug!("Ignoring remote player for the local slot {}", packet.index);
            return;
        }
        self.registry
            .create_player(&mut self.api, packet.index, packet.player_type, packet.pos);
    }

    pub fn destroy_remote_player(&mut self, packet: &DestroyRemotePlayer) {
        self.registry.destroy_player(&mut self.api, packet.index);
    }

    pub fn create_remote_object(&mut self, packet: &CreateRemoteObject) {
        self.registry
            .create_object(&mut self.api, packet.index, packet.pos);
    }

    pub fn destroy_remote_object(&mut self, packet: &DestroyRemoteObject) {
        self.registry.destroy_object(&mut self.api, packet.index);
    }

    pub fn decrease_player_health(&mut self, packet: &DecreasePlayerHealth) {
        if !self.is_local(packet.index) {
            return;
        }
        if let Some(local) = self.local_player {
            self.api.damage_player(local.actor, packet.amount);
        }
    }

    /// Leaves a corpse where the remote player was and freezes the proxy
    /// until the server moves it again.
    pub fn remote_player_died(&mut self, packet: &RemotePlayerDied) {
        if self.is_local(packet.index) {
            return;
        }
        let Some(player) = self.registry.player(packet.index).copied() else {
            return;
        };

        self.api.spawn_corpse(
            player.player_type,
            player.sample.pos,
            player.sample.facing_left,
        );

        let frozen = EntitySample {
            pos: player.sample.pos,
            speed: Vec2::ZERO,
            anim_state: AnimState::IDLE,
            anim_time: -1.0,
            facing_left: player.sample.facing_left,
        };
        self.registry
            .apply_player(&mut self.api, packet.index, &frozen);
    }

    pub fn update_self_packet(&self, update_time: i64) -> Option<UpdateSelf> {
        let index = self.local_index?;
        let local = self.local_player?;
        let state = self.api.sample_player(local.actor)?;

        Some(UpdateSelf {
            index,
            update_time,
            pos: state.pos,
            anim_state: state.anim_state,
            anim_time: state.anim_time,
            facing_left: state.facing_left,
            controllable: state.controllable,
            fire_pressed: state.fire_pressed,
        })
    }

    /// Removes every proxy. The local player stays; the level owns it.
    pub fn disconnect(&mut self) -> usize {
        self.session = SessionState::Disconnected;
        self.registry.clear(&mut self.api)
    }
}

/// Client-side glue between the router and the level: registers handlers
/// for every server packet, marshals them onto the logic thread and sends
/// the local player's state once per frame.
pub struct NetworkLevelHandler<A: LevelApi + 'static> {
    state: LevelState<A>,
    queue: MainThreadQueue<LevelState<A>>,
    router: SharedRouter,
    handlers: Vec<HandlerId>,
    started: Instant,
    update_accumulator: f32,
}

impl<A: LevelApi + 'static> NetworkLevelHandler<A> {
    pub fn new(api: A, router: SharedRouter, init: LevelInit) -> Self {
        let queue = MainThreadQueue::new();

        let handlers = {
            let mut router = router.write();
            vec![
                register(&mut router, &queue, |s, p: CreateControllablePlayer, _| {
                    s.create_controllable_player(&p)
                }),
                register(&mut router, &queue, |s, p: UpdateAllPlayers, rtt| {
                    s.update_all_players(&p, rtt);
                }),
                register(&mut router, &queue, |s, p: CreateRemotePlayer, _| {
                    s.create_remote_player(&p)
                }),
                register(&mut router, &queue, |s, p: DestroyRemotePlayer, _| {
                    s.destroy_remote_player(&p)
                }),
                register(&mut router, &queue, |s, p: CreateRemoteObject, _| {
                    s.create_remote_object(&p)
                }),
                register(&mut router, &queue, |s, p: DestroyRemoteObject, _| {
                    s.destroy_remote_object(&p)
                }),
                register(&mut router, &queue, |s, p: DecreasePlayerHealth, _| {
                    s.decrease_player_health(&p)
                }),
                register(&mut router, &queue, |s, p: RemotePlayerDied, _| {
                    s.remote_player_died(&p)
                }),
            ]
        };

        Self {
            state: LevelState::new(api, init),
            queue,
            router,
            handlers,
            started: Instant::now(),
            update_accumulator: 0.0,
        }
    }

    pub fn state(&self) -> &LevelState<A> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut LevelState<A> {
        &mut self.state
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn on_connected(&mut self) {
        self.state.connected();
    }

    /// Runs queued packet work, then sends `UpdateSelf` once per 60 Hz frame
    /// (`time_mult` is 1.0 per frame).
    pub fn on_update<S: PacketSink>(&mut self, time_mult: f32, sink: &S) {
        self.queue.drain(&mut self.state);

        if self.state.local_player.is_none() || self.state.session != SessionState::Active {
            return;
        }

        self.update_accumulator += time_mult;
        if self.update_accumulator < 1.0 {
            return;
        }
        self.update_accumulator = 0.0;

        let update_time = self.started.elapsed().as_millis() as i64;
        let Some(packet) = self.state.update_self_packet(update_time) else {
            return;
        };
        if let Err(e) = sink.send(&packet) {
            log::debug!("UpdateSelf not sent: {}", e);
        }
    }

    /// Reports the local player's death to the server. Returns false when no
    /// slot has been assigned yet.
    pub fn handle_player_died<S: PacketSink>(&self, sink: &S) -> bool {
        let Some(index) = self.state.local_index else {
            return false;
        };
        match sink.send(&SelfDied { index }) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to report death: {}", e);
                false
            }
        }
    }

    /// Drops work still queued for `connection` and removes all proxies.
    pub fn on_disconnected(&mut self, connection: ConnectionId) {
        let discarded = self.queue.discard(connection);
        let removed = self.state.disconnect();
        log::info!(
            "Session ended: removed {} remote actors, discarded {} pending jobs",
            removed,
            discarded
        );
    }

    pub fn debug_lines<S: PacketSink>(&self, sink: &S) -> Vec<String> {
        let stats = sink.stats();
        let local_index = self
            .state
            .local_index
            .map_or_else(|| "-".to_string(), |index| index.to_string());
        let last_update = self
            .state
            .last_server_time
            .map_or_else(|| "-".to_string(), |time| time.to_string());

        vec![
            format!("- Local Player Index: {}", local_index),
            format!(
                "- RTT: {} ms / Up: {} / Down: {}",
                (sink.round_trip_time() * 1000.0) as i32,
                stats.bytes_sent,
                stats.bytes_received
            ),
            format!("- Last Server Update: {}", last_update),
        ]
    }
}

impl<A: LevelApi + 'static> Drop for NetworkLevelHandler<A> {
    fn drop(&mut self) {
        let mut router = self.router.write();
        for id in self.handlers.drain(..) {
            router.remove_handler(id);
        }
    }
}

fn register<A, P, F>(
    router: &mut PacketRouter,
    queue: &MainThreadQueue<LevelState<A>>,
    apply: F,
) -> HandlerId
where
    A: LevelApi + 'static,
    P: Packet + Send + 'static,
    F: Fn(&mut LevelState<A>, P, f32) + Copy + Send + Sync + 'static,
{
    let queue = queue.clone();
    router.register::<P, _>(move |packet, context| {
        let round_trip_time = context.round_trip_time;
        queue.dispatch(context.connection, move |state| {
            // Dispatch can race teardown; a dead session takes no more work.
            if state.session == SessionState::Disconnected {
                log::trace!("Dropping {} for a disconnected session", P::TYPE);
                return;
            }
            apply(state, packet, round_trip_time)
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MessageContext;
    use crate::protocol::{ObjectUpdate, PlayerUpdate};
    use crate::sync::router::PacketRouter;
    use crate::sync::testing::{LevelCall, RecordingLevel, RecordingSink};

    const CONN: ConnectionId = ConnectionId(42);

    fn context(rtt: f32) -> MessageContext {
        MessageContext {
            connection: CONN,
            round_trip_time: rtt,
        }
    }

    fn deliver<P: Packet>(router: &SharedRouter, packet: &P, rtt: f32) {
        let handled = router.read().dispatch(&packet.encode(), &context(rtt)).unwrap();
        assert!(handled);
    }

    fn controllable(index: u8) -> CreateControllablePlayer {
        CreateControllablePlayer {
            index,
            player_type: PlayerType::Jazz,
            pos: Vec3::new(64.0, 128.0, 0.0),
        }
    }

    fn remote(index: u8) -> CreateRemotePlayer {
        CreateRemotePlayer {
            index,
            player_type: PlayerType::Spaz,
            pos: Vec3::new(10.0, 10.0, 0.0),
        }
    }

    fn snapshot(server_time: i64, index: u8, pos: Vec3, speed: Vec2) -> UpdateAllPlayers {
        UpdateAllPlayers {
            server_time,
            players: vec![PlayerUpdate {
                index,
                sample: Some(EntitySample::new(pos, speed)),
            }],
            objects: vec![],
        }
    }

    fn handler() -> (NetworkLevelHandler<RecordingLevel>, SharedRouter) {
        let router = PacketRouter::shared();
        let level = RecordingLevel::default();
        let handler = NetworkLevelHandler::new(level, router.clone(), LevelInit::default());
        (handler, router)
    }

    #[test]
    fn handlers_only_queue_work() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &remote(3), 0.0);
        assert_eq!(handler.pending_jobs(), 1);
        assert_eq!(handler.state().registry().player_count(), 0);

        handler.on_update(0.0, &sink);
        assert_eq!(handler.pending_jobs(), 0);
        assert_eq!(handler.state().registry().player_count(), 1);
    }

    #[test]
    fn own_index_never_gets_a_proxy() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &controllable(3), 0.0);
        deliver(&router, &remote(3), 0.0);
        deliver(&router, &remote(4), 0.0);
        handler.on_update(0.0, &sink);

        let state = handler.state();
        assert_eq!(state.local_index(), Some(3));
        assert_eq!(state.session(), SessionState::Active);
        assert!(state.registry().player(3).is_none());
        assert!(state.registry().player(4).is_some());

        // Entries for the local index are skipped when applying.
        let calls_before = state.api().calls.len();
        deliver(&router, &snapshot(1, 3, Vec3::new(500.0, 500.0, 0.0), Vec2::ZERO), 0.0);
        handler.on_update(0.0, &sink);
        assert_eq!(handler.state().api().calls.len(), calls_before);
    }

    #[test]
    fn controllable_player_replaces_proxy_on_its_slot() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &remote(6), 0.0);
        deliver(&router, &controllable(6), 0.0);
        handler.on_update(0.0, &sink);

        assert!(handler.state().registry().player(6).is_none());
        assert_eq!(handler.state().api().removed_actors(), 1);
    }

    #[test]
    fn same_type_respawns_other_type_replaces() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &controllable(1), 0.0);
        handler.on_update(0.0, &sink);
        let first = handler.state().local_player().unwrap().actor;

        deliver(&router, &controllable(1), 0.0);
        handler.on_update(0.0, &sink);
        assert_eq!(handler.state().local_player().unwrap().actor, first);
        assert!(handler
            .state()
            .api()
            .calls
            .contains(&LevelCall::Respawn(first, Vec2::new(64.0, 128.0))));

        let mut lori = controllable(1);
        lori.player_type = PlayerType::Lori;
        deliver(&router, &lori, 0.0);
        handler.on_update(0.0, &sink);

        let local = handler.state().local_player().unwrap();
        assert_ne!(local.actor, first);
        assert_eq!(local.player_type, PlayerType::Lori);
        assert!(handler.state().api().calls.contains(&LevelCall::RemoveActor(first)));
    }

    #[test]
    fn reversed_snapshots_keep_the_newest() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &remote(2), 0.0);
        deliver(&router, &snapshot(200, 2, Vec3::new(300.0, 40.0, 0.0), Vec2::ZERO), 0.0);
        deliver(&router, &snapshot(100, 2, Vec3::new(100.0, 40.0, 0.0), Vec2::ZERO), 0.0);
        handler.on_update(0.0, &sink);

        let state = handler.state();
        assert_eq!(state.last_server_time(), Some(200));
        assert_eq!(state.registry().player(2).unwrap().sample.pos.x, 300.0);
    }

    #[test]
    fn equal_timestamp_is_discarded() {
        let mut state = LevelState::new(RecordingLevel::default(), LevelInit::default());
        let update = snapshot(50, 0, Vec3::ZERO, Vec2::ZERO);

        assert!(state.update_all_players(&update, 0.0));
        assert!(!state.update_all_players(&update, 0.0));
    }

    #[test]
    fn snapshot_is_extrapolated_by_round_trip_time() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &remote(8), 0.0);
        deliver(&router, &CreateRemoteObject { index: 77, pos: Vec3::ZERO }, 0.0);
        let mut update = snapshot(1, 8, Vec3::new(100.0, 100.0, 0.0), Vec2::new(10.0, 0.0));
        update.objects.push(ObjectUpdate {
            index: 77,
            flags: 1,
            sample: EntitySample::new(Vec3::new(20.0, 30.0, 0.0), Vec2::new(0.0, -20.0)),
        });
        deliver(&router, &update, 0.1);
        handler.on_update(0.0, &sink);

        let registry = handler.state().registry();
        let player = registry.player(8).unwrap().sample.pos;
        assert!((player.x - 101.0).abs() < 0.01);
        assert!((player.y - 100.0).abs() < 0.01);
        let object = registry.object(77).unwrap().sample.pos;
        assert!((object.y - 28.0).abs() < 0.01);
    }

    #[test]
    fn health_decrease_only_for_local_player() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &controllable(0), 0.0);
        deliver(&router, &DecreasePlayerHealth { index: 1, amount: 2 }, 0.0);
        deliver(&router, &DecreasePlayerHealth { index: 0, amount: 1 }, 0.0);
        handler.on_update(0.0, &sink);

        let actor = handler.state().local_player().unwrap().actor;
        let damage: Vec<_> = handler
            .state()
            .api()
            .calls
            .iter()
            .filter(|call| matches!(call, LevelCall::Damage(..)))
            .cloned()
            .collect();
        assert_eq!(damage, vec![LevelCall::Damage(actor, 1)]);
    }

    #[test]
    fn remote_death_leaves_corpse_and_freezes_proxy() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &controllable(0), 0.0);
        deliver(&router, &remote(5), 0.0);
        deliver(&router, &snapshot(1, 5, Vec3::new(50.0, 60.0, 0.0), Vec2::new(3.0, 0.0)), 0.0);
        deliver(&router, &RemotePlayerDied { index: 5 }, 0.0);
        deliver(&router, &RemotePlayerDied { index: 0 }, 0.0);
        handler.on_update(0.0, &sink);

        let state = handler.state();
        let corpses = state
            .api()
            .calls
            .iter()
            .filter(|call| matches!(call, LevelCall::Corpse(..)))
            .count();
        assert_eq!(corpses, 1);

        let sample = state.registry().player(5).unwrap().sample;
        assert_eq!(sample.speed, Vec2::ZERO);
        assert_eq!(sample.anim_state, AnimState::IDLE);
        assert_eq!(sample.anim_time, -1.0);
        assert_eq!(sample.pos, Vec3::new(50.0, 60.0, 0.0));
    }

    #[test]
    fn update_self_sent_once_per_frame() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &controllable(4), 0.0);
        handler.on_update(0.5, &sink);
        assert!(sink.sent().is_empty());

        handler.on_update(0.5, &sink);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, DeliveryMethod::Unreliable);
        // tag + 26 byte body
        assert_eq!(sent[0].0.len(), 27);

        let packet = UpdateSelf::decode(&sent[0].0).unwrap();
        assert_eq!(packet.index, 4);
        assert_eq!(packet.pos, Vec3::new(64.0, 128.0, 0.0));
    }

    #[test]
    fn nothing_sent_before_slot_assignment() {
        let (mut handler, _router) = handler();
        let sink = RecordingSink::default();

        handler.on_update(5.0, &sink);
        assert!(sink.sent().is_empty());
        assert!(!handler.handle_player_died(&sink));
    }

    #[test]
    fn player_death_is_reported_reliably() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &controllable(9), 0.0);
        handler.on_update(0.0, &sink);
        assert!(handler.handle_player_died(&sink));

        let sent = sink.sent();
        let (bytes, delivery) = sent.last().unwrap();
        assert_eq!(*delivery, DeliveryMethod::ReliableUnordered);
        assert_eq!(SelfDied::decode(bytes).unwrap(), SelfDied { index: 9 });
    }

    #[test]
    fn carry_over_applied_once() {
        let router = PacketRouter::shared();
        let carry_over = crate::sync::PlayerProgress::new(PlayerType::Jazz).prepare_carry_over();
        let init = LevelInit {
            player_index: None,
            carry_over: Some(carry_over),
        };
        let mut handler = NetworkLevelHandler::new(RecordingLevel::default(), router.clone(), init);
        let sink = RecordingSink::default();

        deliver(&router, &controllable(2), 0.0);
        deliver(&router, &controllable(2), 0.0);
        handler.on_update(0.0, &sink);

        let applied = handler
            .state()
            .api()
            .calls
            .iter()
            .filter(|call| matches!(call, LevelCall::CarryOver(..)))
            .count();
        assert_eq!(applied, 1);
    }

    #[test]
    fn disconnect_discards_pending_work_and_proxies() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        handler.on_connected();
        assert_eq!(handler.state().session(), SessionState::Synchronizing);

        deliver(&router, &remote(1), 0.0);
        deliver(&router, &CreateRemoteObject { index: 3, pos: Vec3::ZERO }, 0.0);
        handler.on_update(0.0, &sink);
        deliver(&router, &remote(2), 0.0);

        handler.on_disconnected(CONN);
        handler.on_update(0.0, &sink);

        let state = handler.state();
        assert_eq!(state.session(), SessionState::Disconnected);
        assert_eq!(state.registry().player_count(), 0);
        assert_eq!(state.registry().object_count(), 0);
        assert_eq!(state.api().spawned_remote_players(), 1);
    }

    #[test]
    fn packets_after_disconnect_do_not_revive_the_session() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        handler.on_connected();
        handler.on_disconnected(CONN);

        deliver(&router, &remote(1), 0.0);
        deliver(&router, &CreateRemoteObject { index: 3, pos: Vec3::ZERO }, 0.0);
        deliver(&router, &snapshot(50, 4, Vec3::ONE, Vec2::ZERO), 0.0);
        deliver(&router, &controllable(0), 0.0);
        handler.on_update(1.0, &sink);

        let state = handler.state();
        assert_eq!(state.session(), SessionState::Disconnected);
        assert_eq!(state.registry().player_count(), 0);
        assert_eq!(state.registry().object_count(), 0);
        assert_eq!(state.local_player(), None);
        assert_eq!(state.last_server_time(), None);
        assert!(state.api().calls.is_empty());
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn dropping_handler_unregisters_only_its_handlers() {
        let router = PacketRouter::shared();
        router
            .write()
            .register::<RemotePlayerDied, _>(|_, _| {});

        let level = RecordingLevel::default();
        let handler = NetworkLevelHandler::new(level, router.clone(), LevelInit::default());
        assert_eq!(router.read().handler_count(RemotePlayerDied::TYPE), 2);

        drop(handler);
        assert_eq!(router.read().handler_count(RemotePlayerDied::TYPE), 1);
        assert_eq!(router.read().handler_count(UpdateAllPlayers::TYPE), 0);
    }

    #[test]
    fn malformed_snapshot_does_not_touch_state() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        let result = router
            .read()
            .dispatch(&[UpdateAllPlayers::TYPE, 1, 2], &context(0.0));
        assert!(result.is_err());
        assert_eq!(handler.pending_jobs(), 0);

        handler.on_update(0.0, &sink);
        assert!(handler.state().api().calls.is_empty());
        assert_eq!(handler.state().last_server_time(), None);
    }

    #[test]
    fn debug_lines_report_session() {
        let (mut handler, router) = handler();
        let sink = RecordingSink::default();

        deliver(&router, &controllable(7), 0.0);
        deliver(&router, &snapshot(1234, 1, Vec3::ZERO, Vec2::ZERO), 0.0);
        handler.on_update(0.0, &sink);

        let lines = handler.debug_lines(&sink);
        assert_eq!(lines[0], "- Local Player Index: 7");
        assert!(lines[1].starts_with("- RTT: 50 ms"));
        assert_eq!(lines[2], "- Last Server Update: 1234");
    }
}
