use std::collections::HashMap;
use std::f32::consts::TAU;

use glam::{Vec2, Vec3};

use jazz2_net::{
    ActorId, AnimState, EntitySample, LevelApi, LocalPlayerState, PlayerCarryOver, PlayerType,
};

const MAX_HEALTH: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActorKind {
    LocalPlayer,
    RemotePlayer { index: u8, player_type: PlayerType },
    RemoteObject { index: i32 },
}

#[derive(Debug, Clone)]
pub struct Actor {
    pub kind: ActorKind,
    pub pos: Vec3,
    pub anim_state: AnimState,
    pub facing_left: bool,
}

/// Level without rendering or physics. The local player runs in a circle
/// around its spawn point; remote actors just store what they are sent.
pub struct HeadlessLevel {
    actors: HashMap<ActorId, Actor>,
    next_actor: ActorId,
    local: Option<ActorId>,
    center: Vec3,
    radius: f32,
    angular_speed: f32,
    angle: f32,
    health: u8,
    died: bool,
    corpses: usize,
}

impl HeadlessLevel {
    pub fn new(radius: f32, angular_speed: f32) -> Self {
        Self {
            actors: HashMap::new(),
            next_actor: 0,
            local: None,
            center: Vec3::ZERO,
            radius,
            angular_speed,
            angle: 0.0,
            health: MAX_HEALTH,
            died: false,
            corpses: 0,
        }
    }

    fn add(&mut self, kind: ActorKind, pos: Vec3) -> ActorId {
        self.next_actor += 1;
        self.actors.insert(
            self.next_actor,
            Actor {
                kind,
                pos,
                anim_state: AnimState::IDLE,
                facing_left: false,
            },
        );
        self.next_actor
    }

    pub fn actor(&self, actor: ActorId) -> Option<&Actor> {
        self.actors.get(&actor)
    }

    pub fn local_pos(&self) -> Option<Vec3> {
        self.local.and_then(|actor| self.actor(actor)).map(|actor| actor.pos)
    }

    pub fn health(&self) -> u8 {
        self.health
    }

    pub fn corpses(&self) -> usize {
        self.corpses
    }

    pub fn remote_players(&self) -> impl Iterator<Item = (u8, &Actor)> {
        self.actors.values().filter_map(|actor| match actor.kind {
            ActorKind::RemotePlayer { index, .. } => Some((index, actor)),
            _ => None,
        })
    }

    pub fn remote_object_count(&self) -> usize {
        self.actors
            .values()
            .filter(|actor| matches!(actor.kind, ActorKind::RemoteObject { .. }))
            .count()
    }

    /// Moves the local player `dt` seconds further along its circle.
    pub fn advance(&mut self, dt: f32) {
        let Some(actor) = self.local.and_then(|actor| self.actors.get_mut(&actor)) else {
            return;
        };

        self.angle = (self.angle + self.angular_speed * dt) % TAU;
        let (sin, cos) = self.angle.sin_cos();
        actor.pos = self.center + Vec3::new(cos, sin, 0.0) * self.radius;
        // Moving counter-clockwise, x decreases in the upper half.
        actor.facing_left = sin > 0.0;
        actor.anim_state = AnimState::RUN;
    }

    /// True once after the local player ran out of health. Health is
    /// restored for the next life.
    pub fn take_death(&mut self) -> bool {
        if !self.died {
            return false;
        }
        self.died = false;
        self.health = MAX_HEALTH;
        true
    }
}

impl LevelApi for HeadlessLevel {
    fn spawn_player(&mut self, index: u8, player_type: PlayerType, pos: Vec3) -> ActorId {
        if let Some(previous) = self.local.take() {
            self.actors.remove(&previous);
        }
        let actor = self.add(ActorKind::LocalPlayer, pos);
        self.local = Some(actor);
        self.center = pos;
        self.angle = 0.0;
        self.health = MAX_HEALTH;
        log::info!("Playing as {} in slot {}", player_type.as_str(), index);
        actor
    }

    fn respawn_player(&mut self, actor: ActorId, pos: Vec2) {
        if let Some(player) = self.actors.get_mut(&actor) {
            player.pos = pos.extend(player.pos.z);
            self.center = player.pos;
            self.angle = 0.0;
            self.health = MAX_HEALTH;
        }
    }

    fn spawn_remote_player(&mut self, index: u8, player_type: PlayerType, pos: Vec3) -> ActorId {
        log::info!("Player {} ({}) appeared at {}", index, player_type.as_str(), pos);
        self.add(ActorKind::RemotePlayer { index, player_type }, pos)
    }

    fn spawn_remote_object(&mut self, index: i32, pos: Vec3) -> ActorId {
        log::debug!("Object {} appeared at {}", index, pos);
        self.add(ActorKind::RemoteObject { index }, pos)
    }

    fn spawn_corpse(&mut self, player_type: PlayerType, pos: Vec3, _facing_left: bool) {
        log::info!("{} died at {}", player_type.as_str(), pos);
        self.corpses += 1;
    }

    fn remove_actor(&mut self, actor: ActorId) {
        if let Some(removed) = self.actors.remove(&actor) {
            log::debug!("Removed {:?}", removed.kind);
        }
        if self.local == Some(actor) {
            self.local = None;
        }
    }

    fn damage_player(&mut self, actor: ActorId, amount: u8) {
        if self.local != Some(actor) || self.died {
            return;
        }
        self.health = self.health.saturating_sub(amount);
        log::info!("Hit for {}, {} health left", amount, self.health);
        if self.health == 0 {
            self.died = true;
        }
    }

    fn apply_carry_over(&mut self, _actor: ActorId, carry_over: &PlayerCarryOver) {
        log::info!(
            "Carried over {} lives and {} points",
            carry_over.lives,
            carry_over.score
        );
    }

    fn sync_actor(&mut self, actor: ActorId, sample: &EntitySample) {
        if let Some(proxy) = self.actors.get_mut(&actor) {
            proxy.pos = sample.pos;
            proxy.anim_state = sample.anim_state;
            proxy.facing_left = sample.facing_left;
        }
    }

    fn sample_player(&self, actor: ActorId) -> Option<LocalPlayerState> {
        let player = self.actors.get(&actor)?;
        Some(LocalPlayerState {
            pos: player.pos,
            anim_state: player.anim_state,
            anim_time: 0.0,
            facing_left: player.facing_left,
            controllable: !self.died,
            fire_pressed: false,
        })
    }
}
