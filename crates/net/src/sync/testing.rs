//! Recording doubles for the level and the transport.

use std::collections::HashMap;

use bytes::Bytes;
use glam::{Vec2, Vec3};
use parking_lot::Mutex;

use super::carry_over::PlayerCarryOver;
use super::level::{ActorId, LevelApi, LocalPlayerState, PacketSink};
use crate::net::{NetworkStats, TransportError};
use crate::protocol::{AnimState, Channel, DeliveryMethod, EntitySample, PlayerType};

#[derive(Debug, Clone, PartialEq)]
pub enum LevelCall {
    SpawnPlayer(ActorId, u8, PlayerType),
    Respawn(ActorId, Vec2),
    SpawnRemotePlayer(ActorId, u8),
    SpawnRemoteObject(ActorId, i32),
    Corpse(PlayerType, Vec3),
    RemoveActor(ActorId),
    Damage(ActorId, u8),
    CarryOver(ActorId),
    Sync(ActorId, EntitySample),
}

#[derive(Debug, Default)]
pub struct RecordingLevel {
    pub calls: Vec<LevelCall>,
    next_actor: ActorId,
    players: HashMap<ActorId, Vec3>,
}

impl RecordingLevel {
    fn next_actor(&mut self) -> ActorId {
        self.next_actor += 1;
        self.next_actor
    }

    pub fn spawned_remote_players(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, LevelCall::SpawnRemotePlayer(..)))
            .count()
    }

    pub fn removed_actors(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, LevelCall::RemoveActor(_)))
            .count()
    }
}

impl LevelApi for RecordingLevel {
    fn spawn_player(&mut self, index: u8, player_type: PlayerType, pos: Vec3) -> ActorId {
        let actor = self.next_actor();
        self.players.insert(actor, pos);
        self.calls.push(LevelCall::SpawnPlayer(actor, index, player_type));
        actor
    }

    fn respawn_player(&mut self, actor: ActorId, pos: Vec2) {
        if let Some(current) = self.players.get_mut(&actor) {
            *current = pos.extend(current.z);
        }
        self.calls.push(LevelCall::Respawn(actor, pos));
    }

    fn spawn_remote_player(&mut self, index: u8, _player_type: PlayerType, _pos: Vec3) -> ActorId {
        let actor = self.next_actor();
        self.calls.push(LevelCall::SpawnRemotePlayer(actor, index));
        actor
    }

    fn spawn_remote_object(&mut self, index: i32, _pos: Vec3) -> ActorId {
        let actor = self.next_actor();
        self.calls.push(LevelCall::SpawnRemoteObject(actor, index));
        actor
    }

    fn spawn_corpse(&mut self, player_type: PlayerType, pos: Vec3, _facing_left: bool) {
        self.calls.push(LevelCall::Corpse(player_type, pos));
    }

    fn remove_actor(&mut self, actor: ActorId) {
        self.players.remove(&actor);
        self.calls.push(LevelCall::RemoveActor(actor));
    }

    fn damage_player(&mut self, actor: ActorId, amount: u8) {
        self.calls.push(LevelCall::Damage(actor, amount));
    }

    fn apply_carry_over(&mut self, actor: ActorId, _carry_over: &PlayerCarryOver) {
        self.calls.push(LevelCall::CarryOver(actor));
    }

    fn sync_actor(&mut self, actor: ActorId, sample: &EntitySample) {
        self.calls.push(LevelCall::Sync(actor, *sample));
    }

    fn sample_player(&self, actor: ActorId) -> Option<LocalPlayerState> {
        let pos = *self.players.get(&actor)?;
        Some(LocalPlayerState {
            pos,
            anim_state: AnimState::IDLE,
            anim_time: 0.0,
            facing_left: false,
            controllable: true,
            fire_pressed: false,
        })
    }
}

/// Captures everything sent; reports a fixed 50 ms round trip.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(Bytes, DeliveryMethod)>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<(Bytes, DeliveryMethod)> {
        self.sent.lock().clone()
    }
}

impl PacketSink for RecordingSink {
    fn send_bytes(
        &self,
        payload: &[u8],
        delivery: DeliveryMethod,
        _channel: Channel,
    ) -> Result<(), TransportError> {
        self.sent
            .lock()
            .push((Bytes::copy_from_slice(payload), delivery));
        Ok(())
    }

    fn round_trip_time(&self) -> f32 {
        0.05
    }

    fn stats(&self) -> NetworkStats {
        NetworkStats::default()
    }
}
