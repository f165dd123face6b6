use std::collections::HashMap;

use glam::{Vec2, Vec3};

use super::level::{ActorId, LevelApi};
use crate::protocol::{EntitySample, MAX_PLAYERS, PlayerType};

/// Local stand-in for a player simulated by another client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemotePlayer {
    pub actor: ActorId,
    pub player_type: PlayerType,
    pub sample: EntitySample,
}

/// Local stand-in for a server-simulated object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteObject {
    pub actor: ActorId,
    pub sample: EntitySample,
}

/// Slot-indexed proxies for remote players and objects.
///
/// Players live in a fixed table of [`MAX_PLAYERS`] slots addressed by the
/// server-assigned `u8` index; objects are keyed by their `i32` index. Each
/// slot holds at most one proxy. Creating into an occupied slot and
/// destroying an empty one are no-ops, which absorbs retransmitted and
/// reordered lifecycle packets.
///
/// Only the logic thread touches the registry; network threads reach it
/// through the main-thread queue.
#[derive(Debug)]
pub struct EntityRegistry {
    players: Vec<Option<RemotePlayer>>,
    objects: HashMap<i32, RemoteObject>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            players: vec![None; MAX_PLAYERS],
            objects: HashMap::new(),
        }
    }

    /// Returns false when the slot was already taken.
    pub fn create_player<A: LevelApi + ?Sized>(
        &mut self,
        api: &mut A,
        index: u8,
        player_type: PlayerType,
        pos: Vec3,
    ) -> bool {
        let slot = &mut self.players[index as usize];
        if slot.is_some() {
            log::trace!("Player slot {} already occupied", index);
            return false;
        }

        let actor = api.spawn_remote_player(index, player_type, pos);
        *slot = Some(RemotePlayer {
            actor,
            player_type,
            sample: EntitySample::new(pos, Vec2::ZERO),
        });
        log::debug!("Created remote player {} ({})", index, player_type.as_str());
        true
    }

    pub fn destroy_player<A: LevelApi + ?Sized>(&mut self, api: &mut A, index: u8) -> bool {
        let Some(player) = self.players[index as usize].take() else {
            return false;
        };
        api.remove_actor(player.actor);
        log::debug!("Destroyed remote player {}", index);
        true
    }

    pub fn create_object<A: LevelApi + ?Sized>(
        &mut self,
        api: &mut A,
        index: i32,
        pos: Vec3,
    ) -> bool {
        if self.objects.contains_key(&index) {
            log::trace!("Object slot {} already occupied", index);
            return false;
        }

        let actor = api.spawn_remote_object(index, pos);
        self.objects.insert(
            index,
            RemoteObject {
                actor,
                sample: EntitySample::new(pos, Vec2::ZERO),
            },
        );
        true
    }

    pub fn destroy_object<A: LevelApi + ?Sized>(&mut self, api: &mut A, index: i32) -> bool {
        let Some(object) = self.objects.remove(&index) else {
            return false;
        };
        api.remove_actor(object.actor);
        true
    }

    /// Moves the proxy in `index` to `sample`. Returns false when the slot is
    /// empty, in which case the sample is dropped.
    pub fn apply_player<A: LevelApi + ?Sized>(
        &mut self,
        api: &mut A,
        index: u8,
        sample: &EntitySample,
    ) -> bool {
        let Some(player) = self.players[index as usize].as_mut() else {
            return false;
        };
        player.sample = *sample;
        api.sync_actor(player.actor, sample);
        true
    }

    pub fn apply_object<A: LevelApi + ?Sized>(
        &mut self,
        api: &mut A,
        index: i32,
        sample: &EntitySample,
    ) -> bool {
        let Some(object) = self.objects.get_mut(&index) else {
            return false;
        };
        object.sample = *sample;
        api.sync_actor(object.actor, sample);
        true
    }

    pub fn player(&self, index: u8) -> Option<&RemotePlayer> {
        self.players[index as usize].as_ref()
    }

    pub fn object(&self, index: i32) -> Option<&RemoteObject> {
        self.objects.get(&index)
    }

    pub fn players(&self) -> impl Iterator<Item = (u8, &RemotePlayer)> {
        self.players
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|player| (index as u8, player)))
    }

    pub fn objects(&self) -> impl Iterator<Item = (i32, &RemoteObject)> {
        self.objects.iter().map(|(&index, object)| (index, object))
    }

    pub fn player_count(&self) -> usize {
        self.players.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Removes every proxy. Returns how many actors were removed.
    pub fn clear<A: LevelApi + ?Sized>(&mut self, api: &mut A) -> usize {
        let mut removed = 0;
        for slot in &mut self.players {
            if let Some(player) = slot.take() {
                api.remove_actor(player.actor);
                removed += 1;
            }
        }
        for (_, object) in self.objects.drain() {
            api.remove_actor(object.actor);
            removed += 1;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{LevelCall, RecordingLevel};

    #[test]
    fn create_player_is_idempotent() {
        let mut api = RecordingLevel::default();
        let mut registry = EntityRegistry::new();

        assert!(registry.create_player(&mut api, 5, PlayerType::Jazz, Vec3::new(10.0, 20.0, 0.0)));
        assert!(!registry.create_player(&mut api, 5, PlayerType::Spaz, Vec3::ZERO));

        assert_eq!(registry.player_count(), 1);
        assert_eq!(registry.player(5).unwrap().player_type, PlayerType::Jazz);
        assert_eq!(api.spawned_remote_players(), 1);
    }

    #[test]
    fn destroy_then_recreate_yields_new_proxy() {
        let mut api = RecordingLevel::default();
        let mut registry = EntityRegistry::new();

        registry.create_player(&mut api, 5, PlayerType::Jazz, Vec3::ZERO);
        let first = registry.player(5).unwrap().actor;

        assert!(registry.destroy_player(&mut api, 5));
        assert!(!registry.destroy_player(&mut api, 5));
        assert!(registry.create_player(&mut api, 5, PlayerType::Lori, Vec3::ZERO));

        let second = registry.player(5).unwrap().actor;
        assert_ne!(first, second);
        assert!(api.calls.contains(&LevelCall::RemoveActor(first)));
    }

    #[test]
    fn highest_player_slot_is_usable() {
        let mut api = RecordingLevel::default();
        let mut registry = EntityRegistry::new();

        assert!(registry.create_player(&mut api, u8::MAX, PlayerType::Frog, Vec3::ZERO));
        assert_eq!(registry.players().map(|(index, _)| index).collect::<Vec<_>>(), vec![255]);
    }

    #[test]
    fn objects_follow_the_same_contract() {
        let mut api = RecordingLevel::default();
        let mut registry = EntityRegistry::new();

        assert!(registry.create_object(&mut api, -7, Vec3::ZERO));
        assert!(!registry.create_object(&mut api, -7, Vec3::ONE));
        assert!(registry.create_object(&mut api, 100_000, Vec3::ONE));
        assert_eq!(registry.object_count(), 2);

        assert!(registry.destroy_object(&mut api, -7));
        assert!(!registry.destroy_object(&mut api, -7));
        assert!(registry.object(-7).is_none());
    }

    #[test]
    fn apply_without_proxy_is_dropped() {
        let mut api = RecordingLevel::default();
        let mut registry = EntityRegistry::new();
        let sample = EntitySample::new(Vec3::new(1.0, 2.0, 3.0), Vec2::ONE);

        assert!(!registry.apply_player(&mut api, 9, &sample));
        assert!(!registry.apply_object(&mut api, 9, &sample));
        assert!(api.calls.is_empty());
    }

    #[test]
    fn apply_updates_stored_sample() {
        let mut api = RecordingLevel::default();
        let mut registry = EntityRegistry::new();
        registry.create_player(&mut api, 2, PlayerType::Jazz, Vec3::ZERO);

        let sample = EntitySample::new(Vec3::new(40.0, 50.0, 0.0), Vec2::new(1.5, 0.0));
        assert!(registry.apply_player(&mut api, 2, &sample));
        assert_eq!(registry.player(2).unwrap().sample, sample);

        let actor = registry.player(2).unwrap().actor;
        assert_eq!(api.calls.last(), Some(&LevelCall::Sync(actor, sample)));
    }

    #[test]
    fn clear_removes_every_actor() {
        let mut api = RecordingLevel::default();
        let mut registry = EntityRegistry::new();
        registry.create_player(&mut api, 1, PlayerType::Jazz, Vec3::ZERO);
        registry.create_player(&mut api, 2, PlayerType::Spaz, Vec3::ZERO);
        registry.create_object(&mut api, 30, Vec3::ZERO);

        assert_eq!(registry.clear(&mut api), 3);
        assert_eq!(registry.player_count(), 0);
        assert_eq!(registry.object_count(), 0);
        assert_eq!(api.removed_actors(), 3);
    }
}
