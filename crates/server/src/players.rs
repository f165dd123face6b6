use std::collections::HashMap;

use glam::{Vec2, Vec3};

use jazz2_net::protocol::{
    ClientPacket, CreateControllablePlayer, CreateRemotePlayer, DestroyRemotePlayer, PlayerUpdate,
    RemotePlayerDied, SelfDied, ServerPacket, UpdateAllPlayers, UpdateSelf,
};
use jazz2_net::{ConnectionId, EntitySample, MAX_PLAYERS, PlayerType};

/// A packet the server loop has to put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    To(ConnectionId, ServerPacket),
    Broadcast {
        packet: ServerPacket,
        except: Option<ConnectionId>,
    },
}

#[derive(Debug, Clone)]
pub struct ServerPlayer {
    pub player_type: PlayerType,
    /// `None` until the first `UpdateSelf` arrives.
    pub sample: Option<EntitySample>,
    pub last_update_time: Option<i64>,
}

impl ServerPlayer {
    fn pos(&self, fallback: Vec3) -> Vec3 {
        self.sample.map_or(fallback, |sample| sample.pos)
    }
}

/// Slot table of the authoritative server. Owns no sockets; every change
/// returns the packets it produces.
pub struct PlayerTable {
    slots: Vec<Option<ServerPlayer>>,
    by_connection: HashMap<ConnectionId, u8>,
    spawn_point: Vec3,
    player_type: PlayerType,
}

impl PlayerTable {
    pub fn new(capacity: usize, spawn_point: Vec3, player_type: PlayerType) -> Self {
        Self {
            slots: vec![None; capacity.min(MAX_PLAYERS)],
            by_connection: HashMap::new(),
            spawn_point,
            player_type,
        }
    }

    pub fn index_of(&self, connection: ConnectionId) -> Option<u8> {
        self.by_connection.get(&connection).copied()
    }

    #[cfg(test)]
    pub fn player(&self, index: u8) -> Option<&ServerPlayer> {
        self.slots[index as usize].as_ref()
    }

    pub fn len(&self) -> usize {
        self.by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection.is_empty()
    }

    fn players(&self) -> impl Iterator<Item = (u8, &ServerPlayer)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|player| (index as u8, player)))
    }

    /// Gives the lowest free slot to `connection` and introduces it to the
    /// players already present. Returns `None` when every slot is taken.
    pub fn join(&mut self, connection: ConnectionId) -> Option<Vec<Outgoing>> {
        if let Some(index) = self.index_of(connection) {
            log::debug!("Client {} already owns slot {}", connection, index);
            return Some(Vec::new());
        }

        let index = self.slots.iter().position(Option::is_none)? as u8;
        let mut outgoing = vec![Outgoing::To(
            connection,
            ServerPacket::CreateControllablePlayer(CreateControllablePlayer {
                index,
                player_type: self.player_type,
                pos: self.spawn_point,
            }),
        )];

        for (other, player) in self.players() {
            outgoing.push(Outgoing::To(
                connection,
                ServerPacket::CreateRemotePlayer(CreateRemotePlayer {
                    index: other,
                    player_type: player.player_type,
                    pos: player.pos(self.spawn_point),
                }),
            ));
        }

        outgoing.push(Outgoing::Broadcast {
            packet: ServerPacket::CreateRemotePlayer(CreateRemotePlayer {
                index,
                player_type: self.player_type,
                pos: self.spawn_point,
            }),
            except: Some(connection),
        });

        self.slots[index as usize] = Some(ServerPlayer {
            player_type: self.player_type,
            sample: None,
            last_update_time: None,
        });
        self.by_connection.insert(connection, index);

        log::info!("Client {} joined as player {}", connection, index);
        Some(outgoing)
    }

    /// Frees the slot of `connection` and tells the rest.
    pub fn leave(&mut self, connection: ConnectionId) -> Vec<Outgoing> {
        let Some(index) = self.by_connection.remove(&connection) else {
            return Vec::new();
        };
        self.slots[index as usize] = None;

        log::info!("Player {} left", index);
        vec![Outgoing::Broadcast {
            packet: ServerPacket::DestroyRemotePlayer(DestroyRemotePlayer { index }),
            except: Some(connection),
        }]
    }

    pub fn handle(&mut self, connection: ConnectionId, packet: ClientPacket) -> Vec<Outgoing> {
        let Some(index) = self.index_of(connection) else {
            log::trace!("Packet from client {} without a slot", connection);
            return Vec::new();
        };
        if packet.index() != index {
            log::debug!(
                "Client {} sent a packet for player {} but owns {}",
                connection,
                packet.index(),
                index
            );
            return Vec::new();
        }

        match packet {
            ClientPacket::UpdateSelf(update) => {
                self.update_player(index, &update);
                Vec::new()
            }
            ClientPacket::SelfDied(SelfDied { index }) => {
                log::info!("Player {} died", index);
                vec![Outgoing::Broadcast {
                    packet: ServerPacket::RemotePlayerDied(RemotePlayerDied { index }),
                    except: Some(connection),
                }]
            }
        }
    }

    fn update_player(&mut self, index: u8, update: &UpdateSelf) {
        let Some(player) = self.slots[index as usize].as_mut() else {
            return;
        };

        if let Some(last) = player.last_update_time {
            if update.update_time <= last {
                log::trace!("Stale update from player {}", index);
                return;
            }
        }

        // Units per second, derived from the previous sample.
        let speed = match (player.sample, player.last_update_time) {
            (Some(previous), Some(last)) => {
                let elapsed = (update.update_time - last) as f32 / 1000.0;
                let delta = update.pos - previous.pos;
                Vec2::new(delta.x, delta.y) / elapsed
            }
            _ => Vec2::ZERO,
        };

        player.sample = Some(EntitySample {
            pos: update.pos,
            speed,
            anim_state: update.anim_state,
            anim_time: update.anim_time,
            facing_left: update.facing_left,
        });
        player.last_update_time = Some(update.update_time);
    }

    pub fn snapshot(&self, server_time: i64) -> UpdateAllPlayers {
        UpdateAllPlayers {
            server_time,
            players: self
                .players()
                .map(|(index, player)| PlayerUpdate {
                    index,
                    sample: player.sample,
                })
                .collect(),
            objects: Vec::new(),
        }
    }
}
