//! Room table and client → room index.
//!
//! Every map operation runs under one async lock. Room locks are only ever
//! taken while holding it, never the other way round.

use crate::error::RoomError;
use crate::game_loop::Emitter;
use crate::room::{unix_now, InputUpdate, Room, RoomPhase, RoomSettings, RoomSnapshot};
use pong_shared::protocol::{RoomSummary, StatsWire};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Longest room name a client may pick.
pub const MAX_ROOM_NAME_LEN: usize = 64;

struct RegistryInner {
    rooms: HashMap<String, Arc<Room>>,
    client_rooms: HashMap<String, String>,
    /// Source of generated room ids and per-room seeds
    rng: ChaCha8Rng,
    /// Set once `shutdown` starts; creates and joins are refused after that.
    draining: bool,
}

pub struct RoomRegistry {
    settings: RoomSettings,
    emitter: Arc<dyn Emitter>,
    inner: Mutex<RegistryInner>,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings, seed: u64, emitter: Arc<dyn Emitter>) -> Self {
        Self {
            settings,
            emitter,
            inner: Mutex::new(RegistryInner {
                rooms: HashMap::new(),
                client_rooms: HashMap::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                draining: false,
            }),
        }
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    /// Open a room. A free, non-blank `name` becomes the id; otherwise a
    /// random 8-hex-digit id is generated.
    pub async fn create_room(&self, name: Option<String>) -> Result<String, RoomError> {
        let name = normalize_name(name)?;
        let mut inner = self.inner.lock().await;
        if inner.draining {
            return Err(RoomError::ShuttingDown);
        }
        Ok(self.insert_room(&mut inner, name))
    }

    /// Open a room and seat `client_id` in it as paddle 1.
    pub async fn create_and_join(
        &self,
        client_id: &str,
        name: Option<String>,
    ) -> Result<(String, u8), RoomError> {
        let name = normalize_name(name)?;
        let mut inner = self.inner.lock().await;
        if inner.draining {
            return Err(RoomError::ShuttingDown);
        }
        let room_id = self.insert_room(&mut inner, name);
        let role = Self::seat_locked(&mut inner, client_id, &room_id).await?;
        Ok((room_id, role))
    }

    /// Seat `client_id` in `room_id`, leaving whatever room it was in before.
    pub async fn join(&self, client_id: &str, room_id: &str) -> Result<u8, RoomError> {
        let mut inner = self.inner.lock().await;
        Self::seat_locked(&mut inner, client_id, room_id).await
    }

    /// Remove `client_id` from its room, deleting the room once it is empty.
    /// Returns the room it left.
    pub async fn leave(&self, client_id: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let room_id = inner.client_rooms.remove(client_id)?;
        Self::unseat_locked(&mut inner, client_id, &room_id).await;
        Some(room_id)
    }

    pub async fn apply_input(&self, client_id: &str, update: InputUpdate) -> Result<(), RoomError> {
        self.room_for(client_id).await?.apply_input(client_id, update)
    }

    pub async fn room_of(&self, client_id: &str) -> Option<String> {
        self.inner.lock().await.client_rooms.get(client_id).cloned()
    }

    pub async fn room_state(&self, client_id: &str) -> Result<RoomSnapshot, RoomError> {
        Ok(self.room_for(client_id).await?.snapshot())
    }

    pub async fn set_paused(&self, client_id: &str, paused: bool) -> Result<bool, RoomError> {
        self.room_for(client_id)
            .await?
            .set_paused(client_id, paused)
            .await
    }

    pub async fn rematch(&self, client_id: &str) -> Result<bool, RoomError> {
        self.room_for(client_id).await?.reset_match(client_id).await
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.inner.lock().await.rooms.get(room_id).cloned()
    }

    pub async fn list_rooms(&self) -> BTreeMap<String, RoomSummary> {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .iter()
            .map(|(id, room)| (id.clone(), room.summary()))
            .collect()
    }

    pub async fn stats(&self) -> StatsWire {
        let inner = self.inner.lock().await;
        let mut stats = StatsWire {
            total_rooms: inner.rooms.len() as u32,
            total_players: 0,
            active_games: 0,
            rooms_with_players: 0,
            server_uptime: 0.0,
        };
        let mut oldest: Option<f64> = None;
        for room in inner.rooms.values() {
            let players = room.player_count() as u32;
            stats.total_players += players;
            if players > 0 {
                stats.rooms_with_players += 1;
            }
            if room.phase() == RoomPhase::Active {
                stats.active_games += 1;
            }
            oldest = Some(oldest.map_or(room.created_at(), |t| t.min(room.created_at())));
        }
        if let Some(created) = oldest {
            stats.server_uptime = (unix_now() - created).max(0.0);
        }
        stats
    }

    /// Stop every room loop and forget all rooms and clients. The registry
    /// stays usable for reads but refuses new rooms and seats.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.draining = true;
        let rooms: Vec<_> = inner.rooms.drain().map(|(_, room)| room).collect();
        inner.client_rooms.clear();
        for room in &rooms {
            room.shutdown().await;
        }
        tracing::info!(rooms = rooms.len(), "registry drained");
    }

    async fn room_for(&self, client_id: &str) -> Result<Arc<Room>, RoomError> {
        let inner = self.inner.lock().await;
        inner
            .client_rooms
            .get(client_id)
            .and_then(|room_id| inner.rooms.get(room_id))
            .cloned()
            .ok_or(RoomError::StaleClient)
    }

    fn insert_room(&self, inner: &mut RegistryInner, name: Option<String>) -> String {
        let room_id = match name {
            Some(name) if !inner.rooms.contains_key(&name) => name,
            _ => loop {
                let candidate = format!("{:08x}", inner.rng.gen::<u32>());
                if !inner.rooms.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        let seed = inner.rng.gen::<u64>();
        let room = Room::new(
            room_id.clone(),
            self.settings.clone(),
            seed,
            Arc::clone(&self.emitter),
        );
        inner.rooms.insert(room_id.clone(), room);
        tracing::info!(room_id = %room_id, rooms = inner.rooms.len(), "room created");
        room_id
    }

    async fn seat_locked(
        inner: &mut RegistryInner,
        client_id: &str,
        room_id: &str,
    ) -> Result<u8, RoomError> {
        if inner.draining {
            return Err(RoomError::ShuttingDown);
        }
        let room = inner
            .rooms
            .get(room_id)
            .cloned()
            .ok_or(RoomError::RoomNotFound)?;
        let role = room.join(client_id)?;

        let previous = inner
            .client_rooms
            .insert(client_id.to_string(), room_id.to_string());
        if let Some(previous) = previous.filter(|prev| prev != room_id) {
            Self::unseat_locked(inner, client_id, &previous).await;
        }
        Ok(role)
    }

    async fn unseat_locked(inner: &mut RegistryInner, client_id: &str, room_id: &str) {
        let Some(room) = inner.rooms.get(room_id).cloned() else {
            return;
        };
        room.leave(client_id).await;
        if room.is_empty() {
            inner.rooms.remove(room_id);
            room.shutdown().await;
            tracing::info!(room_id, rooms = inner.rooms.len(), "room deleted");
        }
    }
}

fn normalize_name(name: Option<String>) -> Result<Option<String>, RoomError> {
    let Some(name) = name else {
        return Ok(None);
    };
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    if name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(RoomError::InvalidInput("Room name too long".to_string()));
    }
    Ok(Some(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingEmitter;
    use std::time::Duration;

    fn registry() -> RoomRegistry {
        let settings = RoomSettings {
            frame_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        RoomRegistry::new(settings, 1, Arc::new(RecordingEmitter::default()))
    }

    async fn assert_index_consistent(registry: &RoomRegistry) {
        let inner = registry.inner.lock().await;
        for (client, room_id) in &inner.client_rooms {
            let room = inner.rooms.get(room_id).expect("indexed room exists");
            assert!(room.role_of(client).is_some(), "{client} seated in {room_id}");
        }
        for (room_id, room) in &inner.rooms {
            for player in room.snapshot().players {
                assert_eq!(inner.client_rooms.get(&player.id), Some(room_id));
            }
        }
    }

    #[tokio::test]
    async fn generated_ids_are_eight_hex_digits() {
        let registry = registry();
        let id = registry.create_room(None).await.unwrap();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn name_is_used_when_free() {
        let registry = registry();
        assert_eq!(
            registry.create_room(Some("  lobby ".into())).await.unwrap(),
            "lobby"
        );
        let second = registry.create_room(Some("lobby".into())).await.unwrap();
        assert_ne!(second, "lobby");
        assert_eq!(registry.list_rooms().await.len(), 2);
    }

    #[tokio::test]
    async fn blank_name_falls_back_to_generated_id() {
        let registry = registry();
        let id = registry.create_room(Some("   ".into())).await.unwrap();
        assert_eq!(id.len(), 8);
    }

    #[tokio::test]
    async fn overlong_name_is_rejected() {
        let registry = registry();
        let result = registry.create_room(Some("x".repeat(65))).await;
        assert!(matches!(result, Err(RoomError::InvalidInput(_))));
        assert!(registry.list_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn two_joins_start_the_match() {
        let registry = registry();
        let room_id = registry.create_room(None).await.unwrap();

        assert_eq!(registry.join("a", &room_id).await, Ok(1));
        assert_eq!(registry.join("b", &room_id).await, Ok(2));

        let room = registry.get(&room_id).await.unwrap();
        assert_eq!(room.phase(), RoomPhase::Active);
        assert_eq!(registry.stats().await.active_games, 1);
        assert_index_consistent(&registry).await;
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn full_room_rejects_and_keeps_joiner_where_it_was() {
        let registry = registry();
        let (home, _) = registry.create_and_join("c", None).await.unwrap();
        let room_id = registry.create_room(None).await.unwrap();
        registry.join("a", &room_id).await.unwrap();
        registry.join("b", &room_id).await.unwrap();

        assert_eq!(registry.join("c", &room_id).await, Err(RoomError::RoomFull));

        assert_eq!(registry.room_of("c").await, Some(home));
        assert_eq!(registry.get(&room_id).await.unwrap().player_count(), 2);
        assert_index_consistent(&registry).await;
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn empty_room_is_deleted_and_becomes_unknown() {
        let registry = registry();
        let (room_id, role) = registry.create_and_join("a", None).await.unwrap();
        assert_eq!(role, 1);

        assert_eq!(registry.leave("a").await, Some(room_id.clone()));

        assert!(registry.get(&room_id).await.is_none());
        assert_eq!(registry.join("b", &room_id).await, Err(RoomError::RoomNotFound));
        assert_eq!(registry.room_of("a").await, None);
    }

    #[tokio::test]
    async fn joining_another_room_leaves_the_first() {
        let registry = registry();
        let (first, _) = registry.create_and_join("a", None).await.unwrap();
        let second = registry.create_room(None).await.unwrap();

        registry.join("a", &second).await.unwrap();

        assert_eq!(registry.room_of("a").await, Some(second));
        assert!(registry.get(&first).await.is_none());
        assert_index_consistent(&registry).await;
    }

    #[tokio::test]
    async fn rejoining_same_room_keeps_seat() {
        let registry = registry();
        let (room_id, _) = registry.create_and_join("a", None).await.unwrap();
        assert_eq!(registry.join("a", &room_id).await, Ok(1));
        assert!(registry.get(&room_id).await.is_some());
    }

    #[tokio::test]
    async fn leave_without_room_is_a_noop() {
        let registry = registry();
        let room_id = registry.create_room(None).await.unwrap();
        assert_eq!(registry.leave("nobody").await, None);
        assert!(registry.get(&room_id).await.is_some());
    }

    #[tokio::test]
    async fn partner_leaving_freezes_the_other_player() {
        let registry = registry();
        let (room_id, _) = registry.create_and_join("a", None).await.unwrap();
        registry.join("b", &room_id).await.unwrap();

        registry.leave("a").await;

        let snapshot = registry.room_state("b").await.unwrap();
        assert_eq!(snapshot.phase, RoomPhase::WaitingForPlayers);
        assert!(snapshot.game_paused());
        assert_index_consistent(&registry).await;
    }

    #[tokio::test]
    async fn requests_without_a_room_are_stale() {
        let registry = registry();
        assert_eq!(
            registry.apply_input("a", InputUpdate::default()).await,
            Err(RoomError::StaleClient)
        );
        assert!(matches!(
            registry.room_state("a").await,
            Err(RoomError::StaleClient)
        ));
        assert_eq!(registry.set_paused("a", true).await, Err(RoomError::StaleClient));
        assert_eq!(registry.rematch("a").await, Err(RoomError::StaleClient));
    }

    #[tokio::test]
    async fn stats_count_rooms_and_players() {
        let registry = registry();
        assert_eq!(registry.stats().await.server_uptime, 0.0);

        let (room_id, _) = registry.create_and_join("a", None).await.unwrap();
        registry.join("b", &room_id).await.unwrap();
        registry.create_and_join("c", None).await.unwrap();
        registry.create_room(None).await.unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.total_rooms, 3);
        assert_eq!(stats.total_players, 3);
        assert_eq!(stats.rooms_with_players, 2);
        assert_eq!(stats.active_games, 1);
        assert!(stats.server_uptime >= 0.0);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_loops_and_clears_tables() {
        let registry = registry();
        let (room_id, _) = registry.create_and_join("a", None).await.unwrap();
        registry.join("b", &room_id).await.unwrap();
        let room = registry.get(&room_id).await.unwrap();

        registry.shutdown().await;

        assert_ne!(room.phase(), RoomPhase::Active);
        assert!(registry.list_rooms().await.is_empty());
        assert_eq!(registry.room_of("a").await, None);
    }

    #[tokio::test]
    async fn draining_registry_refuses_new_rooms_and_seats() {
        let registry = registry();
        registry.shutdown().await;

        assert_eq!(
            registry.create_room(Some("late".into())).await,
            Err(RoomError::ShuttingDown)
        );
        assert_eq!(
            registry.create_and_join("a", None).await,
            Err(RoomError::ShuttingDown)
        );
        assert_eq!(registry.join("a", "late").await, Err(RoomError::ShuttingDown));
        assert!(registry.list_rooms().await.is_empty());
        assert_eq!(registry.room_of("a").await, None);
        assert_eq!(registry.stats().await.total_rooms, 0);
    }

    #[tokio::test]
    async fn churn_keeps_index_consistent() {
        let registry = registry();
        let mut rooms = Vec::new();
        for _ in 0..3 {
            rooms.push(registry.create_room(None).await.unwrap());
        }
        let clients = ["a", "b", "c", "d", "e"];
        for step in 0..40usize {
            let client = clients[step % clients.len()];
            match step % 3 {
                0 | 1 => {
                    let target = &rooms[(step * 7) % rooms.len()];
                    let _ = registry.join(client, target).await;
                }
                _ => {
                    registry.leave(client).await;
                }
            }
            assert_index_consistent(&registry).await;
            for summary in registry.list_rooms().await.values() {
                assert!(summary.player_count <= 2);
                if summary.game_running {
                    assert_eq!(summary.player_count, 2);
                }
            }
        }
        registry.shutdown().await;
    }
}
