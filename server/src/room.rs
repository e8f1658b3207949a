//! One two-player match: roster, phase machine, and the court it simulates.

use crate::error::RoomError;
use crate::game_loop::{run_room_loop, Emitter};
use crate::physics::{self, Ball, Court, Paddle, PaddleInput, Side, StepOutcome};
use pong_shared::config::GameConfig;
use pong_shared::protocol::RoomSummary;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const MAX_PLAYERS: usize = 2;

/// Per-room loop and tuning settings, shared by every room of a registry.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub game: GameConfig,
    /// Target time between ticks
    pub frame_interval: Duration,
    /// Upper bound on the `dt` fed to one tick (seconds)
    pub max_dt: f64,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            frame_interval: Duration::from_secs_f64(1.0 / 60.0),
            max_dt: 1.0 / 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Last player left; the registry deletes the room.
    Empty,
    /// Fewer than two players, no loop.
    WaitingForPlayers,
    /// Two players, loop running.
    Active,
    /// Two players, loop stopped by a player.
    Paused,
    /// Score limit reached, loop stopped until a rematch.
    Finished,
}

/// Partial input update; `None` keeps the held state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputUpdate {
    pub up: Option<bool>,
    pub down: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: String,
    pub side: Side,
    pub input: PaddleInput,
    pub connected: bool,
}

/// Everything a client needs to draw one frame, captured under a single
/// lock acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub ball: Ball,
    pub paddle1: Paddle,
    pub paddle2: Paddle,
    pub players: Vec<Player>,
    pub phase: RoomPhase,
    /// A running match lost a player and is waiting for a replacement
    pub interrupted: bool,
    pub max_score: u32,
    pub timestamp: f64,
}

impl RoomSnapshot {
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn game_running(&self) -> bool {
        self.phase == RoomPhase::Active
    }

    pub fn game_active(&self) -> bool {
        matches!(self.phase, RoomPhase::Active | RoomPhase::Paused)
    }

    pub fn game_paused(&self) -> bool {
        self.phase == RoomPhase::Paused
            || (self.phase == RoomPhase::WaitingForPlayers && self.interrupted)
    }
}

struct RoomInner {
    court: Court,
    players: BTreeMap<String, Player>,
    phase: RoomPhase,
    interrupted: bool,
    rng: ChaCha8Rng,
    /// Bumped on every loop start and stop; a loop exits once its own
    /// generation is stale.
    generation: u64,
    loop_task: Option<JoinHandle<()>>,
}

pub struct Room {
    id: String,
    created_at: f64,
    settings: RoomSettings,
    emitter: Arc<dyn Emitter>,
    wake: Notify,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        settings: RoomSettings,
        seed: u64,
        emitter: Arc<dyn Emitter>,
    ) -> Arc<Self> {
        let court = Court::new(&settings.game);
        Arc::new(Self {
            id: id.into(),
            created_at: unix_now(),
            settings,
            emitter,
            wake: Notify::new(),
            inner: Mutex::new(RoomInner {
                court,
                players: BTreeMap::new(),
                phase: RoomPhase::WaitingForPlayers,
                interrupted: false,
                rng: ChaCha8Rng::seed_from_u64(seed),
                generation: 0,
                loop_task: None,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub(crate) fn emitter(&self) -> Arc<dyn Emitter> {
        Arc::clone(&self.emitter)
    }

    fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().expect("room lock poisoned")
    }

    /// Resolves when the running loop is asked to stop.
    pub(crate) fn stopped(&self) -> Notified<'_> {
        self.wake.notified()
    }

    pub fn phase(&self) -> RoomPhase {
        self.lock().phase
    }

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().players.is_empty()
    }

    pub fn role_of(&self, client_id: &str) -> Option<u8> {
        self.lock().players.get(client_id).map(|p| p.side.role())
    }

    /// Seat a client on the first free paddle. Seating the second player
    /// starts the match loop before this returns.
    pub fn join(self: &Arc<Self>, client_id: &str) -> Result<u8, RoomError> {
        let mut inner = self.lock();
        if let Some(player) = inner.players.get(client_id) {
            return Ok(player.side.role());
        }
        if inner.players.len() >= MAX_PLAYERS {
            return Err(RoomError::RoomFull);
        }

        let side = if inner.players.values().any(|p| p.side == Side::Left) {
            Side::Right
        } else {
            Side::Left
        };
        inner.players.insert(
            client_id.to_string(),
            Player {
                id: client_id.to_string(),
                side,
                input: PaddleInput::default(),
                connected: true,
            },
        );
        tracing::info!(room_id = %self.id, client_id, paddle = side.role(), "player seated");

        if inner.players.len() == MAX_PLAYERS {
            if matches!(
                inner.phase,
                RoomPhase::Empty | RoomPhase::WaitingForPlayers
            ) {
                self.start_loop(&mut inner, true);
            }
        } else if inner.phase == RoomPhase::Empty {
            inner.phase = RoomPhase::WaitingForPlayers;
        }
        Ok(side.role())
    }

    /// Unseat a client. Returns false (and changes nothing) if the client
    /// wasn't seated. The loop has fully stopped by the time this returns.
    pub async fn leave(&self, client_id: &str) -> bool {
        let task = {
            let mut inner = self.lock();
            if inner.players.remove(client_id).is_none() {
                return false;
            }
            tracing::info!(room_id = %self.id, client_id, "player unseated");

            let was = inner.phase;
            if inner.players.is_empty() {
                inner.phase = RoomPhase::Empty;
                inner.interrupted = false;
            } else {
                inner.phase = RoomPhase::WaitingForPlayers;
                match was {
                    RoomPhase::Active | RoomPhase::Paused => inner.interrupted = true,
                    RoomPhase::Finished => {
                        // The result is final; the next pair starts fresh.
                        inner.court.reset();
                        inner.interrupted = false;
                    }
                    RoomPhase::Empty | RoomPhase::WaitingForPlayers => {}
                }
            }
            self.stop_loop(&mut inner)
        };
        await_loop(&self.id, task).await;
        true
    }

    /// Merge a client's input. Fields missing from `update` keep their
    /// previous value; the next tick reads whatever is latest.
    pub fn apply_input(&self, client_id: &str, update: InputUpdate) -> Result<(), RoomError> {
        let mut inner = self.lock();
        let player = inner
            .players
            .get_mut(client_id)
            .ok_or(RoomError::StaleClient)?;
        if let Some(up) = update.up {
            player.input.up = up;
        }
        if let Some(down) = update.down {
            player.input.down = down;
        }
        Ok(())
    }

    /// Pause or resume a running match. Returns whether the phase changed.
    pub async fn set_paused(self: &Arc<Self>, client_id: &str, paused: bool) -> Result<bool, RoomError> {
        let task = {
            let mut inner = self.lock();
            if !inner.players.contains_key(client_id) {
                return Err(RoomError::StaleClient);
            }
            match (paused, inner.phase) {
                (true, RoomPhase::Active) => {
                    inner.phase = RoomPhase::Paused;
                    tracing::info!(room_id = %self.id, client_id, "match paused");
                    self.stop_loop(&mut inner)
                }
                (false, RoomPhase::Paused) if inner.players.len() == MAX_PLAYERS => {
                    tracing::info!(room_id = %self.id, client_id, "match resumed");
                    self.start_loop(&mut inner, false);
                    return Ok(true);
                }
                _ => return Ok(false),
            }
        };
        await_loop(&self.id, task).await;
        Ok(true)
    }

    /// Start over after a finished (or paused) match: scores cleared,
    /// positions reset, and play resumes at once if both seats are taken.
    pub async fn reset_match(self: &Arc<Self>, client_id: &str) -> Result<bool, RoomError> {
        let task = {
            let mut inner = self.lock();
            if !inner.players.contains_key(client_id) {
                return Err(RoomError::StaleClient);
            }
            if !matches!(inner.phase, RoomPhase::Finished | RoomPhase::Paused) {
                return Ok(false);
            }
            self.stop_loop(&mut inner)
        };
        await_loop(&self.id, task).await;

        let mut inner = self.lock();
        if !matches!(inner.phase, RoomPhase::Finished | RoomPhase::Paused) {
            return Ok(false);
        }
        inner.court.reset();
        inner.interrupted = false;
        tracing::info!(room_id = %self.id, client_id, "match reset");
        if inner.players.len() == MAX_PLAYERS {
            self.start_loop(&mut inner, true);
        } else {
            inner.phase = RoomPhase::WaitingForPlayers;
        }
        Ok(true)
    }

    /// Stop the loop, if any, and wait for it to exit.
    pub async fn shutdown(&self) {
        let task = {
            let mut inner = self.lock();
            if inner.phase == RoomPhase::Active {
                inner.phase = RoomPhase::Paused;
            }
            self.stop_loop(&mut inner)
        };
        await_loop(&self.id, task).await;
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let inner = self.lock();
        self.snapshot_of(&inner)
    }

    pub fn summary(&self) -> RoomSummary {
        let inner = self.lock();
        let (paddle1_score, paddle2_score) = inner.court.scores();
        RoomSummary {
            room_id: self.id.clone(),
            player_count: inner.players.len() as u32,
            max_players: MAX_PLAYERS as u32,
            game_active: matches!(inner.phase, RoomPhase::Active | RoomPhase::Paused),
            game_running: inner.phase == RoomPhase::Active,
            created_at: self.created_at,
            paddle1_score,
            paddle2_score,
        }
    }

    /// Stage a court position under the room lock.
    #[cfg(test)]
    pub(crate) fn with_court<R>(&self, f: impl FnOnce(&mut Court) -> R) -> R {
        f(&mut self.lock().court)
    }

    /// One simulation step for the loop of `generation`. Returns `None`
    /// once that loop should exit.
    pub(crate) fn tick(&self, generation: u64, dt: f64) -> Option<(RoomSnapshot, StepOutcome)> {
        let mut inner = self.lock();
        if inner.generation != generation || inner.phase != RoomPhase::Active {
            return None;
        }

        let RoomInner {
            court,
            players,
            rng,
            ..
        } = &mut *inner;
        let inputs = players
            .values()
            .filter(|p| p.connected)
            .map(|p| (p.side, p.input));
        let outcome = physics::advance(court, inputs, dt, rng);

        if let Some(side) = outcome.scored {
            let (p1, p2) = court.scores();
            tracing::debug!(room_id = %self.id, scorer = side.role(), p1, p2, "point");
        }
        if outcome.winner.is_some() {
            inner.phase = RoomPhase::Finished;
        }
        Some((self.snapshot_of(&inner), outcome))
    }

    fn snapshot_of(&self, inner: &RoomInner) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            ball: inner.court.ball,
            paddle1: inner.court.paddle1,
            paddle2: inner.court.paddle2,
            players: inner.players.values().cloned().collect(),
            phase: inner.phase,
            interrupted: inner.interrupted,
            max_score: inner.court.tuning().max_score,
            timestamp: unix_now(),
        }
    }

    fn start_loop(self: &Arc<Self>, inner: &mut RoomInner, serve: bool) {
        if serve {
            physics::serve_random(&mut inner.court, &mut inner.rng);
        }
        inner.phase = RoomPhase::Active;
        inner.interrupted = false;
        inner.generation += 1;
        let generation = inner.generation;
        inner.loop_task = Some(tokio::spawn(run_room_loop(Arc::clone(self), generation)));
        tracing::info!(room_id = %self.id, generation, "match running");
    }

    /// Invalidate the current loop and hand back its task for awaiting
    /// once the lock is released.
    fn stop_loop(&self, inner: &mut RoomInner) -> Option<JoinHandle<()>> {
        inner.generation += 1;
        let task = inner.loop_task.take();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            self.wake.notify_one();
        }
        task
    }
}

async fn await_loop(room_id: &str, task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        if let Err(e) = task.await {
            tracing::warn!(room_id, error = %e, "room loop ended abnormally");
        }
    }
}

/// Wall clock in seconds since the Unix epoch.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
