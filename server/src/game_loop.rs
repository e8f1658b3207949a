use crate::room::Room;
use pong_shared::protocol::{GameOverMsg, RoomStateWire, ServerMsg};
use std::sync::Arc;
use tokio::time::Instant;

/// Outbound side of the session gateway.
///
/// Implementations must not block: rooms call these from their tick loop and
/// a slow or failed delivery is the transport's problem.
pub trait Emitter: Send + Sync {
    fn emit_to_room(&self, room_id: &str, msg: ServerMsg);
    fn emit_to_client(&self, client_id: &str, msg: ServerMsg);
    fn emit_broadcast(&self, msg: ServerMsg);
}

/// Fixed-rate simulation loop for one room.
///
/// Runs until the room bumps its loop generation (stop, pause, leave,
/// teardown) or the match finishes. The room lock is held only inside
/// `Room::tick`; emission and sleeping happen without it.
pub(crate) async fn run_room_loop(room: Arc<Room>, generation: u64) {
    let frame = room.settings().frame_interval;
    let max_dt = room.settings().max_dt;
    let emitter = room.emitter();
    let mut last_tick = Instant::now();

    tracing::debug!(room_id = %room.id(), generation, "room loop started");

    loop {
        let frame_start = Instant::now();
        let dt = frame_start
            .duration_since(last_tick)
            .as_secs_f64()
            .min(max_dt);
        last_tick = frame_start;

        let Some((snapshot, outcome)) = room.tick(generation, dt) else {
            break;
        };

        emitter.emit_to_room(room.id(), ServerMsg::GameState(RoomStateWire::from(&snapshot)));

        if let Some(winner) = outcome.winner {
            tracing::info!(
                room_id = %room.id(),
                winner = winner.role(),
                paddle1 = snapshot.paddle1.score,
                paddle2 = snapshot.paddle2.score,
                "match finished"
            );
            emitter.emit_to_room(
                room.id(),
                ServerMsg::GameOver(GameOverMsg {
                    room_id: room.id().to_string(),
                    winner: winner.role(),
                    paddle1_score: snapshot.paddle1.score,
                    paddle2_score: snapshot.paddle2.score,
                }),
            );
            break;
        }

        let remaining = frame.saturating_sub(frame_start.elapsed());
        tokio::select! {
            _ = tokio::time::sleep(remaining) => {}
            _ = room.stopped() => {}
        }
    }

    tracing::debug!(room_id = %room.id(), generation, "room loop ended");
}
