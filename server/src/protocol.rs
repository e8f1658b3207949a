//! Wire types live in `pong-shared`; this module maps the server's room
//! state onto them.

pub use pong_shared::protocol::*;

use crate::room::{InputUpdate, RoomSnapshot};

impl From<&RoomSnapshot> for RoomStateWire {
    fn from(snapshot: &RoomSnapshot) -> Self {
        let paddle = |p: &crate::physics::Paddle| PaddleWire {
            x: p.x,
            y: p.y,
            width: p.width,
            height: p.height,
            score: p.score,
        };
        let players = snapshot
            .players
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    PlayerWire {
                        id: p.id.clone(),
                        paddle_id: p.side.role(),
                        connected: p.connected,
                    },
                )
            })
            .collect();

        RoomStateWire {
            room_id: snapshot.room_id.clone(),
            ball: BallWire {
                x: snapshot.ball.x,
                y: snapshot.ball.y,
                dx: snapshot.ball.dx,
                dy: snapshot.ball.dy,
                radius: snapshot.ball.radius,
            },
            paddle1: paddle(&snapshot.paddle1),
            paddle2: paddle(&snapshot.paddle2),
            players,
            game_active: snapshot.game_active(),
            game_paused: snapshot.game_paused(),
            game_running: snapshot.game_running(),
            player_count: snapshot.player_count() as u32,
            max_score: snapshot.max_score,
            timestamp: snapshot.timestamp,
        }
    }
}

impl From<InputWire> for InputUpdate {
    fn from(wire: InputWire) -> Self {
        InputUpdate {
            up: wire.up,
            down: wire.down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Court, PaddleInput, Side};
    use crate::room::{Player, RoomPhase};
    use pong_shared::config::GameConfig;

    fn snapshot(phase: RoomPhase, interrupted: bool) -> RoomSnapshot {
        let court = Court::new(&GameConfig::default());
        RoomSnapshot {
            room_id: "r1".to_string(),
            ball: court.ball,
            paddle1: court.paddle1,
            paddle2: court.paddle2,
            players: vec![Player {
                id: "client-1".to_string(),
                side: Side::Right,
                input: PaddleInput::default(),
                connected: true,
            }],
            phase,
            interrupted,
            max_score: 10,
            timestamp: 1.5,
        }
    }

    #[test]
    fn maps_positions_and_roster() {
        let wire = RoomStateWire::from(&snapshot(RoomPhase::Active, false));
        assert_eq!(wire.room_id, "r1");
        assert_eq!(wire.ball.x, 400.0);
        assert_eq!(wire.paddle2.x, 750.0);
        assert_eq!(wire.player_count, 1);
        assert_eq!(wire.players["client-1"].paddle_id, 2);
        assert_eq!(wire.timestamp, 1.5);
    }

    #[test]
    fn flags_follow_phase() {
        let cases = [
            (RoomPhase::Active, false, (true, false, true)),
            (RoomPhase::Paused, false, (true, true, false)),
            (RoomPhase::WaitingForPlayers, true, (false, true, false)),
            (RoomPhase::WaitingForPlayers, false, (false, false, false)),
            (RoomPhase::Finished, false, (false, false, false)),
        ];
        for (phase, interrupted, (active, paused, running)) in cases {
            let wire = RoomStateWire::from(&snapshot(phase, interrupted));
            assert_eq!(
                (wire.game_active, wire.game_paused, wire.game_running),
                (active, paused, running),
                "{phase:?}"
            );
        }
    }
}
