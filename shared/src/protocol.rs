use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::config::GameConfig;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// === Server -> Client ===

/// Outbound event. The `type` tag is the event name and `data` carries the
/// payload unchanged, so snapshot payloads keep their established shape.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type", content = "data")]
pub enum ServerMsg {
    #[serde(rename = "connected")]
    Connected(ConnectedMsg),
    #[serde(rename = "room_list")]
    RoomList(BTreeMap<String, RoomSummary>),
    #[serde(rename = "room_created")]
    RoomCreated(RoomReply),
    #[serde(rename = "room_joined")]
    RoomJoined(RoomReply),
    #[serde(rename = "room_left")]
    RoomLeft(RoomLeftMsg),
    #[serde(rename = "player_joined")]
    PlayerJoined(PlayerJoinedMsg),
    #[serde(rename = "player_left")]
    PlayerLeft(PlayerLeftMsg),
    #[serde(rename = "game_state")]
    GameState(RoomStateWire),
    #[serde(rename = "room_state")]
    RoomState(RoomStateWire),
    #[serde(rename = "game_over")]
    GameOver(GameOverMsg),
    #[serde(rename = "error")]
    Error(ErrorMsg),
}

impl ServerMsg {
    /// Event name as seen by clients.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMsg::Connected(_) => "connected",
            ServerMsg::RoomList(_) => "room_list",
            ServerMsg::RoomCreated(_) => "room_created",
            ServerMsg::RoomJoined(_) => "room_joined",
            ServerMsg::RoomLeft(_) => "room_left",
            ServerMsg::PlayerJoined(_) => "player_joined",
            ServerMsg::PlayerLeft(_) => "player_left",
            ServerMsg::GameState(_) => "game_state",
            ServerMsg::RoomState(_) => "room_state",
            ServerMsg::GameOver(_) => "game_over",
            ServerMsg::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct ConnectedMsg {
    pub client_id: String,
    pub protocol_version: u32,
    pub config: GameConfig,
}

/// Reply to `create_room` / `join_room`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct RoomReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub paddle_id: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

impl RoomReply {
    pub fn joined(room_id: impl Into<String>, paddle_id: u8) -> Self {
        Self {
            success: true,
            room_id: Some(room_id.into()),
            paddle_id: Some(paddle_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            room_id: None,
            paddle_id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct RoomLeftMsg {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PlayerJoinedMsg {
    pub client_id: String,
    pub paddle_id: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PlayerLeftMsg {
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct GameOverMsg {
    pub room_id: String,
    /// Paddle role of the winner (1 or 2)
    pub winner: u8,
    pub paddle1_score: u32,
    pub paddle2_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct ErrorMsg {
    pub message: String,
}

/// Authoritative room snapshot as broadcast every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct RoomStateWire {
    pub room_id: String,
    pub ball: BallWire,
    pub paddle1: PaddleWire,
    pub paddle2: PaddleWire,
    pub players: BTreeMap<String, PlayerWire>,
    pub game_active: bool,
    pub game_paused: bool,
    pub game_running: bool,
    pub player_count: u32,
    pub max_score: u32,
    /// Server wall clock, seconds since the Unix epoch
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct BallWire {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PaddleWire {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PlayerWire {
    pub id: String,
    pub paddle_id: u8,
    pub connected: bool,
}

/// Lobby entry for one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct RoomSummary {
    pub room_id: String,
    pub player_count: u32,
    pub max_players: u32,
    pub game_active: bool,
    pub game_running: bool,
    pub created_at: f64,
    pub paddle1_score: u32,
    pub paddle2_score: u32,
}

/// Aggregate counters served by `/stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct StatsWire {
    pub total_rooms: u32,
    pub total_players: u32,
    pub active_games: u32,
    pub rooms_with_players: u32,
    /// Seconds since the oldest live room was created
    pub server_uptime: f64,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "create_room")]
    CreateRoom {
        #[serde(default)]
        #[ts(optional)]
        room_name: Option<String>,
    },
    #[serde(rename = "join_room")]
    JoinRoom {
        #[serde(default)]
        #[ts(optional)]
        room_id: Option<String>,
    },
    #[serde(rename = "leave_room")]
    LeaveRoom,
    #[serde(rename = "player_input")]
    PlayerInput {
        #[serde(default)]
        input: InputWire,
    },
    #[serde(rename = "set_paused")]
    SetPaused { paused: bool },
    #[serde(rename = "rematch")]
    Rematch,
    #[serde(rename = "get_room_list")]
    GetRoomList,
    #[serde(rename = "get_room_state")]
    GetRoomState,
}

/// Partial input update; absent fields keep their previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct InputWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub up: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub down: Option<bool>,
}
