//! Inbound client events mapped onto the registry, with the replies and
//! notifications each one produces.

use crate::game_loop::Emitter;
use crate::protocol::{
    ClientMsg, ConnectedMsg, ErrorMsg, InputWire, PlayerJoinedMsg, PlayerLeftMsg, RoomLeftMsg,
    RoomReply, RoomStateWire, ServerMsg, PROTOCOL_VERSION,
};
use crate::registry::RoomRegistry;
use crate::room::RoomSnapshot;
use pong_shared::config::GameConfig;
use std::sync::Arc;

/// How a handled event changed the sender's room membership. The transport
/// uses it to decide which room-scoped events the connection receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Unchanged,
    Joined(String),
    Left,
}

pub struct SessionGateway {
    registry: Arc<RoomRegistry>,
    emitter: Arc<dyn Emitter>,
    config: GameConfig,
}

impl SessionGateway {
    pub fn new(registry: Arc<RoomRegistry>, emitter: Arc<dyn Emitter>) -> Self {
        let config = registry.settings().game;
        Self {
            registry,
            emitter,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub async fn handle(&self, client_id: &str, msg: ClientMsg) -> Membership {
        match msg {
            ClientMsg::CreateRoom { room_name } => self.on_create_room(client_id, room_name).await,
            ClientMsg::JoinRoom { room_id } => self.on_join_room(client_id, room_id).await,
            ClientMsg::LeaveRoom => self.on_leave_room(client_id).await,
            ClientMsg::PlayerInput { input } => {
                self.on_client_input(client_id, input).await;
                Membership::Unchanged
            }
            ClientMsg::SetPaused { paused } => {
                self.on_set_paused(client_id, paused).await;
                Membership::Unchanged
            }
            ClientMsg::Rematch => {
                self.on_rematch(client_id).await;
                Membership::Unchanged
            }
            ClientMsg::GetRoomList => {
                self.on_get_room_list(client_id).await;
                Membership::Unchanged
            }
            ClientMsg::GetRoomState => {
                self.on_get_room_state(client_id).await;
                Membership::Unchanged
            }
        }
    }

    pub async fn on_client_connected(&self, client_id: &str) {
        tracing::info!(client_id, "client connected");
        self.emitter.emit_to_client(
            client_id,
            ServerMsg::Connected(ConnectedMsg {
                client_id: client_id.to_string(),
                protocol_version: PROTOCOL_VERSION,
                config: self.config,
            }),
        );
        self.on_get_room_list(client_id).await;
    }

    pub async fn on_client_disconnected(&self, client_id: &str) {
        tracing::info!(client_id, "client disconnected");
        if let Some(room_id) = self.registry.leave(client_id).await {
            self.announce_departure(client_id, &room_id).await;
        }
    }

    pub async fn on_create_room(&self, client_id: &str, room_name: Option<String>) -> Membership {
        match self.registry.create_and_join(client_id, room_name).await {
            Ok((room_id, paddle_id)) => {
                tracing::info!(client_id, room_id = %room_id, "created and joined room");
                self.emitter.emit_to_client(
                    client_id,
                    ServerMsg::RoomCreated(RoomReply::joined(&room_id, paddle_id)),
                );
                self.broadcast_room_list().await;
                Membership::Joined(room_id)
            }
            Err(e) => {
                self.emitter.emit_to_client(
                    client_id,
                    ServerMsg::RoomCreated(RoomReply::failed(e.to_string())),
                );
                Membership::Unchanged
            }
        }
    }

    pub async fn on_join_room(&self, client_id: &str, room_id: Option<String>) -> Membership {
        let Some(room_id) = room_id.filter(|id| !id.is_empty()) else {
            self.emitter.emit_to_client(
                client_id,
                ServerMsg::RoomJoined(RoomReply::failed("Room ID required")),
            );
            return Membership::Unchanged;
        };

        let paddle_id = match self.registry.join(client_id, &room_id).await {
            Ok(paddle_id) => paddle_id,
            Err(e) => {
                tracing::debug!(client_id, room_id = %room_id, error = %e, "join rejected");
                self.emitter.emit_to_client(
                    client_id,
                    ServerMsg::RoomJoined(RoomReply::failed(e.to_string())),
                );
                return Membership::Unchanged;
            }
        };

        tracing::info!(client_id, room_id = %room_id, paddle_id, "joined room");
        self.emitter.emit_to_client(
            client_id,
            ServerMsg::RoomJoined(RoomReply::joined(&room_id, paddle_id)),
        );
        if let Some(room) = self.registry.get(&room_id).await {
            for other in room.snapshot().players.iter().filter(|p| p.id != client_id) {
                self.emitter.emit_to_client(
                    &other.id,
                    ServerMsg::PlayerJoined(PlayerJoinedMsg {
                        client_id: client_id.to_string(),
                        paddle_id,
                    }),
                );
            }
        }
        self.broadcast_room_list().await;
        Membership::Joined(room_id)
    }

    pub async fn on_leave_room(&self, client_id: &str) -> Membership {
        match self.registry.leave(client_id).await {
            Some(room_id) => {
                self.emitter.emit_to_client(
                    client_id,
                    ServerMsg::RoomLeft(RoomLeftMsg {
                        success: true,
                        error: None,
                    }),
                );
                self.announce_departure(client_id, &room_id).await;
                Membership::Left
            }
            None => {
                self.emitter.emit_to_client(
                    client_id,
                    ServerMsg::RoomLeft(RoomLeftMsg {
                        success: false,
                        error: Some("Not in a room".to_string()),
                    }),
                );
                Membership::Unchanged
            }
        }
    }

    pub async fn on_client_input(&self, client_id: &str, input: InputWire) {
        // Input from a client without a seat is dropped silently.
        if let Err(e) = self.registry.apply_input(client_id, input.into()).await {
            tracing::trace!(client_id, error = %e, "input ignored");
        }
    }

    pub async fn on_set_paused(&self, client_id: &str, paused: bool) {
        match self.registry.set_paused(client_id, paused).await {
            Ok(true) => self.push_room_state(client_id).await,
            Ok(false) => {}
            Err(e) => self.reply_error(client_id, e.to_string()),
        }
    }

    pub async fn on_rematch(&self, client_id: &str) {
        match self.registry.rematch(client_id).await {
            Ok(true) => {
                self.push_room_state(client_id).await;
                self.broadcast_room_list().await;
            }
            Ok(false) => self.reply_error(client_id, "Match still in progress"),
            Err(e) => self.reply_error(client_id, e.to_string()),
        }
    }

    pub async fn on_get_room_list(&self, client_id: &str) {
        let rooms = self.registry.list_rooms().await;
        self.emitter
            .emit_to_client(client_id, ServerMsg::RoomList(rooms));
    }

    pub async fn on_get_room_state(&self, client_id: &str) {
        match self.registry.room_state(client_id).await {
            Ok(snapshot) => self
                .emitter
                .emit_to_client(client_id, ServerMsg::RoomState(wire(&snapshot))),
            Err(e) => self.reply_error(client_id, e.to_string()),
        }
    }

    /// Tell whoever is still seated in `room_id` that `client_id` is gone,
    /// and refresh everyone's lobby. Addressed per player so the leaver,
    /// whose room routing is only dropped once this returns, hears nothing.
    async fn announce_departure(&self, client_id: &str, room_id: &str) {
        tracing::info!(client_id, room_id, "left room");
        if let Some(room) = self.registry.get(room_id).await {
            let snapshot = room.snapshot();
            let state = wire(&snapshot);
            for player in &snapshot.players {
                self.emitter.emit_to_client(
                    &player.id,
                    ServerMsg::PlayerLeft(PlayerLeftMsg {
                        client_id: client_id.to_string(),
                    }),
                );
                self.emitter
                    .emit_to_client(&player.id, ServerMsg::RoomState(state.clone()));
            }
        }
        self.broadcast_room_list().await;
    }

    /// Room state goes to the whole room since pausing or resetting changes
    /// what both players see.
    async fn push_room_state(&self, client_id: &str) {
        if let Ok(snapshot) = self.registry.room_state(client_id).await {
            let room_id = snapshot.room_id.clone();
            self.emitter
                .emit_to_room(&room_id, ServerMsg::RoomState(wire(&snapshot)));
        }
    }

    async fn broadcast_room_list(&self) {
        let rooms = self.registry.list_rooms().await;
        self.emitter.emit_broadcast(ServerMsg::RoomList(rooms));
    }

    fn reply_error(&self, client_id: &str, message: impl Into<String>) {
        self.emitter.emit_to_client(
            client_id,
            ServerMsg::Error(ErrorMsg {
                message: message.into(),
            }),
        );
    }
}

fn wire(snapshot: &RoomSnapshot) -> RoomStateWire {
    RoomStateWire::from(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{RoomPhase, RoomSettings};
    use crate::test_support::{RecordingEmitter, Sent};
    use std::time::Duration;

    fn gateway() -> (SessionGateway, Arc<RecordingEmitter>) {
        let emitter = Arc::new(RecordingEmitter::default());
        let settings = RoomSettings {
            frame_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let registry = Arc::new(RoomRegistry::new(settings, 3, emitter.clone()));
        (SessionGateway::new(registry, emitter.clone()), emitter)
    }

    fn reply(msg: Option<ServerMsg>) -> RoomReply {
        match msg {
            Some(ServerMsg::RoomCreated(reply)) | Some(ServerMsg::RoomJoined(reply)) => reply,
            other => panic!("expected a room reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_sends_identity_and_lobby() {
        let (gateway, emitter) = gateway();
        gateway.on_client_connected("c1").await;

        match emitter.last_to_client("c1", "connected") {
            Some(ServerMsg::Connected(msg)) => {
                assert_eq!(msg.client_id, "c1");
                assert_eq!(msg.protocol_version, PROTOCOL_VERSION);
                assert_eq!(msg.config, GameConfig::default());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(emitter.last_to_client("c1", "room_list").is_some());
    }

    #[tokio::test]
    async fn create_replies_with_room_and_paddle_one() {
        let (gateway, emitter) = gateway();

        let membership = gateway
            .handle("c1", ClientMsg::CreateRoom { room_name: Some("den".into()) })
            .await;

        assert_eq!(membership, Membership::Joined("den".into()));
        let reply = reply(emitter.last_to_client("c1", "room_created"));
        assert!(reply.success);
        assert_eq!(reply.room_id.as_deref(), Some("den"));
        assert_eq!(reply.paddle_id, Some(1));
        assert!(emitter
            .events_to(&Sent::All)
            .iter()
            .any(|msg| msg.event_name() == "room_list"));
    }

    #[tokio::test]
    async fn join_notifies_the_seated_player() {
        let (gateway, emitter) = gateway();
        gateway.on_create_room("c1", Some("den".into())).await;

        let membership = gateway.on_join_room("c2", Some("den".into())).await;

        assert_eq!(membership, Membership::Joined("den".into()));
        let reply = reply(emitter.last_to_client("c2", "room_joined"));
        assert_eq!(reply.paddle_id, Some(2));
        match emitter.last_to_client("c1", "player_joined") {
            Some(ServerMsg::PlayerJoined(msg)) => {
                assert_eq!(msg.client_id, "c2");
                assert_eq!(msg.paddle_id, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(emitter.last_to_client("c2", "player_joined").is_none());
        gateway.registry().shutdown().await;
    }

    #[tokio::test]
    async fn join_failures_carry_client_facing_errors() {
        let (gateway, emitter) = gateway();

        gateway.on_join_room("c1", None).await;
        let missing = reply(emitter.last_to_client("c1", "room_joined"));
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("Room ID required"));

        let membership = gateway.on_join_room("c1", Some("nowhere".into())).await;
        assert_eq!(membership, Membership::Unchanged);
        let unknown = reply(emitter.last_to_client("c1", "room_joined"));
        assert_eq!(unknown.error.as_deref(), Some("Room not found"));

        gateway.on_create_room("a", Some("den".into())).await;
        gateway.on_join_room("b", Some("den".into())).await;
        gateway.on_join_room("c", Some("den".into())).await;
        let full = reply(emitter.last_to_client("c", "room_joined"));
        assert_eq!(full.error.as_deref(), Some("Room is full"));
        gateway.registry().shutdown().await;
    }

    #[tokio::test]
    async fn leave_tells_the_partner_and_the_leaver() {
        let (gateway, emitter) = gateway();
        gateway.on_create_room("c1", Some("den".into())).await;
        gateway.on_join_room("c2", Some("den".into())).await;
        emitter.clear();

        assert_eq!(gateway.on_leave_room("c1").await, Membership::Left);

        match emitter.last_to_client("c1", "room_left") {
            Some(ServerMsg::RoomLeft(msg)) => assert!(msg.success),
            other => panic!("unexpected {other:?}"),
        }
        match emitter.last_to_client("c2", "player_left") {
            Some(ServerMsg::PlayerLeft(msg)) => assert_eq!(msg.client_id, "c1"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(emitter.last_to_client("c2", "room_state").is_some());
        assert!(emitter.last_to_client("c1", "player_left").is_none());
        assert_eq!(emitter.count_to_room("den", "player_left"), 0);
        let room = gateway.registry().get("den").await.unwrap();
        assert_eq!(room.phase(), RoomPhase::WaitingForPlayers);
    }

    #[tokio::test]
    async fn leave_outside_a_room_fails() {
        let (gateway, emitter) = gateway();
        assert_eq!(gateway.on_leave_room("c1").await, Membership::Unchanged);
        match emitter.last_to_client("c1", "room_left") {
            Some(ServerMsg::RoomLeft(msg)) => {
                assert!(!msg.success);
                assert_eq!(msg.error.as_deref(), Some("Not in a room"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_frees_the_seat() {
        let (gateway, emitter) = gateway();
        gateway.on_create_room("c1", Some("den".into())).await;
        gateway.on_join_room("c2", Some("den".into())).await;

        gateway.on_client_disconnected("c2").await;

        assert_eq!(gateway.registry().room_of("c2").await, None);
        assert!(emitter.last_to_client("c1", "player_left").is_some());
        gateway.on_join_room("c3", Some("den".into())).await;
        assert_eq!(reply(emitter.last_to_client("c3", "room_joined")).paddle_id, Some(2));
        gateway.registry().shutdown().await;
    }

    #[tokio::test]
    async fn input_is_applied_to_the_senders_paddle() {
        let (gateway, _emitter) = gateway();
        gateway.on_create_room("c1", Some("den".into())).await;

        gateway
            .handle(
                "c1",
                ClientMsg::PlayerInput {
                    input: InputWire { up: Some(true), down: None },
                },
            )
            .await;
        gateway.on_client_input("stranger", InputWire::default()).await;

        let snapshot = gateway.registry().room_state("c1").await.unwrap();
        assert!(snapshot.players[0].input.up);
    }

    #[tokio::test]
    async fn room_state_outside_a_room_is_an_error() {
        let (gateway, emitter) = gateway();
        gateway.on_get_room_state("c1").await;
        match emitter.last_to_client("c1", "error") {
            Some(ServerMsg::Error(msg)) => assert_eq!(msg.message, "Not in a room"),
            other => panic!("unexpected {other:?}"),
        }

        gateway.on_create_room("c1", None).await;
        gateway.on_get_room_state("c1").await;
        assert!(emitter.last_to_client("c1", "room_state").is_some());
    }

    #[tokio::test]
    async fn pause_and_rematch_push_room_state() {
        let (gateway, emitter) = gateway();
        gateway.on_create_room("c1", Some("den".into())).await;
        gateway.on_join_room("c2", Some("den".into())).await;

        gateway.on_set_paused("c1", true).await;
        assert_eq!(emitter.count_to_room("den", "room_state"), 1);

        gateway.on_rematch("c2").await;
        assert_eq!(emitter.count_to_room("den", "room_state"), 2);
        let room = gateway.registry().get("den").await.unwrap();
        assert_eq!(room.phase(), RoomPhase::Active);

        gateway.on_rematch("c2").await;
        match emitter.last_to_client("c2", "error") {
            Some(ServerMsg::Error(msg)) => assert_eq!(msg.message, "Match still in progress"),
            other => panic!("unexpected {other:?}"),
        }
        gateway.registry().shutdown().await;
    }

    #[tokio::test]
    async fn create_and_join_are_refused_while_draining() {
        let (gateway, emitter) = gateway();
        gateway.on_create_room("c1", Some("den".into())).await;
        gateway.registry().shutdown().await;

        assert_eq!(
            gateway.on_create_room("c2", Some("late".into())).await,
            Membership::Unchanged
        );
        let created = reply(emitter.last_to_client("c2", "room_created"));
        assert!(!created.success);
        assert_eq!(created.error.as_deref(), Some("Server is shutting down"));

        assert_eq!(
            gateway.on_join_room("c2", Some("den".into())).await,
            Membership::Unchanged
        );
        let joined = reply(emitter.last_to_client("c2", "room_joined"));
        assert_eq!(joined.error.as_deref(), Some("Server is shutting down"));
    }
}
