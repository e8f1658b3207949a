use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

use crate::config::ServerConfig;
use crate::game_loop::Emitter;
use crate::protocol::{ClientMsg, ServerMsg};
use crate::registry::RoomRegistry;
use crate::room::RoomSettings;
use crate::session::{Membership, SessionGateway};

struct ClientSlot {
    tx: mpsc::Sender<Utf8Bytes>,
    room: Option<String>,
}

/// A room's `game_state` stream plus who is currently routed to it.
struct RoomChannel {
    frames: broadcast::Sender<Utf8Bytes>,
    members: HashSet<String>,
}

struct HubInner {
    clients: HashMap<String, ClientSlot>,
    rooms: HashMap<String, RoomChannel>,
}

impl HubInner {
    /// Push `text` onto each recipient's queue. A recipient whose queue is
    /// full or closed is dropped from the hub, which ends its connection.
    fn deliver(&mut self, recipients: Vec<String>, text: &Utf8Bytes) {
        for client_id in recipients {
            let Some(slot) = self.clients.get(&client_id) else {
                continue;
            };
            match slot.tx.try_send(text.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client_id, "outbound queue full, dropping client");
                    self.evict(&client_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => self.evict(&client_id),
            }
        }
    }

    fn evict(&mut self, client_id: &str) {
        if let Some(slot) = self.clients.remove(client_id) {
            if let Some(room_id) = slot.room {
                self.forget_member(client_id, &room_id);
            }
        }
    }

    fn forget_member(&mut self, client_id: &str, room_id: &str) {
        if let Some(channel) = self.rooms.get_mut(room_id) {
            channel.members.remove(client_id);
            if channel.members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }
}

/// `Emitter` over per-connection queues and per-room broadcast channels.
///
/// `game_state` frames go out on the room's broadcast channel, where a
/// lagging subscriber skips ahead to the newest frame. Every other event is
/// queued per recipient in order, so frame traffic can never push it out.
pub struct ClientHub {
    room_capacity: usize,
    client_capacity: usize,
    inner: Mutex<HubInner>,
}

impl ClientHub {
    pub fn new(room_capacity: usize, client_capacity: usize) -> Self {
        Self {
            room_capacity,
            client_capacity,
            inner: Mutex::new(HubInner {
                clients: HashMap::new(),
                rooms: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().expect("hub lock poisoned")
    }

    /// Open the outbound queue for a new connection.
    pub fn register(&self, client_id: &str) -> mpsc::Receiver<Utf8Bytes> {
        let (tx, rx) = mpsc::channel(self.client_capacity);
        self.lock()
            .clients
            .insert(client_id.to_string(), ClientSlot { tx, room: None });
        rx
    }

    pub fn unregister(&self, client_id: &str) {
        self.lock().evict(client_id);
    }

    /// Route `room_id`'s events to `client_id`, moving it out of any other
    /// room, and subscribe it to the room's frames. `None` if the client
    /// is no longer registered.
    pub fn enter_room(&self, client_id: &str, room_id: &str) -> Option<broadcast::Receiver<Utf8Bytes>> {
        let mut inner = self.lock();
        let slot = inner.clients.get_mut(client_id)?;
        if let Some(previous) = slot.room.replace(room_id.to_string()) {
            if previous != room_id {
                inner.forget_member(client_id, &previous);
            }
        }

        let capacity = self.room_capacity;
        let channel = inner
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomChannel {
                frames: broadcast::channel(capacity).0,
                members: HashSet::new(),
            });
        channel.members.insert(client_id.to_string());
        Some(channel.frames.subscribe())
    }

    pub fn leave_room(&self, client_id: &str) {
        let mut inner = self.lock();
        let previous = inner
            .clients
            .get_mut(client_id)
            .and_then(|slot| slot.room.take());
        if let Some(room_id) = previous {
            inner.forget_member(client_id, &room_id);
        }
    }
}

fn encode(msg: &ServerMsg) -> Option<Utf8Bytes> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(Utf8Bytes::from(text)),
        Err(e) => {
            tracing::error!(error = ?e, event = msg.event_name(), "failed to serialize event");
            None
        }
    }
}

impl Emitter for ClientHub {
    fn emit_to_room(&self, room_id: &str, msg: ServerMsg) {
        let Some(text) = encode(&msg) else {
            return;
        };
        let mut inner = self.lock();
        if matches!(msg, ServerMsg::GameState(_)) {
            if let Some(channel) = inner.rooms.get(room_id) {
                // Err only means no member is subscribed right now.
                let _ = channel.frames.send(text);
            }
            return;
        }
        let members: Vec<String> = inner
            .rooms
            .get(room_id)
            .map(|channel| channel.members.iter().cloned().collect())
            .unwrap_or_default();
        inner.deliver(members, &text);
    }

    fn emit_to_client(&self, client_id: &str, msg: ServerMsg) {
        if let Some(text) = encode(&msg) {
            self.lock().deliver(vec![client_id.to_string()], &text);
        }
    }

    fn emit_broadcast(&self, msg: ServerMsg) {
        if let Some(text) = encode(&msg) {
            let mut inner = self.lock();
            let everyone: Vec<String> = inner.clients.keys().cloned().collect();
            inner.deliver(everyone, &text);
        }
    }
}

/// Shared app state passed to each handler
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionGateway>,
    pub registry: Arc<RoomRegistry>,
    pub hub: Arc<ClientHub>,
    next_client_id: Arc<AtomicU64>,
    max_message_bytes: usize,
    max_parse_errors: u32,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let hub = Arc::new(ClientHub::new(
            config.broadcast_capacity,
            config.client_queue_capacity,
        ));
        let emitter: Arc<dyn Emitter> = hub.clone();
        let settings = RoomSettings {
            game: config.game,
            frame_interval: config.frame_interval(),
            max_dt: config.max_dt,
        };
        let registry = Arc::new(RoomRegistry::new(
            settings,
            config.rng_seed,
            Arc::clone(&emitter),
        ));
        let session = Arc::new(SessionGateway::new(Arc::clone(&registry), emitter));
        Self {
            session,
            registry,
            hub,
            next_client_id: Arc::new(AtomicU64::new(1)),
            max_message_bytes: config.max_message_bytes,
            max_parse_errors: config.max_parse_errors,
        }
    }

    fn allocate_client_id(&self) -> String {
        format!("client-{}", self.next_client_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, app_state))
}

async fn next_frame(
    frames: &mut Option<broadcast::Receiver<Utf8Bytes>>,
) -> Result<Utf8Bytes, broadcast::error::RecvError> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let client_id = app_state.allocate_client_id();

    // Register before greeting so `connected` has a queue to land in.
    let mut outbox = app_state.hub.register(&client_id);
    app_state.session.on_client_connected(&client_id).await;

    let mut room_frames: Option<broadcast::Receiver<Utf8Bytes>> = None;
    let mut parse_errors = 0u32;

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(_))) => {
                        parse_errors += 1;
                        if parse_errors >= app_state.max_parse_errors {
                            tracing::warn!(client_id, "too many malformed frames, disconnecting");
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(client_id, error = %e, "websocket error");
                        break;
                    }
                    Some(Ok(_)) => continue, // ping/pong
                };

                if text.len() > app_state.max_message_bytes {
                    tracing::warn!(client_id, bytes = text.len(), "oversized frame, disconnecting");
                    break;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        match app_state.session.handle(&client_id, client_msg).await {
                            Membership::Joined(room_id) => {
                                room_frames = app_state.hub.enter_room(&client_id, &room_id);
                            }
                            Membership::Left => {
                                app_state.hub.leave_room(&client_id);
                                room_frames = None;
                            }
                            Membership::Unchanged => {}
                        }
                    }
                    Err(e) => {
                        parse_errors += 1;
                        tracing::debug!(client_id, error = %e, parse_errors, "malformed frame");
                        if parse_errors >= app_state.max_parse_errors {
                            tracing::warn!(client_id, "too many malformed frames, disconnecting");
                            break;
                        }
                    }
                }
            }

            // Server -> Client (replies and room events, in order)
            queued = outbox.recv() => {
                let Some(text) = queued else {
                    // The hub dropped our queue after it overflowed.
                    break;
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            // Server -> Client (game_state)
            frame = next_frame(&mut room_frames) => {
                match frame {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!(client_id, missed = n, "skipped stale game_state frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => room_frames = None,
                }
            }
        }
    }

    app_state.session.on_client_disconnected(&client_id).await;
    app_state.hub.unregister(&client_id);
}
