use std::sync::Mutex;

use crate::game_loop::Emitter;
use crate::protocol::ServerMsg;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Room(String),
    Client(String),
    All,
}

// Captures every outbound message so use-case tests can assert on them.
#[derive(Default)]
pub(crate) struct RecordingEmitter {
    sent: Mutex<Vec<(Sent, ServerMsg)>>,
}

impl RecordingEmitter {
    pub(crate) fn sent(&self) -> Vec<(Sent, ServerMsg)> {
        self.sent.lock().expect("emitter mutex poisoned").clone()
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().expect("emitter mutex poisoned").clear();
    }

    pub(crate) fn events_to(&self, target: &Sent) -> Vec<ServerMsg> {
        self.sent()
            .into_iter()
            .filter(|(t, _)| t == target)
            .map(|(_, msg)| msg)
            .collect()
    }

    pub(crate) fn count_to_room(&self, room_id: &str, event: &str) -> usize {
        self.events_to(&Sent::Room(room_id.to_string()))
            .iter()
            .filter(|msg| msg.event_name() == event)
            .count()
    }

    /// Most recent message of `event` sent directly to `client_id`.
    pub(crate) fn last_to_client(&self, client_id: &str, event: &str) -> Option<ServerMsg> {
        self.events_to(&Sent::Client(client_id.to_string()))
            .into_iter()
            .rev()
            .find(|msg| msg.event_name() == event)
    }

    fn record(&self, target: Sent, msg: ServerMsg) {
        self.sent
            .lock()
            .expect("emitter mutex poisoned")
            .push((target, msg));
    }
}

impl Emitter for RecordingEmitter {
    fn emit_to_room(&self, room_id: &str, msg: ServerMsg) {
        self.record(Sent::Room(room_id.to_string()), msg);
    }

    fn emit_to_client(&self, client_id: &str, msg: ServerMsg) {
        self.record(Sent::Client(client_id.to_string()), msg);
    }

    fn emit_broadcast(&self, msg: ServerMsg) {
        self.record(Sent::All, msg);
    }
}
