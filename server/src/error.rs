use std::fmt;

/// Rejections surfaced to the client that caused them. None of these touch
/// room or registry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Target room id is unknown.
    RoomNotFound,
    /// Room already has two players.
    RoomFull,
    /// Request payload was unusable.
    InvalidInput(String),
    /// Client isn't seated in the room it addressed.
    StaleClient,
    /// Server is draining; no new rooms or seats.
    ShuttingDown,
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::RoomNotFound => write!(f, "Room not found"),
            RoomError::RoomFull => write!(f, "Room is full"),
            RoomError::InvalidInput(reason) => write!(f, "{reason}"),
            RoomError::StaleClient => write!(f, "Not in a room"),
            RoomError::ShuttingDown => write!(f, "Server is shutting down"),
        }
    }
}

impl std::error::Error for RoomError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_client_expectations() {
        assert_eq!(RoomError::RoomNotFound.to_string(), "Room not found");
        assert_eq!(RoomError::RoomFull.to_string(), "Room is full");
        assert_eq!(RoomError::StaleClient.to_string(), "Not in a room");
        assert_eq!(RoomError::ShuttingDown.to_string(), "Server is shutting down");
        assert_eq!(
            RoomError::InvalidInput("Room ID required".to_string()).to_string(),
            "Room ID required"
        );
    }
}
