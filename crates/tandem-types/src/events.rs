use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Session};

/// Events pushed over the WebSocket gateway.
///
/// `SessionUpdate` always carries the full session snapshot: subscribers
/// replace their local derived state wholesale, so a dropped or reordered
/// push can never leave a client on a stale view for longer than the next
/// committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// The session record changed; full authoritative snapshot
    SessionUpdate { session: Session },

    /// A new chat message was appended
    MessageCreate { message: Message },

    /// A participant marked the other's messages read
    MessagesRead { session_code: String, reader_id: Uuid },

    /// A media attachment was downloaded (at most once per message)
    MediaDownloaded {
        session_code: String,
        message_id: Uuid,
        downloaded_by: Uuid,
    },
}

impl GatewayEvent {
    /// Returns the session code if this event is scoped to a session.
    /// Events that return `None` are connection-level and always delivered.
    pub fn session_code(&self) -> Option<&str> {
        match self {
            Self::SessionUpdate { session } => Some(&session.code),
            Self::MessageCreate { message } => Some(&message.session_code),
            Self::MessagesRead { session_code, .. } => Some(session_code),
            Self::MediaDownloaded { session_code, .. } => Some(session_code),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to a session's event stream. Replaces any previous
    /// subscription on this connection; the server immediately pushes the
    /// latest snapshot so reconnects converge without replay.
    Subscribe { session_code: String },

    /// Drop the current subscription. Safe to send repeatedly.
    Unsubscribe,
}
