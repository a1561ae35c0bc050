use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageResponse;
use crate::models::PublicProfile;

/// Events sent over the WebSocket gateway. Every event is addressed to a
/// specific user; delivery is best-effort and at-most-once, and the durable
/// record in ember-db is the source of truth on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the Identify handshake
    Ready { user_id: Uuid },

    /// A mutual like completed and a match was formed
    MatchCreated {
        match_id: Uuid,
        counterpart: PublicProfile,
        matched_at: DateTime<Utc>,
    },

    /// A message was appended to one of the recipient's matches
    MessageCreated { match_id: Uuid, message: MessageResponse },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}

/// Delivery seam between the match engine and the connection router.
/// Implementations push to every open connection for the user and silently
/// drop when none are open: no queueing, no retry.
pub trait EventSink: Send + Sync {
    fn send(&self, user_id: Uuid, event: GatewayEvent);
}
