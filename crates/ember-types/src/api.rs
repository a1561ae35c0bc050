use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Gender, PublicProfile};

// -- JWT Claims --

/// JWT claims shared between ember-api (REST middleware) and ember-gateway
/// (WebSocket Identify handshake). Canonical definition lives here in
/// ember-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub age: u32,
    pub gender: Gender,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub interested_in: Vec<Gender>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub token: String,
}

// -- Matching --

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub is_match: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_summary: Option<MatchSummary>,
}

#[derive(Debug, Serialize)]
pub struct DislikeResponse {
    pub ok: bool,
}

/// One entry in a user's match list: the match plus the other participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub counterpart: PublicProfile,
    pub matched_at: DateTime<Utc>,
    pub last_message: Option<LastMessage>,
}

/// Denormalized most-recent-message cache carried on every match summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender_id: Uuid,
    pub sent_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

// -- Preferences --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePreferencesRequest {
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub interested_in: Option<Vec<Gender>>,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub age_min: u32,
    pub age_max: u32,
    pub interested_in: Vec<Gender>,
}
