use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Gender, MediaKind, Message, Session};

// -- JWT Claims --

/// JWT claims shared between tandem-api (REST middleware) and
/// tandem-gateway (WebSocket Identify). Canonical definition lives here.
/// Premium is deliberately NOT a claim: it is read from the user record
/// per request and passed explicitly into every policy check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub premium: bool,
    pub token: String,
}

// -- Sessions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub gender: Gender,
    pub partner_gender: Gender,
    pub level: u8,
    /// Number of challenges dealt into the deck. Defaults server-side.
    pub challenge_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinSessionRequest {
    pub gender: Gender,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: Session,
}

/// Mutations racing on the same challenge carry the index the client
/// observed; a mismatch surfaces as `stale_index` instead of silently
/// applying to a different challenge.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteChallengeRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkipChallengeRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitPartnerChallengeRequest {
    pub text: String,
    pub level: u8,
    pub kind: MediaKind,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct DownloadMediaResponse {
    pub url: String,
    pub kind: MediaKind,
}
