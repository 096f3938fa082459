use std::collections::HashSet;

use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use tandem_core::SessionError;
use tandem_core::selector;
use tandem_core::session;
use tandem_db::{Database, StoreError};
use tandem_types::api::{
    Claims, CompleteChallengeRequest, CreateSessionRequest, JoinSessionRequest, SessionResponse,
    SkipChallengeRequest, SubmitPartnerChallengeRequest,
};
use tandem_types::events::GatewayEvent;
use tandem_types::models::Session;

use crate::auth::AppState;
use crate::error::{ApiError, join_error};

const DEFAULT_CHALLENGE_COUNT: usize = 10;
const MAX_CHALLENGE_COUNT: usize = 30;

/// Session codes avoid 0/O and 1/I so they survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..6)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn premium_of(db: &Database, user_id: Uuid) -> Result<bool, StoreError> {
    Ok(db
        .get_user_by_id(&user_id.to_string())?
        .map(|u| u.premium)
        .unwrap_or(false))
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !(1..=4).contains(&req.level) {
        return Err(ApiError::bad_request("level must be between 1 and 4"));
    }
    let count = req
        .challenge_count
        .unwrap_or(DEFAULT_CHALLENGE_COUNT)
        .clamp(2, MAX_CHALLENGE_COUNT);

    let db = state.db.clone();
    let caller = claims.sub;
    let session = tokio::task::spawn_blocking(move || -> Result<Session, ApiError> {
        let catalog = db.load_catalog()?;
        let mut rng = rand::rng();

        let code = loop {
            let candidate = generate_code(&mut rng);
            if !db.session_exists(&candidate)? {
                break candidate;
            }
        };

        let deck = selector::build_deck(
            &catalog,
            req.level,
            req.gender,
            req.partner_gender,
            count,
            &mut rng,
        );
        if deck.is_empty() {
            return Err(StoreError::Other(anyhow!("challenge catalog is empty")).into());
        }

        let session = session::new_session(code, caller, req.gender, deck, Utc::now());
        db.insert_session(&session)?;
        Ok(session)
    })
    .await
    .map_err(join_error)??;

    info!("{} created session {}", claims.username, session.code);
    state.dispatcher.broadcast(GatewayEvent::SessionUpdate {
        session: session.clone(),
    });
    Ok((StatusCode::CREATED, Json(SessionResponse { session })))
}

pub async fn join_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let updated = mutate(&state, &code, move |s| {
        session::join_session(s, caller, req.gender)
    })
    .await?;

    info!("{} joined session {}", claims.username, code);
    broadcast_update(&state, &updated);
    Ok(Json(SessionResponse { session: updated }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let session = tokio::task::spawn_blocking(move || db.load_session(&code))
        .await
        .map_err(join_error)??
        .ok_or(SessionError::NotFound)?;

    if session.role_of(claims.sub).is_none() {
        return Err(SessionError::NotParticipant.into());
    }
    Ok(Json(SessionResponse { session }))
}

pub async fn complete_challenge(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CompleteChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let updated = mutate(&state, &code, move |s| {
        let role = s.role_of(caller).ok_or(SessionError::NotParticipant)?;
        session::complete_challenge(s, role, req.index, Utc::now())
    })
    .await?;

    broadcast_update(&state, &updated);
    Ok(Json(SessionResponse { session: updated }))
}

pub async fn skip_challenge(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SkipChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let updated = tokio::task::spawn_blocking(move || -> Result<Session, ApiError> {
        let premium = premium_of(&db, caller)?;

        // Draw the replacement outside the write transaction, from the
        // snapshot the caller's index refers to.
        let snapshot = db.load_session(&code)?.ok_or(SessionError::NotFound)?;
        if snapshot.role_of(caller).is_none() {
            return Err(SessionError::NotParticipant.into());
        }
        if req.index != snapshot.current_challenge_index {
            return Err(SessionError::StaleIndex.into());
        }
        let original = snapshot
            .challenges
            .get(req.index)
            .ok_or(SessionError::NotOwner)?;

        let catalog = db.load_catalog()?;
        let dealt: HashSet<&str> = snapshot.challenges.iter().map(|c| c.text.as_str()).collect();
        let replacement =
            selector::select_replacement(&catalog, original, &dealt, &mut rand::rng())
                .ok_or(ApiError::BadRequest("no replacement challenge available"))?;

        let updated = db.mutate_session(&snapshot.code, move |s| {
            let role = s.role_of(caller).ok_or(SessionError::NotParticipant)?;
            session::skip_challenge(s, role, premium, req.index, replacement)
        })?;
        Ok(updated)
    })
    .await
    .map_err(join_error)??;

    broadcast_update(&state, &updated);
    Ok(Json(SessionResponse { session: updated }))
}

pub async fn watch_ad_for_change(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let updated = mutate(&state, &code, move |s| {
        let role = s.role_of(caller).ok_or(SessionError::NotParticipant)?;
        session::watch_ad_for_change(s, role)
    })
    .await?;

    broadcast_update(&state, &updated);
    Ok(Json(SessionResponse { session: updated }))
}

pub async fn abandon_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let updated = mutate(&state, &code, move |s| {
        s.role_of(caller).ok_or(SessionError::NotParticipant)?;
        session::abandon_session(s)
    })
    .await?;

    info!("{} abandoned session {}", claims.username, code);
    broadcast_update(&state, &updated);
    Ok(Json(SessionResponse { session: updated }))
}

pub async fn request_partner_challenge(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let updated = tokio::task::spawn_blocking(move || -> Result<Session, ApiError> {
        let premium = premium_of(&db, caller)?;
        let updated = db.mutate_session(&code, move |s| {
            let role = s.role_of(caller).ok_or(SessionError::NotParticipant)?;
            session::request_partner_challenge(s, role, premium, Utc::now())
        })?;
        Ok(updated)
    })
    .await
    .map_err(join_error)??;

    broadcast_update(&state, &updated);
    Ok(Json(SessionResponse { session: updated }))
}

pub async fn cancel_partner_challenge_request(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = claims.sub;
    let updated = mutate(&state, &code, move |s| {
        let role = s.role_of(caller).ok_or(SessionError::NotParticipant)?;
        session::cancel_partner_challenge_request(s, role)
    })
    .await?;

    broadcast_update(&state, &updated);
    Ok(Json(SessionResponse { session: updated }))
}

pub async fn submit_partner_challenge(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitPartnerChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !(1..=4).contains(&req.level) {
        return Err(ApiError::bad_request("level must be between 1 and 4"));
    }
    let caller = claims.sub;
    let updated = mutate(&state, &code, move |s| {
        let role = s.role_of(caller).ok_or(SessionError::NotParticipant)?;
        session::submit_partner_challenge(s, role, &req.text, req.level, req.kind)
    })
    .await?;

    broadcast_update(&state, &updated);
    Ok(Json(SessionResponse { session: updated }))
}

/// Run a pure transition against the stored session off the async runtime.
async fn mutate<F>(state: &AppState, code: &str, f: F) -> Result<Session, ApiError>
where
    F: FnOnce(&mut Session) -> Result<(), SessionError> + Send + 'static,
{
    let db = state.db.clone();
    let code = code.to_string();
    let updated = tokio::task::spawn_blocking(move || db.mutate_session(&code, f))
        .await
        .map_err(join_error)??;
    Ok(updated)
}

fn broadcast_update(state: &AppState, session: &Session) {
    state.dispatcher.broadcast(GatewayEvent::SessionUpdate {
        session: session.clone(),
    });
}
