use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use tandem_core::SessionError;
use tandem_core::media::expiry_for;
use tandem_db::Database;
use tandem_types::api::{Claims, MessageResponse, SendMessageRequest};
use tandem_types::events::GatewayEvent;
use tandem_types::models::{Gender, MediaKind, Message, Session};

use crate::auth::AppState;
use crate::error::{ApiError, join_error};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;
const MAX_TEXT_LENGTH: usize = 2000;
const MAX_MEDIA_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    /// Cursor: `created_at` of the oldest message from the previous page.
    pub before: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub kind: MediaKind,
}

/// Load the session and confirm the caller is one of its two participants.
fn require_participant(db: &Database, code: &str, caller: Uuid) -> Result<Session, ApiError> {
    let session = db.load_session(code)?.ok_or(SessionError::NotFound)?;
    if session.role_of(caller).is_none() {
        return Err(SessionError::NotParticipant.into());
    }
    Ok(session)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

    let messages = tokio::task::spawn_blocking(move || -> Result<Vec<Message>, ApiError> {
        require_participant(&db, &code, caller)?;
        Ok(db.get_messages(&code, limit, query.before.as_deref())?)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("message content is empty"));
    }
    if content.len() > MAX_TEXT_LENGTH {
        return Err(ApiError::bad_request("message content too long"));
    }

    let db = state.db.clone();
    let caller = claims.sub;
    let message = tokio::task::spawn_blocking(move || -> Result<Message, ApiError> {
        let session = require_participant(&db, &code, caller)?;
        let role = session.role_of(caller).ok_or(SessionError::NotParticipant)?;
        let sender_gender = session
            .gender_of(role)
            .ok_or(SessionError::NotParticipant)?;

        let message = Message {
            id: Uuid::new_v4(),
            session_code: code,
            sender_id: caller,
            sender_gender,
            kind: MediaKind::Text,
            content: Some(content),
            media_url: None,
            media_thumbnail_url: None,
            media_expires_at: None,
            media_downloaded: false,
            read: false,
            created_at: Utc::now(),
        };
        db.insert_message(&message)?;
        Ok(message)
    })
    .await
    .map_err(join_error)??;

    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        message: message.clone(),
    });
    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

/// Upload a media attachment. The body is the raw blob; the kind comes
/// from the query string. Expiry is stamped here from the server clock.
pub async fn send_media(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if query.kind == MediaKind::Text {
        return Err(ApiError::bad_request("media kind required"));
    }
    if body.is_empty() {
        return Err(ApiError::bad_request("empty upload"));
    }
    if body.len() > MAX_MEDIA_BYTES {
        return Err(ApiError::bad_request("upload too large"));
    }

    let db = state.db.clone();
    let caller = claims.sub;
    let code_for_check = code.clone();
    let sender_gender =
        tokio::task::spawn_blocking(move || -> Result<Gender, ApiError> {
            let session = require_participant(&db, &code_for_check, caller)?;
            let role = session.role_of(caller).ok_or(SessionError::NotParticipant)?;
            session
                .gender_of(role)
                .ok_or_else(|| SessionError::NotParticipant.into())
        })
        .await
        .map_err(join_error)??;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let message = Message {
        id,
        session_code: code.clone(),
        sender_id: caller,
        sender_gender,
        kind: query.kind,
        content: None,
        media_url: Some(format!("/sessions/{code}/media/{id}")),
        media_thumbnail_url: None,
        media_expires_at: Some(expiry_for(now)),
        media_downloaded: false,
        read: false,
        created_at: now,
    };

    state.storage.save(id, &body).await?;

    let db = state.db.clone();
    let record = message.clone();
    let inserted = tokio::task::spawn_blocking(move || db.insert_message(&record))
        .await
        .map_err(join_error)?;
    if let Err(e) = inserted {
        // Keep disk and DB consistent: a record-less blob would never be
        // swept by the cleanup loop's expiry check.
        if let Err(del) = state.storage.delete(id).await {
            warn!("Failed to remove orphaned upload {}: {}", id, del);
        }
        return Err(e.into());
    }

    info!(
        "{} uploaded {} media to session {}",
        claims.username,
        query.kind.as_str(),
        code
    );
    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        message: message.clone(),
    });
    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let code_cl = code.clone();
    let flipped = tokio::task::spawn_blocking(move || -> Result<usize, ApiError> {
        require_participant(&db, &code_cl, caller)?;
        Ok(db.mark_all_read(&code_cl, caller)?)
    })
    .await
    .map_err(join_error)??;

    if flipped > 0 {
        state.dispatcher.broadcast(GatewayEvent::MessagesRead {
            session_code: code,
            reader_id: caller,
        });
    }
    Ok(Json(serde_json::json!({ "marked": flipped })))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let count = tokio::task::spawn_blocking(move || -> Result<i64, ApiError> {
        require_participant(&db, &code, caller)?;
        Ok(db.unread_count(&code, caller)?)
    })
    .await
    .map_err(join_error)??;

    Ok(Json(serde_json::json!({ "unread": count })))
}
