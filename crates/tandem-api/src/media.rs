use axum::{
    Extension, Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tandem_core::media::is_expired;
use tandem_core::{MediaError, SessionError};
use tandem_types::api::{Claims, DownloadMediaResponse};
use tandem_types::events::GatewayEvent;
use tandem_types::models::Message;

use crate::auth::AppState;
use crate::error::{ApiError, join_error};

/// Claim the at-most-once download of a media message. On success the
/// flag is flipped atomically in the store and both participants are
/// notified; any later attempt by anyone answers `already_downloaded`.
pub async fn download_media(
    State(state): State<AppState>,
    Path((code, message_id)): Path<(String, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let code_cl = code.clone();
    let message = tokio::task::spawn_blocking(move || -> Result<Message, ApiError> {
        let premium = db
            .get_user_by_id(&caller.to_string())?
            .map(|u| u.premium)
            .unwrap_or(false);

        // Session scoping and participant-ship are enforced inside the
        // gate, under the same lock as the flag flip.
        Ok(db.mark_media_downloaded(&code_cl, message_id, caller, premium, Utc::now())?)
    })
    .await
    .map_err(join_error)??;

    info!("{} downloaded media {}", claims.username, message_id);
    state.dispatcher.broadcast(GatewayEvent::MediaDownloaded {
        session_code: code,
        message_id,
        downloaded_by: caller,
    });

    let url = message
        .media_url
        .clone()
        .ok_or(MediaError::NotMedia)?;
    Ok(Json(DownloadMediaResponse {
        url,
        kind: message.kind,
    }))
}

/// Serve the raw blob. Expired attachments answer 410 even when the
/// cleanup loop has not swept the bytes off disk yet.
pub async fn get_media(
    State(state): State<AppState>,
    Path((code, message_id)): Path<(String, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let caller = claims.sub;
    let code_cl = code.clone();
    let message = tokio::task::spawn_blocking(move || -> Result<Message, ApiError> {
        let session = db.load_session(&code_cl)?.ok_or(SessionError::NotFound)?;
        if session.role_of(caller).is_none() {
            return Err(SessionError::NotParticipant.into());
        }
        let message = db
            .get_message(message_id)?
            .filter(|m| m.session_code == code_cl)
            .ok_or(SessionError::NotFound)?;
        Ok(message)
    })
    .await
    .map_err(join_error)??;

    let expires_at = message.media_expires_at.ok_or(MediaError::NotMedia)?;
    if is_expired(Utc::now(), expires_at) {
        return Err(MediaError::Expired.into());
    }

    let bytes = state
        .storage
        .read(message_id)
        .await?
        .ok_or(MediaError::Expired)?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}
