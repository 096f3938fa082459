use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use tandem_core::{MediaError, SessionError};
use tandem_db::StoreError;

/// Single place where typed core failures become HTTP answers. Protocol
/// errors tell the client to refetch and re-derive; policy errors are
/// surfaced verbatim; transport errors become opaque 500s.
#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    BadRequest(&'static str),
}

impl ApiError {
    pub fn bad_request(msg: &'static str) -> Self {
        ApiError::BadRequest(msg)
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Store(StoreError::Session(e)) => (session_status(*e), e.code()),
            ApiError::Store(StoreError::Media(e)) => (media_status(*e), e.code()),
            ApiError::Store(StoreError::Sqlite(_)) | ApiError::Store(StoreError::Other(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

fn session_status(e: SessionError) -> StatusCode {
    match e {
        SessionError::NotFound => StatusCode::NOT_FOUND,
        SessionError::NotParticipant
        | SessionError::NotOwner
        | SessionError::NotRequester
        | SessionError::QuotaExhausted
        | SessionError::BonusExhausted
        | SessionError::NotPremium => StatusCode::FORBIDDEN,
        SessionError::NotJoinable
        | SessionError::SessionClosed
        | SessionError::InvalidTurn
        | SessionError::StaleIndex
        | SessionError::AlreadyPending
        | SessionError::NoPendingRequest => StatusCode::CONFLICT,
        SessionError::TextTooShort | SessionError::TextTooLong => StatusCode::BAD_REQUEST,
    }
}

fn media_status(e: MediaError) -> StatusCode {
    match e {
        MediaError::AlreadyDownloaded => StatusCode::CONFLICT,
        MediaError::OwnMedia | MediaError::NotPremium => StatusCode::FORBIDDEN,
        MediaError::Expired => StatusCode::GONE,
        MediaError::NotMedia => StatusCode::NOT_FOUND,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store(StoreError::Sqlite(_) | StoreError::Other(_)) = &self {
            error!("Internal error: {:?}", self);
        }
        let (status, code) = self.status_and_code();
        let body = match &self {
            ApiError::BadRequest(msg) => serde_json::json!({ "error": code, "detail": msg }),
            _ => serde_json::json!({ "error": code }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Store(StoreError::Session(e))
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        ApiError::Store(StoreError::Media(e))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Store(StoreError::Other(e))
    }
}

/// Join-error fallback for spawn_blocking.
pub fn join_error(e: tokio::task::JoinError) -> ApiError {
    ApiError::Store(StoreError::Other(anyhow::anyhow!(
        "spawn_blocking join error: {e}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_conflict() {
        assert_eq!(session_status(SessionError::StaleIndex), StatusCode::CONFLICT);
        assert_eq!(session_status(SessionError::InvalidTurn), StatusCode::CONFLICT);
        assert_eq!(session_status(SessionError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn policy_errors_are_final_answers() {
        assert_eq!(
            session_status(SessionError::QuotaExhausted),
            StatusCode::FORBIDDEN
        );
        assert_eq!(media_status(MediaError::Expired), StatusCode::GONE);
        assert_eq!(
            media_status(MediaError::AlreadyDownloaded),
            StatusCode::CONFLICT
        );
    }
}
