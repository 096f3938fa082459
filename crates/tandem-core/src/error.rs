use thiserror::Error;

/// How a failure should be handled by the caller.
///
/// Protocol errors mean the caller acted on a stale view: refetch the
/// record, re-derive, retry if still applicable. Policy errors are final
/// answers surfaced verbatim to the user and never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Protocol,
    Policy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("caller is not a participant in this session")]
    NotParticipant,
    #[error("session cannot be joined in its current state")]
    NotJoinable,
    #[error("session has already ended")]
    SessionClosed,
    #[error("not this caller's turn to validate")]
    InvalidTurn,
    #[error("current challenge is not assigned to the caller")]
    NotOwner,
    #[error("session advanced past the index the caller observed")]
    StaleIndex,
    #[error("a partner challenge request is already pending")]
    AlreadyPending,
    #[error("only the requester may cancel a pending request")]
    NotRequester,
    #[error("no partner challenge request is pending")]
    NoPendingRequest,
    #[error("no challenge changes remaining")]
    QuotaExhausted,
    #[error("bonus change ceiling reached")]
    BonusExhausted,
    #[error("operation requires a premium account")]
    NotPremium,
    #[error("challenge text is too short")]
    TextTooShort,
    #[error("challenge text is too long")]
    TextTooLong,
}

impl SessionError {
    pub fn class(self) -> ErrorClass {
        match self {
            SessionError::NotFound
            | SessionError::NotParticipant
            | SessionError::NotJoinable
            | SessionError::SessionClosed
            | SessionError::InvalidTurn
            | SessionError::NotOwner
            | SessionError::StaleIndex
            | SessionError::AlreadyPending
            | SessionError::NotRequester
            | SessionError::NoPendingRequest => ErrorClass::Protocol,
            SessionError::QuotaExhausted
            | SessionError::BonusExhausted
            | SessionError::NotPremium
            | SessionError::TextTooShort
            | SessionError::TextTooLong => ErrorClass::Policy,
        }
    }

    /// Stable wire code for API responses.
    pub fn code(self) -> &'static str {
        match self {
            SessionError::NotFound => "not_found",
            SessionError::NotParticipant => "not_participant",
            SessionError::NotJoinable => "not_joinable",
            SessionError::SessionClosed => "session_closed",
            SessionError::InvalidTurn => "invalid_turn",
            SessionError::NotOwner => "not_owner",
            SessionError::StaleIndex => "stale_index",
            SessionError::AlreadyPending => "already_pending",
            SessionError::NotRequester => "not_requester",
            SessionError::NoPendingRequest => "no_pending_request",
            SessionError::QuotaExhausted => "quota_exhausted",
            SessionError::BonusExhausted => "bonus_exhausted",
            SessionError::NotPremium => "not_premium",
            SessionError::TextTooShort => "text_too_short",
            SessionError::TextTooLong => "text_too_long",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("media was already downloaded")]
    AlreadyDownloaded,
    #[error("cannot download your own media")]
    OwnMedia,
    #[error("media has expired")]
    Expired,
    #[error("downloading media requires a premium account")]
    NotPremium,
    #[error("message carries no media attachment")]
    NotMedia,
}

impl MediaError {
    pub fn class(self) -> ErrorClass {
        match self {
            // NotMedia means the caller targeted the wrong record; the rest
            // are final policy answers.
            MediaError::NotMedia => ErrorClass::Protocol,
            _ => ErrorClass::Policy,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            MediaError::AlreadyDownloaded => "already_downloaded",
            MediaError::OwnMedia => "own_media",
            MediaError::Expired => "expired",
            MediaError::NotPremium => "not_premium",
            MediaError::NotMedia => "not_media",
        }
    }
}
