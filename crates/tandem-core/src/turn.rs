use tandem_types::models::{Challenge, Role, Session, SessionStatus};

/// What the caller may do with the challenge at the current index.
///
/// Derived locally by each client from the latest snapshot; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnView {
    /// The caller must act on the challenge (produce and send proof).
    pub is_challenge_for_me: bool,
    /// The caller must confirm or reject the other participant's proof.
    pub is_my_turn_to_validate: bool,
}

impl TurnView {
    pub const NONE: TurnView = TurnView {
        is_challenge_for_me: false,
        is_my_turn_to_validate: false,
    };
}

/// Pure turn arbitration. Routing is by role only; gender seeds the content
/// pool in the selector and must never influence whose turn it is. While
/// the session is active, exactly one role acts and the other validates;
/// once the session leaves `active`, both answers are false for everyone.
pub fn arbitrate(session: &Session, challenge: &Challenge, caller: Role) -> TurnView {
    if session.status != SessionStatus::Active {
        return TurnView::NONE;
    }
    let for_me = challenge.for_player == caller;
    TurnView {
        is_challenge_for_me: for_me,
        is_my_turn_to_validate: !for_me,
    }
}

/// Arbitration at the session's current index, if any challenge remains.
pub fn arbitrate_current(session: &Session, caller: Role) -> TurnView {
    session
        .current_challenge()
        .map(|ch| arbitrate(session, ch, caller))
        .unwrap_or(TurnView::NONE)
}
