use chrono::{DateTime, Utc};
use tandem_types::models::{
    Challenge, Gender, MediaKind, PartnerChallengeRequest, Role, Session, SessionStatus,
};
use uuid::Uuid;

use crate::error::SessionError;
use crate::turn;

/// Base challenge-replacement quota per role.
pub const MAX_CHALLENGE_CHANGES: u32 = 3;
/// Ceiling on ad-earned bonus changes per role.
pub const MAX_BONUS_CHANGES: u32 = 2;
pub const MIN_CHALLENGE_TEXT_LENGTH: usize = 10;
pub const MAX_CHALLENGE_TEXT_LENGTH: usize = 500;

/// Replacement quota left for a role. Premium callers bypass this entirely.
pub fn changes_remaining(session: &Session, role: Role) -> u32 {
    (MAX_CHALLENGE_CHANGES + session.bonus_changes(role))
        .saturating_sub(session.changes_used(role))
}

/// Open a fresh session in `waiting` with the dealt challenge deck.
pub fn new_session(
    code: String,
    creator_id: Uuid,
    creator_gender: Gender,
    challenges: Vec<Challenge>,
    now: DateTime<Utc>,
) -> Session {
    Session {
        code,
        creator_id,
        partner_id: None,
        creator_gender,
        partner_gender: None,
        status: SessionStatus::Waiting,
        challenges,
        current_challenge_index: 0,
        creator_changes_used: 0,
        partner_changes_used: 0,
        creator_bonus_changes: 0,
        partner_bonus_changes: 0,
        pending_partner_challenge_request: None,
        version: 0,
        created_at: now,
    }
}

/// Second participant joins: `waiting` -> `active`.
pub fn join_session(
    session: &mut Session,
    user_id: Uuid,
    gender: Gender,
) -> Result<(), SessionError> {
    if session.status != SessionStatus::Waiting || session.creator_id == user_id {
        return Err(SessionError::NotJoinable);
    }
    session.partner_id = Some(user_id);
    session.partner_gender = Some(gender);
    session.status = SessionStatus::Active;
    Ok(())
}

/// Validate the other participant's proof and advance the deck.
///
/// `expected_index` is the index the caller observed; a mismatch means the
/// session advanced underneath them and they must re-read before retrying.
pub fn complete_challenge(
    session: &mut Session,
    caller: Role,
    expected_index: usize,
    now: DateTime<Utc>,
) -> Result<(), SessionError> {
    if expected_index != session.current_challenge_index {
        return Err(SessionError::StaleIndex);
    }
    let view = turn::arbitrate_current(session, caller);
    if !view.is_my_turn_to_validate {
        return Err(SessionError::InvalidTurn);
    }

    let idx = session.current_challenge_index;
    let challenge = &mut session.challenges[idx];
    challenge.completed = true;
    challenge.completed_by = Some(caller);
    challenge.completed_at = Some(now);

    session.current_challenge_index += 1;
    if session.current_challenge_index == session.challenges.len() {
        session.status = SessionStatus::Completed;
    }
    Ok(())
}

/// Swap the current challenge for a replacement, spending one change unless
/// the caller is premium. The replacement always inherits the original's
/// `for_player` and `for_gender`: swapping content must never reroute the
/// turn.
pub fn skip_challenge(
    session: &mut Session,
    caller: Role,
    premium: bool,
    expected_index: usize,
    replacement: Challenge,
) -> Result<(), SessionError> {
    if expected_index != session.current_challenge_index {
        return Err(SessionError::StaleIndex);
    }
    let view = turn::arbitrate_current(session, caller);
    if !view.is_challenge_for_me {
        return Err(SessionError::NotOwner);
    }
    if !premium {
        if changes_remaining(session, caller) == 0 {
            return Err(SessionError::QuotaExhausted);
        }
        match caller {
            Role::Creator => session.creator_changes_used += 1,
            Role::Partner => session.partner_changes_used += 1,
        }
    }

    let idx = session.current_challenge_index;
    let original = &session.challenges[idx];
    session.challenges[idx] = Challenge {
        for_player: original.for_player,
        for_gender: original.for_gender,
        completed: false,
        completed_by: None,
        completed_at: None,
        ..replacement
    };
    Ok(())
}

/// Raise the caller's change ceiling by one, up to [`MAX_BONUS_CHANGES`].
/// Ad-view confirmation is the caller's responsibility; this is a plain
/// increment and must only be invoked once per confirmed view.
pub fn watch_ad_for_change(session: &mut Session, caller: Role) -> Result<(), SessionError> {
    if session.status.is_terminal() {
        return Err(SessionError::SessionClosed);
    }
    if session.bonus_changes(caller) >= MAX_BONUS_CHANGES {
        return Err(SessionError::BonusExhausted);
    }
    match caller {
        Role::Creator => session.creator_bonus_changes += 1,
        Role::Partner => session.partner_bonus_changes += 1,
    }
    Ok(())
}

/// Either participant may abandon; terminal, no resurrection.
pub fn abandon_session(session: &mut Session) -> Result<(), SessionError> {
    if session.status.is_terminal() {
        return Err(SessionError::SessionClosed);
    }
    session.status = SessionStatus::Abandoned;
    Ok(())
}

/// Premium-only: ask the other participant to author a custom challenge.
pub fn request_partner_challenge(
    session: &mut Session,
    caller: Role,
    premium: bool,
    now: DateTime<Utc>,
) -> Result<(), SessionError> {
    if session.status.is_terminal() {
        return Err(SessionError::SessionClosed);
    }
    if !premium {
        return Err(SessionError::NotPremium);
    }
    if session.pending_partner_challenge_request.is_some() {
        return Err(SessionError::AlreadyPending);
    }
    session.pending_partner_challenge_request = Some(PartnerChallengeRequest {
        requested_by: caller,
        created_at: now,
    });
    Ok(())
}

pub fn cancel_partner_challenge_request(
    session: &mut Session,
    caller: Role,
) -> Result<(), SessionError> {
    let pending = session
        .pending_partner_challenge_request
        .as_ref()
        .ok_or(SessionError::NoPendingRequest)?;
    if pending.requested_by != caller {
        return Err(SessionError::NotRequester);
    }
    session.pending_partner_challenge_request = None;
    Ok(())
}

/// The non-requesting participant delivers the custom challenge. It is
/// inserted at the current index so it becomes the very next challenge the
/// requester encounters, and it is always routed to the requester's role.
pub fn submit_partner_challenge(
    session: &mut Session,
    caller: Role,
    text: &str,
    level: u8,
    kind: MediaKind,
) -> Result<(), SessionError> {
    if session.status.is_terminal() {
        return Err(SessionError::SessionClosed);
    }
    let requester = match &session.pending_partner_challenge_request {
        Some(pending) if pending.requested_by != caller => pending.requested_by,
        _ => return Err(SessionError::NoPendingRequest),
    };

    let text = text.trim();
    // Limits are in characters, not bytes: multi-byte text must not hit
    // the ceiling early or clear the floor with a handful of emoji.
    let length = text.chars().count();
    if length < MIN_CHALLENGE_TEXT_LENGTH {
        return Err(SessionError::TextTooShort);
    }
    if length > MAX_CHALLENGE_TEXT_LENGTH {
        return Err(SessionError::TextTooLong);
    }

    let for_gender = session
        .gender_of(requester)
        .unwrap_or(session.creator_gender);
    let challenge = Challenge {
        text: text.to_string(),
        level,
        kind,
        for_gender,
        for_player: requester,
        completed: false,
        completed_by: None,
        completed_at: None,
        created_by_partner: true,
    };
    let idx = session.current_challenge_index;
    session.challenges.insert(idx, challenge);
    session.pending_partner_challenge_request = None;
    Ok(())
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;

    pub fn challenge_for(role: Role) -> Challenge {
        Challenge {
            text: format!("demo challenge for {}", role.as_str()),
            level: 1,
            kind: MediaKind::Text,
            for_gender: Gender::Female,
            for_player: role,
            completed: false,
            completed_by: None,
            completed_at: None,
            created_by_partner: false,
        }
    }

    /// Active two-player session with an alternating deck of `count`
    /// challenges, creator first.
    pub fn two_player_session(count: usize) -> Session {
        let challenges = (0..count)
            .map(|i| {
                challenge_for(if i % 2 == 0 {
                    Role::Creator
                } else {
                    Role::Partner
                })
            })
            .collect();
        let mut session = new_session(
            "AB12CD".to_string(),
            Uuid::new_v4(),
            Gender::Female,
            challenges,
            Utc::now(),
        );
        join_session(&mut session, Uuid::new_v4(), Gender::Male).unwrap();
        session
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{challenge_for, two_player_session};
    use super::*;

    fn replacement() -> Challenge {
        Challenge {
            text: "replacement challenge text".to_string(),
            level: 2,
            kind: MediaKind::Photo,
            for_gender: Gender::Male,
            for_player: Role::Partner, // must be overridden by skip
            completed: true,           // must be reset by skip
            completed_by: Some(Role::Partner),
            completed_at: Some(Utc::now()),
            created_by_partner: false,
        }
    }

    #[test]
    fn join_activates_waiting_session() {
        let mut session = new_session(
            "XY34ZW".into(),
            Uuid::new_v4(),
            Gender::Male,
            vec![challenge_for(Role::Creator)],
            Utc::now(),
        );
        assert_eq!(session.status, SessionStatus::Waiting);

        let partner = Uuid::new_v4();
        join_session(&mut session, partner, Gender::Female).unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.role_of(partner), Some(Role::Partner));

        // Third participant or re-join is rejected.
        assert_eq!(
            join_session(&mut session, Uuid::new_v4(), Gender::Male),
            Err(SessionError::NotJoinable)
        );
    }

    #[test]
    fn creator_cannot_join_own_session() {
        let creator = Uuid::new_v4();
        let mut session = new_session(
            "XY34ZW".into(),
            creator,
            Gender::Male,
            vec![challenge_for(Role::Creator)],
            Utc::now(),
        );
        assert_eq!(
            join_session(&mut session, creator, Gender::Male),
            Err(SessionError::NotJoinable)
        );
    }

    #[test]
    fn full_run_through_completes_the_session() {
        let mut session = two_player_session(10);
        let mut last_index = 0;

        for i in 0..10 {
            // The validator is the role the challenge is NOT assigned to.
            let validator = session.current_challenge().unwrap().for_player.other();
            complete_challenge(&mut session, validator, i, Utc::now()).unwrap();

            assert!(session.current_challenge_index >= last_index);
            last_index = session.current_challenge_index;
        }

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.current_challenge_index, session.challenges.len());
        assert_eq!(session.completed_count(), 10);

        // Terminal: nothing more is accepted.
        assert_eq!(
            complete_challenge(&mut session, Role::Creator, 10, Utc::now()),
            Err(SessionError::InvalidTurn)
        );
    }

    #[test]
    fn actor_cannot_validate_own_challenge() {
        let mut session = two_player_session(4);
        // Challenge 0 is for the creator; only the partner validates it.
        assert_eq!(
            complete_challenge(&mut session, Role::Creator, 0, Utc::now()),
            Err(SessionError::InvalidTurn)
        );
        complete_challenge(&mut session, Role::Partner, 0, Utc::now()).unwrap();
        assert_eq!(session.challenges[0].completed_by, Some(Role::Partner));
    }

    #[test]
    fn stale_index_on_racing_completion() {
        let mut session = two_player_session(4);
        complete_challenge(&mut session, Role::Partner, 0, Utc::now()).unwrap();
        // Second caller still believes the index is 0.
        assert_eq!(
            complete_challenge(&mut session, Role::Creator, 0, Utc::now()),
            Err(SessionError::StaleIndex)
        );
        assert_eq!(session.current_challenge_index, 1);
    }

    #[test]
    fn skip_preserves_routing_and_spends_a_change() {
        let mut session = two_player_session(4);
        let original = session.challenges[0].clone();

        skip_challenge(&mut session, Role::Creator, false, 0, replacement()).unwrap();

        let swapped = &session.challenges[0];
        assert_eq!(swapped.for_player, original.for_player);
        assert_eq!(swapped.for_gender, original.for_gender);
        assert!(!swapped.completed);
        assert_eq!(swapped.completed_by, None);
        assert_eq!(swapped.text, "replacement challenge text");
        assert_eq!(session.creator_changes_used, 1);
        // Index does not move on skip.
        assert_eq!(session.current_challenge_index, 0);
    }

    #[test]
    fn skip_rejects_the_validator() {
        let mut session = two_player_session(4);
        assert_eq!(
            skip_challenge(&mut session, Role::Partner, false, 0, replacement()),
            Err(SessionError::NotOwner)
        );
    }

    #[test]
    fn quota_exhaustion_and_ad_bonus() {
        let mut session = two_player_session(4);
        session.creator_changes_used = MAX_CHALLENGE_CHANGES;

        assert_eq!(
            skip_challenge(&mut session, Role::Creator, false, 0, replacement()),
            Err(SessionError::QuotaExhausted)
        );

        watch_ad_for_change(&mut session, Role::Creator).unwrap();
        assert_eq!(changes_remaining(&session, Role::Creator), 1);

        skip_challenge(&mut session, Role::Creator, false, 0, replacement()).unwrap();
        assert_eq!(session.creator_changes_used, 4);
        assert_eq!(changes_remaining(&session, Role::Creator), 0);
    }

    #[test]
    fn bonus_ceiling_is_enforced() {
        let mut session = two_player_session(2);
        watch_ad_for_change(&mut session, Role::Partner).unwrap();
        watch_ad_for_change(&mut session, Role::Partner).unwrap();
        assert_eq!(
            watch_ad_for_change(&mut session, Role::Partner),
            Err(SessionError::BonusExhausted)
        );
        assert_eq!(session.partner_bonus_changes, MAX_BONUS_CHANGES);
    }

    #[test]
    fn premium_skip_bypasses_quota() {
        let mut session = two_player_session(4);
        session.creator_changes_used = MAX_CHALLENGE_CHANGES;

        skip_challenge(&mut session, Role::Creator, true, 0, replacement()).unwrap();
        // Premium skips never consume a change.
        assert_eq!(session.creator_changes_used, MAX_CHALLENGE_CHANGES);
    }

    #[test]
    fn abandon_is_terminal() {
        let mut session = two_player_session(4);
        abandon_session(&mut session).unwrap();
        assert_eq!(session.status, SessionStatus::Abandoned);

        assert_eq!(
            abandon_session(&mut session),
            Err(SessionError::SessionClosed)
        );
        assert_eq!(
            complete_challenge(&mut session, Role::Partner, 0, Utc::now()),
            Err(SessionError::InvalidTurn)
        );
        assert_eq!(
            watch_ad_for_change(&mut session, Role::Creator),
            Err(SessionError::SessionClosed)
        );
    }

    #[test]
    fn partner_challenge_round_trip() {
        let mut session = two_player_session(4);

        assert_eq!(
            request_partner_challenge(&mut session, Role::Creator, false, Utc::now()),
            Err(SessionError::NotPremium)
        );

        request_partner_challenge(&mut session, Role::Creator, true, Utc::now()).unwrap();
        assert_eq!(
            request_partner_challenge(&mut session, Role::Creator, true, Utc::now()),
            Err(SessionError::AlreadyPending)
        );

        // Requester cannot fulfil their own request.
        assert_eq!(
            submit_partner_challenge(
                &mut session,
                Role::Creator,
                "a perfectly valid dare",
                2,
                MediaKind::Photo,
            ),
            Err(SessionError::NoPendingRequest)
        );

        let deck_len = session.challenges.len();
        submit_partner_challenge(
            &mut session,
            Role::Partner,
            "  a perfectly valid dare  ",
            2,
            MediaKind::Photo,
        )
        .unwrap();

        assert_eq!(session.challenges.len(), deck_len + 1);
        assert!(session.pending_partner_challenge_request.is_none());

        // Inserted at the current index, routed to the requester, trimmed.
        let next = session.current_challenge().unwrap();
        assert_eq!(next.for_player, Role::Creator);
        assert!(next.created_by_partner);
        assert_eq!(next.text, "a perfectly valid dare");
    }

    #[test]
    fn cancel_is_requester_only() {
        let mut session = two_player_session(2);
        assert_eq!(
            cancel_partner_challenge_request(&mut session, Role::Creator),
            Err(SessionError::NoPendingRequest)
        );

        request_partner_challenge(&mut session, Role::Partner, true, Utc::now()).unwrap();
        assert_eq!(
            cancel_partner_challenge_request(&mut session, Role::Creator),
            Err(SessionError::NotRequester)
        );
        cancel_partner_challenge_request(&mut session, Role::Partner).unwrap();
        assert!(session.pending_partner_challenge_request.is_none());
    }

    #[test]
    fn submitted_text_length_is_validated() {
        let mut session = two_player_session(2);
        request_partner_challenge(&mut session, Role::Creator, true, Utc::now()).unwrap();

        assert_eq!(
            submit_partner_challenge(
                &mut session,
                Role::Partner,
                "   short   ",
                1,
                MediaKind::Text,
            ),
            Err(SessionError::TextTooShort)
        );
        let long = "x".repeat(MAX_CHALLENGE_TEXT_LENGTH + 1);
        assert_eq!(
            submit_partner_challenge(
                &mut session,
                Role::Partner,
                &long,
                1,
                MediaKind::Text,
            ),
            Err(SessionError::TextTooLong)
        );
        // Failed submissions leave the request pending.
        assert!(session.pending_partner_challenge_request.is_some());
    }

    #[test]
    fn text_limits_count_characters_not_bytes() {
        let mut session = two_player_session(2);
        request_partner_challenge(&mut session, Role::Creator, true, Utc::now()).unwrap();

        // Nine emoji are 36 bytes but still under the ten-character floor.
        let short = "\u{1F49C}".repeat(MIN_CHALLENGE_TEXT_LENGTH - 1);
        assert_eq!(
            submit_partner_challenge(&mut session, Role::Partner, &short, 1, MediaKind::Text),
            Err(SessionError::TextTooShort)
        );

        // Exactly at the character ceiling passes even though the byte
        // count is double the limit.
        let max = "é".repeat(MAX_CHALLENGE_TEXT_LENGTH);
        assert!(max.len() > MAX_CHALLENGE_TEXT_LENGTH);
        submit_partner_challenge(&mut session, Role::Partner, &max, 1, MediaKind::Text)
            .unwrap();
        assert_eq!(
            session.current_challenge().unwrap().text.chars().count(),
            MAX_CHALLENGE_TEXT_LENGTH
        );
    }
}
