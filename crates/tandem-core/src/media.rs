use chrono::{DateTime, Duration, Utc};
use tandem_types::models::Message;
use uuid::Uuid;

use crate::error::MediaError;

/// Lifetime of a media attachment, applied once at creation from the
/// server clock. Both clients converge on the same absolute instant;
/// nothing re-derives a relative countdown from local state.
pub const MEDIA_TTL_SECS: i64 = 60;

pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::seconds(MEDIA_TTL_SECS)
}

pub fn is_expired(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
    now >= expires_at
}

/// Time left before expiry, floored at zero. Pure function of the two
/// instants: render ticks re-evaluate this instead of counting down a
/// mutable accumulator, so pause/resume of the host never drifts.
pub fn remaining(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> std::time::Duration {
    (expires_at - now).to_std().unwrap_or_default()
}

/// Whether a download attempt would currently succeed.
pub fn can_download(message: &Message, caller: Uuid, premium: bool, now: DateTime<Utc>) -> bool {
    check_download(message, caller, premium, now).is_ok()
}

/// Gate for the at-most-once download. Checked server-side on every call;
/// the client-side rendering of the same rule is advisory only.
pub fn check_download(
    message: &Message,
    caller: Uuid,
    premium: bool,
    now: DateTime<Utc>,
) -> Result<(), MediaError> {
    let Some(expires_at) = message.media_expires_at else {
        return Err(MediaError::NotMedia);
    };
    if message.media_downloaded {
        // At-most-once, regardless of who asks.
        return Err(MediaError::AlreadyDownloaded);
    }
    if message.sender_id == caller {
        return Err(MediaError::OwnMedia);
    }
    if is_expired(now, expires_at) {
        return Err(MediaError::Expired);
    }
    if !premium {
        return Err(MediaError::NotPremium);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_types::models::{Gender, MediaKind};

    fn media_message(created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            session_code: "AB12CD".into(),
            sender_id: Uuid::new_v4(),
            sender_gender: Gender::Female,
            kind: MediaKind::Photo,
            content: None,
            media_url: Some("/sessions/AB12CD/media/x".into()),
            media_thumbnail_url: None,
            media_expires_at: Some(expiry_for(created_at)),
            media_downloaded: false,
            read: false,
            created_at,
        }
    }

    #[test]
    fn download_gate_allows_exactly_one_pass() {
        let now = Utc::now();
        let mut msg = media_message(now);
        let recipient = Uuid::new_v4();

        check_download(&msg, recipient, true, now).unwrap();
        msg.media_downloaded = true;

        assert_eq!(
            check_download(&msg, recipient, true, now),
            Err(MediaError::AlreadyDownloaded)
        );
        // Regardless of caller — even the sender sees AlreadyDownloaded.
        assert_eq!(
            check_download(&msg, msg.sender_id, true, now),
            Err(MediaError::AlreadyDownloaded)
        );
    }

    #[test]
    fn sender_cannot_download_own_media() {
        let now = Utc::now();
        let msg = media_message(now);
        assert_eq!(
            check_download(&msg, msg.sender_id, true, now),
            Err(MediaError::OwnMedia)
        );
    }

    #[test]
    fn expiry_beats_every_other_answer_but_downloaded() {
        let created = Utc::now();
        let msg = media_message(created);
        let after = expiry_for(created) + Duration::seconds(1);

        // Never downloaded, still expired.
        assert_eq!(
            check_download(&msg, Uuid::new_v4(), true, after),
            Err(MediaError::Expired)
        );
        // Exactly at the instant counts as expired.
        assert_eq!(
            check_download(&msg, Uuid::new_v4(), true, expiry_for(created)),
            Err(MediaError::Expired)
        );
    }

    #[test]
    fn non_premium_cannot_download() {
        let now = Utc::now();
        let msg = media_message(now);
        assert_eq!(
            check_download(&msg, Uuid::new_v4(), false, now),
            Err(MediaError::NotPremium)
        );
        assert!(!can_download(&msg, Uuid::new_v4(), false, now));
    }

    #[test]
    fn text_messages_are_not_downloadable() {
        let now = Utc::now();
        let mut msg = media_message(now);
        msg.kind = MediaKind::Text;
        msg.media_url = None;
        msg.media_expires_at = None;
        assert_eq!(
            check_download(&msg, Uuid::new_v4(), true, now),
            Err(MediaError::NotMedia)
        );
    }

    #[test]
    fn remaining_is_a_pure_floor_of_the_deadline() {
        let created = Utc::now();
        let deadline = expiry_for(created);

        assert_eq!(
            remaining(created, deadline),
            std::time::Duration::from_secs(MEDIA_TTL_SECS as u64)
        );
        assert_eq!(
            remaining(deadline + Duration::seconds(30), deadline),
            std::time::Duration::ZERO
        );
    }
}
