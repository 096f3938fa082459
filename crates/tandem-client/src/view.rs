use chrono::{DateTime, Utc};
use uuid::Uuid;

use tandem_core::media;
use tandem_core::session::changes_remaining;
use tandem_core::turn::{self, TurnView};
use tandem_types::events::GatewayEvent;
use tandem_types::models::{Message, Role, Session};

/// One client's materialized view of a session.
///
/// Holds the latest pushed snapshot plus the message timeline and answers
/// every render-time question as a pure derivation. `SessionUpdate` events
/// replace the snapshot wholesale, so the view can never drift further
/// than one push behind the store.
pub struct SessionView {
    user_id: Uuid,
    /// The session this view is bound to, fixed at construction — the
    /// code the caller subscribed with, known before any push arrives.
    session_code: String,
    session: Option<Session>,
    /// Oldest-first message timeline.
    messages: Vec<Message>,
}

impl SessionView {
    pub fn new(user_id: Uuid, session_code: impl Into<String>) -> Self {
        Self {
            user_id,
            session_code: session_code.into(),
            session: None,
            messages: Vec::new(),
        }
    }

    pub fn session_code(&self) -> &str {
        &self.session_code
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn role(&self) -> Option<Role> {
        self.session.as_ref()?.role_of(self.user_id)
    }

    /// Seed the timeline from a REST history fetch (newest-first page, as
    /// the API returns it).
    pub fn load_history(&mut self, mut newest_first: Vec<Message>) {
        newest_first.reverse();
        self.messages = newest_first;
    }

    /// Fold one gateway event into the view.
    pub fn apply(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { .. } => {}
            GatewayEvent::SessionUpdate { session } => {
                if self.accepts(&session.code) {
                    self.session = Some(session);
                }
            }
            GatewayEvent::MessageCreate { message } => {
                if self.accepts(&message.session_code)
                    && !self.messages.iter().any(|m| m.id == message.id)
                {
                    self.messages.push(message);
                }
            }
            GatewayEvent::MessagesRead {
                session_code,
                reader_id,
            } => {
                if self.accepts(&session_code) {
                    for m in &mut self.messages {
                        if m.sender_id != reader_id {
                            m.read = true;
                        }
                    }
                }
            }
            GatewayEvent::MediaDownloaded {
                session_code,
                message_id,
                ..
            } => {
                if self.accepts(&session_code) {
                    if let Some(m) = self.messages.iter_mut().find(|m| m.id == message_id) {
                        m.media_downloaded = true;
                    }
                }
            }
        }
    }

    /// Whether an event for `code` belongs to this view. Scoping works
    /// from the first event: a stray push for another session can never
    /// seed the timeline, snapshot or no snapshot.
    fn accepts(&self, code: &str) -> bool {
        self.session_code == code
    }

    /// Turn arbitration for this client at the current challenge. Both
    /// predicates are false when there is no snapshot yet, the caller is
    /// not a participant, or the session is no longer active.
    pub fn turn(&self) -> TurnView {
        match (&self.session, self.role()) {
            (Some(session), Some(role)) => turn::arbitrate_current(session, role),
            _ => TurnView::NONE,
        }
    }

    /// Replacement changes this client still has.
    pub fn changes_remaining(&self) -> u32 {
        match (&self.session, self.role()) {
            (Some(session), Some(role)) => changes_remaining(session, role),
            _ => 0,
        }
    }

    /// Messages from the other participant not yet marked read.
    pub fn unread_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender_id != self.user_id && !m.read)
            .count()
    }

    /// Time left on a media message's countdown, floored at zero. `None`
    /// for unknown messages and text messages. Pure in `now`: render
    /// ticks re-evaluate instead of decrementing local state, so the
    /// display can never disagree with the server's expiry decision.
    pub fn media_countdown(
        &self,
        message_id: Uuid,
        now: DateTime<Utc>,
    ) -> Option<std::time::Duration> {
        let message = self.messages.iter().find(|m| m.id == message_id)?;
        let expires_at = message.media_expires_at?;
        Some(media::remaining(now, expires_at))
    }

    /// Whether this client could download the media right now.
    pub fn can_download(&self, message_id: Uuid, premium: bool, now: DateTime<Utc>) -> bool {
        self.messages
            .iter()
            .find(|m| m.id == message_id)
            .is_some_and(|m| media::can_download(m, self.user_id, premium, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tandem_core::media::expiry_for;
    use tandem_core::session::test_support::two_player_session;
    use tandem_types::models::{Gender, MediaKind, SessionStatus};

    fn text_message(session_code: &str, sender_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            session_code: session_code.to_string(),
            sender_id,
            sender_gender: Gender::Male,
            kind: MediaKind::Text,
            content: Some("hey".into()),
            media_url: None,
            media_thumbnail_url: None,
            media_expires_at: None,
            media_downloaded: false,
            read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_replaces_state_wholesale() {
        let session = two_player_session(4);
        let mut view = SessionView::new(session.creator_id, session.code.clone());

        view.apply(GatewayEvent::SessionUpdate {
            session: session.clone(),
        });
        assert!(view.turn().is_challenge_for_me);

        // A later snapshot with the session abandoned kills both predicates.
        let mut closed = session.clone();
        closed.status = SessionStatus::Abandoned;
        view.apply(GatewayEvent::SessionUpdate { session: closed });
        assert_eq!(view.turn(), TurnView::NONE);
    }

    #[test]
    fn events_for_other_sessions_are_ignored() {
        let session = two_player_session(2);
        let mut view = SessionView::new(session.creator_id, session.code.clone());
        view.apply(GatewayEvent::SessionUpdate {
            session: session.clone(),
        });

        view.apply(GatewayEvent::MessageCreate {
            message: text_message("ZZZZZZ", session.partner_id.unwrap()),
        });
        assert!(view.messages().is_empty());
        assert_eq!(view.unread_count(), 0);
    }

    #[test]
    fn stray_events_before_the_first_snapshot_are_ignored() {
        let session = two_player_session(2);
        let mut view = SessionView::new(session.creator_id, session.code.clone());

        // No snapshot yet; the binding alone decides what belongs here.
        view.apply(GatewayEvent::MessageCreate {
            message: text_message("ZZZZZZ", session.partner_id.unwrap()),
        });
        let mut other = session.clone();
        other.code = "ZZZZZZ".into();
        view.apply(GatewayEvent::SessionUpdate { session: other });

        assert!(view.messages().is_empty());
        assert!(view.session().is_none());

        // The bound session's own events still land.
        view.apply(GatewayEvent::SessionUpdate {
            session: session.clone(),
        });
        view.apply(GatewayEvent::MessageCreate {
            message: text_message(&session.code, session.partner_id.unwrap()),
        });
        assert_eq!(view.messages().len(), 1);
        assert_eq!(view.unread_count(), 1);
    }

    #[test]
    fn unread_counts_only_the_partner_and_read_flip_clears_them() {
        let session = two_player_session(2);
        let me = session.creator_id;
        let partner = session.partner_id.unwrap();
        let mut view = SessionView::new(me, session.code.clone());
        view.apply(GatewayEvent::SessionUpdate {
            session: session.clone(),
        });

        view.apply(GatewayEvent::MessageCreate {
            message: text_message(&session.code, partner),
        });
        view.apply(GatewayEvent::MessageCreate {
            message: text_message(&session.code, me),
        });
        assert_eq!(view.unread_count(), 1);

        // I marked everything read; my own sent message is untouched.
        view.apply(GatewayEvent::MessagesRead {
            session_code: session.code.clone(),
            reader_id: me,
        });
        assert_eq!(view.unread_count(), 0);
        assert!(!view.messages()[1].read);
    }

    #[test]
    fn duplicate_message_pushes_collapse() {
        let session = two_player_session(2);
        let mut view = SessionView::new(session.creator_id, session.code.clone());
        view.apply(GatewayEvent::SessionUpdate {
            session: session.clone(),
        });

        let msg = text_message(&session.code, session.partner_id.unwrap());
        view.apply(GatewayEvent::MessageCreate {
            message: msg.clone(),
        });
        view.apply(GatewayEvent::MessageCreate { message: msg });
        assert_eq!(view.messages().len(), 1);
    }

    #[test]
    fn countdown_is_pure_in_now() {
        let session = two_player_session(2);
        let partner = session.partner_id.unwrap();
        let mut view = SessionView::new(session.creator_id, session.code.clone());
        view.apply(GatewayEvent::SessionUpdate {
            session: session.clone(),
        });

        let created = Utc::now();
        let mut msg = text_message(&session.code, partner);
        msg.kind = MediaKind::Photo;
        msg.content = None;
        msg.media_url = Some(format!("/sessions/{}/media/{}", session.code, msg.id));
        msg.media_expires_at = Some(expiry_for(created));
        let id = msg.id;
        view.apply(GatewayEvent::MessageCreate { message: msg });

        assert_eq!(
            view.media_countdown(id, created),
            Some(std::time::Duration::from_secs(60))
        );
        assert_eq!(
            view.media_countdown(id, created + Duration::seconds(45)),
            Some(std::time::Duration::from_secs(15))
        );
        // Floored at zero, never negative.
        assert_eq!(
            view.media_countdown(id, created + Duration::seconds(600)),
            Some(std::time::Duration::ZERO)
        );

        assert!(view.can_download(id, true, created));
        assert!(!view.can_download(id, false, created));
        assert!(!view.can_download(id, true, created + Duration::seconds(61)));
    }

    #[test]
    fn download_event_marks_the_message() {
        let session = two_player_session(2);
        let partner = session.partner_id.unwrap();
        let mut view = SessionView::new(session.creator_id, session.code.clone());
        view.apply(GatewayEvent::SessionUpdate {
            session: session.clone(),
        });

        let mut msg = text_message(&session.code, partner);
        msg.kind = MediaKind::Photo;
        msg.media_expires_at = Some(expiry_for(Utc::now()));
        let id = msg.id;
        view.apply(GatewayEvent::MessageCreate { message: msg });

        view.apply(GatewayEvent::MediaDownloaded {
            session_code: session.code.clone(),
            message_id: id,
            downloaded_by: session.creator_id,
        });
        assert!(view.messages()[0].media_downloaded);
        assert!(!view.can_download(id, true, Utc::now()));
    }
}
