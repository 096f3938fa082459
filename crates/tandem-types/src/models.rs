use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub premium: bool,
    pub created_at: DateTime<Utc>,
}

/// Fixed participant identity within a session. Assigned when the session
/// is created (creator) or joined (partner) and never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Creator,
    Partner,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Creator => Role::Partner,
            Role::Partner => Role::Creator,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Creator => "creator",
            Role::Partner => "partner",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "creator" => Some(Role::Creator),
            "partner" => Some(Role::Partner),
            _ => None,
        }
    }
}

/// Gender seeds the challenge content pool only. Turn routing is always
/// by [`Role`] — same-gender pairs would be ambiguous otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(s: &str) -> Option<Gender> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<SessionStatus> {
        match s {
            "waiting" => Some(SessionStatus::Waiting),
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

/// Proof medium a challenge (or message) is carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Text,
    Photo,
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Text => "text",
            MediaKind::Photo => "photo",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<MediaKind> {
        match s {
            "text" => Some(MediaKind::Text),
            "photo" => Some(MediaKind::Photo),
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub text: String,
    pub level: u8,
    pub kind: MediaKind,
    pub for_gender: Gender,
    /// The role that must act. Routing key for the turn arbiter.
    pub for_player: Role,
    pub completed: bool,
    pub completed_by: Option<Role>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by_partner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerChallengeRequest {
    pub requested_by: Role,
    pub created_at: DateTime<Utc>,
}

/// The shared session record. Jointly owned by its two participants; every
/// mutation goes through a version-guarded transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub code: String,
    pub creator_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub creator_gender: Gender,
    pub partner_gender: Option<Gender>,
    pub status: SessionStatus,
    pub challenges: Vec<Challenge>,
    pub current_challenge_index: usize,
    pub creator_changes_used: u32,
    pub partner_changes_used: u32,
    pub creator_bonus_changes: u32,
    pub partner_bonus_changes: u32,
    pub pending_partner_challenge_request: Option<PartnerChallengeRequest>,
    /// Compare-and-set key for the store; bumped by every committed mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        if self.creator_id == user_id {
            Some(Role::Creator)
        } else if self.partner_id == Some(user_id) {
            Some(Role::Partner)
        } else {
            None
        }
    }

    pub fn current_challenge(&self) -> Option<&Challenge> {
        self.challenges.get(self.current_challenge_index)
    }

    pub fn changes_used(&self, role: Role) -> u32 {
        match role {
            Role::Creator => self.creator_changes_used,
            Role::Partner => self.partner_changes_used,
        }
    }

    pub fn bonus_changes(&self, role: Role) -> u32 {
        match role {
            Role::Creator => self.creator_bonus_changes,
            Role::Partner => self.partner_bonus_changes,
        }
    }

    pub fn gender_of(&self, role: Role) -> Option<Gender> {
        match role {
            Role::Creator => Some(self.creator_gender),
            Role::Partner => self.partner_gender,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.challenges.iter().filter(|c| c.completed).count()
    }
}

/// A chat message. Media kinds carry an absolute expiry instant assigned
/// by the server at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_code: String,
    pub sender_id: Uuid,
    pub sender_gender: Gender,
    pub kind: MediaKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_thumbnail_url: Option<String>,
    pub media_expires_at: Option<DateTime<Utc>>,
    pub media_downloaded: bool,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
