use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use tandem_core::SessionError;
use tandem_core::media::check_download;
use tandem_core::selector::ChallengeTemplate;
use tandem_types::models::{Gender, MediaKind, Message};

use crate::models::UserRow;
use crate::{Database, OptionalExt, StoreError, parse_ts};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "username", username)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn set_premium(&self, id: &str, premium: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET premium = ?1 WHERE id = ?2",
                rusqlite::params![premium, id],
            )?;
            Ok(())
        })
    }

    // -- Catalog --

    pub fn load_catalog(&self) -> Result<Vec<ChallengeTemplate>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT text, level, kind, for_gender FROM catalog ORDER BY id")?;
            let raw = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u8>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            raw.into_iter()
                .map(|(text, level, kind, gender)| {
                    Ok(ChallengeTemplate {
                        text,
                        level,
                        kind: MediaKind::parse(&kind)
                            .ok_or_else(|| anyhow!("corrupt catalog kind '{}'", kind))?,
                        for_gender: Gender::parse(&gender)
                            .ok_or_else(|| anyhow!("corrupt catalog gender '{}'", gender))?,
                    })
                })
                .collect()
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, session_code, sender_id, sender_gender, kind, content,
                     media_url, media_thumbnail_url, media_expires_at,
                     media_downloaded, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    message.id.to_string(),
                    message.session_code,
                    message.sender_id.to_string(),
                    message.sender_gender.as_str(),
                    message.kind.as_str(),
                    message.content,
                    message.media_url,
                    message.media_thumbnail_url,
                    message.media_expires_at.map(|t| t.to_rfc3339()),
                    message.media_downloaded,
                    message.read,
                    message.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Newest-first page of a session's messages. `before` is the cursor:
    /// the `created_at` of the oldest message from the previous page.
    pub fn get_messages(
        &self,
        session_code: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE session_code = ?1 {}
                 ORDER BY created_at DESC
                 LIMIT ?2",
                if before.is_some() {
                    "AND created_at < ?3"
                } else {
                    ""
                }
            );
            let mut stmt = conn.prepare(&sql)?;
            let raw = match before {
                Some(cursor) => stmt
                    .query_map(rusqlite::params![session_code, limit, cursor], raw_message)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map(rusqlite::params![session_code, limit], raw_message)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            };
            raw.into_iter().map(message_from_raw).collect()
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Flip `read` on every message in the session not authored by the
    /// caller. Idempotent: already-read rows are untouched, so a repeat
    /// call is a no-op. Returns how many rows flipped.
    pub fn mark_all_read(&self, session_code: &str, reader_id: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE session_code = ?1 AND sender_id != ?2 AND is_read = 0",
                rusqlite::params![session_code, reader_id.to_string()],
            )?;
            Ok(n)
        })
    }

    pub fn unread_count(&self, session_code: &str, user_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE session_code = ?1 AND sender_id != ?2 AND is_read = 0",
                rusqlite::params![session_code, user_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(n)
        })
    }

    /// The at-most-once download gate, applied atomically: scope and
    /// eligibility run against the rows as they exist under the write
    /// lock, before anything is mutated, and the flag flip is additionally
    /// guarded on `media_downloaded = 0` so no interleaving can ever grant
    /// a second download. A caller outside the message's session is
    /// rejected here, not after the flip — an outsider must never be able
    /// to burn the recipient's one download.
    pub fn mark_media_downloaded(
        &self,
        session_code: &str,
        message_id: Uuid,
        caller: Uuid,
        premium: bool,
        now: DateTime<Utc>,
    ) -> Result<Message, StoreError> {
        let conn = self.lock()?;

        let mut message =
            query_message(&conn, message_id)?.ok_or(SessionError::NotFound)?;
        if message.session_code != session_code {
            return Err(SessionError::NotFound.into());
        }

        let participants: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT creator_id, partner_id FROM sessions WHERE code = ?1",
                [session_code],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let (creator_id, partner_id) = participants.ok_or(SessionError::NotFound)?;
        let caller_id = caller.to_string();
        if caller_id != creator_id && partner_id.as_deref() != Some(caller_id.as_str()) {
            return Err(SessionError::NotParticipant.into());
        }

        check_download(&message, caller, premium, now)?;

        let n = conn.execute(
            "UPDATE messages SET media_downloaded = 1
             WHERE id = ?1 AND media_downloaded = 0",
            rusqlite::params![message_id.to_string()],
        )?;
        if n == 0 {
            return Err(tandem_core::MediaError::AlreadyDownloaded.into());
        }
        message.media_downloaded = true;
        Ok(message)
    }
}

const MESSAGE_COLUMNS: &str = "id, session_code, sender_id, sender_gender, kind, content, \
     media_url, media_thumbnail_url, media_expires_at, media_downloaded, is_read, created_at";

type RawMessage = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    bool,
    String,
);

fn raw_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn message_from_raw(raw: RawMessage) -> Result<Message> {
    let (
        id,
        session_code,
        sender_id,
        sender_gender,
        kind,
        content,
        media_url,
        media_thumbnail_url,
        media_expires_at,
        media_downloaded,
        read,
        created_at,
    ) = raw;
    Ok(Message {
        id: id.parse().map_err(|e| anyhow!("corrupt message id '{}': {}", id, e))?,
        session_code,
        sender_id: sender_id
            .parse()
            .map_err(|e| anyhow!("corrupt sender id '{}': {}", sender_id, e))?,
        sender_gender: Gender::parse(&sender_gender)
            .ok_or_else(|| anyhow!("corrupt sender gender '{}'", sender_gender))?,
        kind: MediaKind::parse(&kind).ok_or_else(|| anyhow!("corrupt message kind '{}'", kind))?,
        content,
        media_url,
        media_thumbnail_url,
        media_expires_at: media_expires_at.as_deref().map(parse_ts).transpose()?,
        media_downloaded,
        read,
        created_at: parse_ts(&created_at)?,
    })
}

fn query_message(conn: &Connection, id: Uuid) -> Result<Option<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
    ))?;
    let raw = stmt
        .query_row([id.to_string()], raw_message)
        .optional()?;
    raw.map(message_from_raw).transpose()
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password, premium, created_at FROM users WHERE {column} = ?1"
    ))?;
    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                premium: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}
