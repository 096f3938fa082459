use anyhow::{Result, anyhow};
use rusqlite::{Connection, TransactionBehavior};

use tandem_core::SessionError;
use tandem_types::models::{
    Challenge, Gender, MediaKind, PartnerChallengeRequest, Role, Session, SessionStatus,
};

use crate::{Database, OptionalExt, StoreError, parse_ts};

impl Database {
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        let mut conn = self
            .lock()
            .map_err(|e| anyhow!("{e}"))?;
        let tx = conn.transaction()?;
        write_session_row(&tx, session, None)?;
        write_challenges(&tx, session)?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_session(&self, code: &str) -> Result<Option<Session>> {
        self.with_conn(|conn| read_session(conn, code))
    }

    pub fn session_exists(&self, code: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE code = ?1",
                [code],
                |r| r.get(0),
            )?;
            Ok(n > 0)
        })
    }

    /// The store's transaction primitive: read the record, apply a pure
    /// transition, commit guarded on the version the read observed. Every
    /// commit bumps `version`, so a writer that lost a race can never
    /// overwrite the winner — the guard misses and the caller gets
    /// `StaleIndex` to re-read and retry.
    pub fn mutate_session<F>(&self, code: &str, f: F) -> Result<Session, StoreError>
    where
        F: FnOnce(&mut Session) -> Result<(), SessionError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut session = read_session(&tx, code)?.ok_or(SessionError::NotFound)?;
        let expected_version = session.version;

        f(&mut session)?;
        session.version = expected_version + 1;

        let updated = write_session_row(&tx, &session, Some(expected_version))?;
        if updated == 0 {
            return Err(SessionError::StaleIndex.into());
        }
        tx.execute("DELETE FROM challenges WHERE session_code = ?1", [code])?;
        write_challenges(&tx, &session)?;
        tx.commit()?;

        Ok(session)
    }
}

/// Insert or version-guarded update of the sessions row. Returns affected
/// row count (0 means the guard missed).
fn write_session_row(
    conn: &Connection,
    session: &Session,
    guard_version: Option<i64>,
) -> Result<usize> {
    let pending_by = session
        .pending_partner_challenge_request
        .as_ref()
        .map(|p| p.requested_by.as_str());
    let pending_at = session
        .pending_partner_challenge_request
        .as_ref()
        .map(|p| p.created_at.to_rfc3339());

    let n = match guard_version {
        None => conn.execute(
            "INSERT INTO sessions
                (code, creator_id, partner_id, creator_gender, partner_gender,
                 status, current_index, creator_changes_used, partner_changes_used,
                 creator_bonus_changes, partner_bonus_changes,
                 pending_requested_by, pending_requested_at, version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                session.code,
                session.creator_id.to_string(),
                session.partner_id.map(|id| id.to_string()),
                session.creator_gender.as_str(),
                session.partner_gender.map(Gender::as_str),
                session.status.as_str(),
                session.current_challenge_index as i64,
                session.creator_changes_used,
                session.partner_changes_used,
                session.creator_bonus_changes,
                session.partner_bonus_changes,
                pending_by,
                pending_at,
                session.version,
                session.created_at.to_rfc3339(),
            ],
        )?,
        Some(expected) => conn.execute(
            "UPDATE sessions SET
                partner_id = ?2, partner_gender = ?3, status = ?4,
                current_index = ?5, creator_changes_used = ?6,
                partner_changes_used = ?7, creator_bonus_changes = ?8,
                partner_bonus_changes = ?9, pending_requested_by = ?10,
                pending_requested_at = ?11, version = ?12
             WHERE code = ?1 AND version = ?13",
            rusqlite::params![
                session.code,
                session.partner_id.map(|id| id.to_string()),
                session.partner_gender.map(Gender::as_str),
                session.status.as_str(),
                session.current_challenge_index as i64,
                session.creator_changes_used,
                session.partner_changes_used,
                session.creator_bonus_changes,
                session.partner_bonus_changes,
                pending_by,
                pending_at,
                session.version,
                expected,
            ],
        )?,
    };
    Ok(n)
}

fn write_challenges(conn: &Connection, session: &Session) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO challenges
            (session_code, position, text, level, kind, for_gender, for_player,
             completed, completed_by, completed_at, created_by_partner)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for (position, ch) in session.challenges.iter().enumerate() {
        stmt.execute(rusqlite::params![
            session.code,
            position as i64,
            ch.text,
            ch.level,
            ch.kind.as_str(),
            ch.for_gender.as_str(),
            ch.for_player.as_str(),
            ch.completed,
            ch.completed_by.map(Role::as_str),
            ch.completed_at.map(|t| t.to_rfc3339()),
            ch.created_by_partner,
        ])?;
    }
    Ok(())
}

fn read_session(conn: &Connection, code: &str) -> Result<Option<Session>> {
    let mut stmt = conn.prepare(
        "SELECT code, creator_id, partner_id, creator_gender, partner_gender,
                status, current_index, creator_changes_used, partner_changes_used,
                creator_bonus_changes, partner_bonus_changes,
                pending_requested_by, pending_requested_at, version, created_at
         FROM sessions WHERE code = ?1",
    )?;

    type Raw = (
        String,
        String,
        Option<String>,
        String,
        Option<String>,
        String,
        i64,
        u32,
        u32,
        u32,
        u32,
        Option<String>,
        Option<String>,
        i64,
        String,
    );
    let raw: Option<Raw> = stmt
        .query_row([code], |row| {
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
                row.get(12)?,
                row.get(13)?,
                row.get(14)?,
            ))
        })
        .optional()?;
    let Some((
        code,
        creator_id,
        partner_id,
        creator_gender,
        partner_gender,
        status,
        current_index,
        creator_changes_used,
        partner_changes_used,
        creator_bonus_changes,
        partner_bonus_changes,
        pending_by,
        pending_at,
        version,
        created_at,
    )) = raw
    else {
        return Ok(None);
    };

    let pending = match (pending_by, pending_at) {
        (Some(by), Some(at)) => Some(PartnerChallengeRequest {
            requested_by: Role::parse(&by)
                .ok_or_else(|| anyhow!("corrupt pending role '{}'", by))?,
            created_at: parse_ts(&at)?,
        }),
        _ => None,
    };

    let challenges = read_challenges(conn, &code)?;
    Ok(Some(Session {
        creator_id: creator_id
            .parse()
            .map_err(|e| anyhow!("corrupt creator id '{}': {}", creator_id, e))?,
        partner_id: partner_id
            .map(|id| {
                id.parse()
                    .map_err(|e| anyhow!("corrupt partner id '{}': {}", id, e))
            })
            .transpose()?,
        creator_gender: Gender::parse(&creator_gender)
            .ok_or_else(|| anyhow!("corrupt gender '{}'", creator_gender))?,
        partner_gender: partner_gender
            .map(|g| Gender::parse(&g).ok_or_else(|| anyhow!("corrupt gender '{}'", g)))
            .transpose()?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| anyhow!("corrupt status '{}'", status))?,
        challenges,
        current_challenge_index: current_index as usize,
        creator_changes_used,
        partner_changes_used,
        creator_bonus_changes,
        partner_bonus_changes,
        pending_partner_challenge_request: pending,
        version,
        created_at: parse_ts(&created_at)?,
        code,
    }))
}

fn read_challenges(conn: &Connection, code: &str) -> Result<Vec<Challenge>> {
    let mut stmt = conn.prepare(
        "SELECT text, level, kind, for_gender, for_player,
                completed, completed_by, completed_at, created_by_partner
         FROM challenges WHERE session_code = ?1 ORDER BY position",
    )?;
    let raw = stmt
        .query_map([code], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, bool>(8)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(
            |(text, level, kind, for_gender, for_player, completed, by, at, created_by_partner)| {
                Ok(Challenge {
                    text,
                    level,
                    kind: MediaKind::parse(&kind)
                        .ok_or_else(|| anyhow!("corrupt challenge kind '{}'", kind))?,
                    for_gender: Gender::parse(&for_gender)
                        .ok_or_else(|| anyhow!("corrupt challenge gender '{}'", for_gender))?,
                    for_player: Role::parse(&for_player)
                        .ok_or_else(|| anyhow!("corrupt challenge role '{}'", for_player))?,
                    completed,
                    completed_by: by
                        .map(|b| {
                            Role::parse(&b).ok_or_else(|| anyhow!("corrupt role '{}'", b))
                        })
                        .transpose()?,
                    completed_at: at.as_deref().map(parse_ts).transpose()?,
                    created_by_partner,
                })
            },
        )
        .collect()
}
