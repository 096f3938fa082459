use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                premium     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE sessions (
                code                    TEXT PRIMARY KEY,
                creator_id              TEXT NOT NULL REFERENCES users(id),
                partner_id              TEXT REFERENCES users(id),
                creator_gender          TEXT NOT NULL,
                partner_gender          TEXT,
                status                  TEXT NOT NULL DEFAULT 'waiting',
                current_index           INTEGER NOT NULL DEFAULT 0,
                creator_changes_used    INTEGER NOT NULL DEFAULT 0,
                partner_changes_used    INTEGER NOT NULL DEFAULT 0,
                creator_bonus_changes   INTEGER NOT NULL DEFAULT 0,
                partner_bonus_changes   INTEGER NOT NULL DEFAULT 0,
                pending_requested_by    TEXT,
                pending_requested_at    TEXT,
                version                 INTEGER NOT NULL DEFAULT 0,
                created_at              TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE challenges (
                session_code        TEXT NOT NULL REFERENCES sessions(code) ON DELETE CASCADE,
                position            INTEGER NOT NULL,
                text                TEXT NOT NULL,
                level               INTEGER NOT NULL,
                kind                TEXT NOT NULL,
                for_gender          TEXT NOT NULL,
                for_player          TEXT NOT NULL,
                completed           INTEGER NOT NULL DEFAULT 0,
                completed_by        TEXT,
                completed_at        TEXT,
                created_by_partner  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (session_code, position)
            );

            CREATE TABLE messages (
                id                   TEXT PRIMARY KEY,
                session_code         TEXT NOT NULL REFERENCES sessions(code),
                sender_id            TEXT NOT NULL REFERENCES users(id),
                sender_gender        TEXT NOT NULL,
                kind                 TEXT NOT NULL,
                content              TEXT,
                media_url            TEXT,
                media_thumbnail_url  TEXT,
                media_expires_at     TEXT,
                media_downloaded     INTEGER NOT NULL DEFAULT 0,
                is_read              INTEGER NOT NULL DEFAULT 0,
                created_at           TEXT NOT NULL
            );

            CREATE INDEX idx_messages_session
                ON messages(session_code, created_at);

            CREATE TABLE catalog (
                id          INTEGER PRIMARY KEY,
                text        TEXT NOT NULL,
                level       INTEGER NOT NULL,
                kind        TEXT NOT NULL,
                for_gender  TEXT NOT NULL,
                UNIQUE(text, for_gender)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        seed_catalog(conn)?;
    }

    info!("Database migrations complete");
    Ok(())
}

/// Starter challenge deck. Real deployments replace this with their own
/// catalog; the selector only cares about (level, kind, gender).
fn seed_catalog(conn: &Connection) -> Result<()> {
    let entries: &[(&str, u8, &str, &str)] = &[
        ("Tell your partner three things you noticed about them today", 1, "text", "female"),
        ("Describe your favorite shared memory in one message", 1, "text", "female"),
        ("Send a photo of something that reminds you of your partner", 1, "photo", "female"),
        ("Hum the chorus of the first song you danced to together", 1, "audio", "female"),
        ("Tell your partner three things you noticed about them today", 1, "text", "male"),
        ("Write the story of how you met, in exactly five sentences", 1, "text", "male"),
        ("Send a photo of the view from where you are right now", 1, "photo", "male"),
        ("Record yourself saying good morning in three languages", 1, "audio", "male"),
        ("Share something you have never told your partner before", 2, "text", "female"),
        ("Send a photo recreating your partner's most typical pose", 2, "photo", "female"),
        ("Record a voice note imitating how your partner answers the phone", 2, "audio", "female"),
        ("Share something you have never told your partner before", 2, "text", "male"),
        ("Send a photo recreating your partner's most typical pose", 2, "photo", "male"),
        ("Film a ten second tour of wherever you are right now", 2, "video", "male"),
        ("Describe the moment you knew this relationship was serious", 3, "text", "female"),
        ("Send a photo of yourself wearing your partner's favorite color", 3, "photo", "female"),
        ("Record yourself reading your last text thread in a dramatic voice", 3, "audio", "female"),
        ("Describe the moment you knew this relationship was serious", 3, "text", "male"),
        ("Send a photo of yourself wearing your partner's favorite color", 3, "photo", "male"),
        ("Film yourself doing your best slow-motion hair flip", 3, "video", "male"),
        ("Write your partner a dare of your own invention", 4, "text", "female"),
        ("Film a dramatic reenactment of your first meeting, solo", 4, "video", "female"),
        ("Write your partner a dare of your own invention", 4, "text", "male"),
        ("Film a dramatic reenactment of your first meeting, solo", 4, "video", "male"),
    ];

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO catalog (text, level, kind, for_gender) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (text, level, kind, gender) in entries {
        stmt.execute(rusqlite::params![text, level, kind, gender])?;
    }
    Ok(())
}
