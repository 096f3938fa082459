use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use tandem_db::Database;

use crate::storage::Storage;

/// Background task that prunes expired media bytes.
///
/// The authoritative expiry decision is the message record's absolute
/// `media_expires_at`; this loop only makes the bytes physically
/// unrecoverable afterwards. Orphan files whose message row is gone are
/// pruned too.
pub async fn run_cleanup_loop(db: Arc<Database>, storage: Arc<Storage>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match cleanup_expired(&db, &storage).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired media files", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

pub async fn cleanup_expired(db: &Database, storage: &Storage) -> anyhow::Result<usize> {
    let now = Utc::now();
    let mut pruned = 0;

    for id in storage.list().await? {
        // Single indexed lookup per file; this is a background task, so
        // the brief blocking read is acceptable.
        let message = db.get_message(id)?;

        let expired = match message {
            Some(msg) => msg
                .media_expires_at
                .map(|deadline| now >= deadline)
                .unwrap_or(true),
            // No row for this file: orphan, prune it.
            None => true,
        };

        if expired {
            storage.delete(id).await?;
            pruned += 1;
        }
    }

    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tandem_core::media::expiry_for;
    use tandem_core::session::test_support::two_player_session;
    use tandem_types::models::{MediaKind, Message};
    use uuid::Uuid;

    fn media_message(code: &str, sender: Uuid, expired: bool) -> Message {
        let created = if expired {
            Utc::now() - ChronoDuration::seconds(tandem_core::media::MEDIA_TTL_SECS + 5)
        } else {
            Utc::now()
        };
        Message {
            id: Uuid::new_v4(),
            session_code: code.into(),
            sender_id: sender,
            sender_gender: tandem_types::models::Gender::Female,
            kind: MediaKind::Photo,
            content: None,
            media_url: Some(format!("/sessions/{code}/media/x")),
            media_thumbnail_url: None,
            media_expires_at: Some(expiry_for(created)),
            media_downloaded: false,
            read: false,
            created_at: created,
        }
    }

    #[tokio::test]
    async fn prunes_expired_and_orphaned_files_only() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();

        let mut session = two_player_session(2);
        session.code = "CLEAN1".into();
        db.create_user(&session.creator_id.to_string(), "creator", "hash")
            .unwrap();
        db.create_user(&session.partner_id.unwrap().to_string(), "partner", "hash")
            .unwrap();
        db.insert_session(&session).unwrap();

        let live = media_message("CLEAN1", session.creator_id, false);
        let dead = media_message("CLEAN1", session.creator_id, true);
        db.insert_message(&live).unwrap();
        db.insert_message(&dead).unwrap();

        storage.save(live.id, b"live").await.unwrap();
        storage.save(dead.id, b"dead").await.unwrap();
        let orphan = Uuid::new_v4();
        storage.save(orphan, b"orphan").await.unwrap();

        let pruned = cleanup_expired(&db, &storage).await.unwrap();
        assert_eq!(pruned, 2);

        assert!(storage.read(live.id).await.unwrap().is_some());
        assert!(storage.read(dead.id).await.unwrap().is_none());
        assert!(storage.read(orphan).await.unwrap().is_none());

        // A second pass finds nothing left to prune.
        assert_eq!(cleanup_expired(&db, &storage).await.unwrap(), 0);
    }
}
