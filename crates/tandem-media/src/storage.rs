use anyhow::Result;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk store for ephemeral media blobs.
///
/// Each attachment is one flat file at `{media_dir}/{message_id}`. Expiry
/// is decided by the message record, never by file metadata; once the
/// cleanup loop removes a file, the bytes are gone for good.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Path to the blob for a given message.
    pub fn file_path(&self, message_id: Uuid) -> PathBuf {
        self.dir.join(message_id.to_string())
    }

    /// Persist an uploaded blob.
    pub async fn save(&self, message_id: Uuid, bytes: &[u8]) -> Result<()> {
        let path = self.file_path(message_id);
        fs::write(&path, bytes).await?;
        Ok(())
    }

    /// Read a blob back, if its bytes still exist.
    pub async fn read(&self, message_id: Uuid) -> Result<Option<Vec<u8>>> {
        let path = self.file_path(message_id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob from disk. Already-gone files are fine.
    pub async fn delete(&self, message_id: Uuid) -> Result<()> {
        let path = self.file_path(message_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted media for message {}", message_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media for message {} already gone", message_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List message ids that still have bytes on disk.
    pub async fn list(&self) -> Result<Vec<Uuid>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_read_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();
        let id = Uuid::new_v4();

        storage.save(id, b"jpeg bytes").await.unwrap();
        assert_eq!(storage.read(id).await.unwrap().unwrap(), b"jpeg bytes");
        assert_eq!(storage.list().await.unwrap(), vec![id]);

        storage.delete(id).await.unwrap();
        assert!(storage.read(id).await.unwrap().is_none());

        // Deleting again is a no-op, not an error.
        storage.delete(id).await.unwrap();
    }
}
