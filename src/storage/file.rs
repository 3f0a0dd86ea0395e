use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{Snapshot, Storage, StorageError};

/// Keeps the snapshot as a JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Storage for FileStorage {
    /// Write-to-temp-then-rename, so a crash mid-save leaves the previous
    /// snapshot intact.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let bytes = snapshot.to_json()?;

        // Unpredictable temp name; create_new refuses to follow a planted file
        let suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self.path.with_extension(format!("tmp.{suffix:016x}"));

        let mut temp_file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;

        let written = async {
            temp_file.write_all(&bytes).await?;
            temp_file.sync_all().await
        }
        .await;
        drop(temp_file);
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(
            path = %self.path.display(),
            subscriptions = snapshot.subscriptions.len(),
            "Saved state"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };
        Snapshot::from_json(&bytes)
    }
}
