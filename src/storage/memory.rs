use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Snapshot, Storage, StorageError};

/// In-process storage; holds the serialized snapshot so loads exercise the
/// same JSON path as the durable backends.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<Option<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes currently stored, if anything was saved.
    pub async fn stored_len(&self) -> Option<usize> {
        self.data.lock().await.as_ref().map(Vec::len)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let bytes = snapshot.to_json()?;
        *self.data.lock().await = Some(bytes);
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, StorageError> {
        match self.data.lock().await.as_deref() {
            Some(bytes) => Snapshot::from_json(bytes),
            None => Err(StorageError::NotFound),
        }
    }
}
