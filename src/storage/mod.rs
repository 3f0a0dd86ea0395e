//! Persistence of the subscription set.
//!
//! The manager hands a [`Snapshot`] to a [`Storage`] backend after every
//! mutating operation and reads one back at startup. Backends only ever see
//! serialized state.

mod file;
mod memory;
mod object;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use object::ObjectStorage;

use crate::config::{StorageBackend, StorageConfig};
use crate::subscription::Subscription;

#[derive(Debug, Error)]
pub enum StorageError {
    /// No state has been saved yet
    #[error("no saved state found")]
    NotFound,

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state could not be (de)serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("object storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("object storage returned HTTP {0}")]
    HttpStatus(u16),

    #[error("storage is misconfigured: {0}")]
    Misconfigured(String),
}

/// Serializable state of a feed manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Subscriptions in registration order.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub last_fetched: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<Vec<u8>, StorageError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, StorageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A place to keep the latest snapshot.
///
/// `save` replaces the stored snapshot as a whole; a reader never observes
/// a partially written one.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError>;

    /// Returns [`StorageError::NotFound`] when nothing has been saved.
    async fn load(&self) -> Result<Snapshot, StorageError>;
}

/// Builds the backend selected by the `[storage]` configuration table.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    match config.backend {
        StorageBackend::File => Ok(Arc::new(FileStorage::new(&config.path))),
        StorageBackend::Object => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                StorageError::Misconfigured("object backend requires `endpoint`".to_owned())
            })?;
            let storage = ObjectStorage::new(endpoint, &config.key)?;
            Ok(Arc::new(match &config.token {
                Some(token) => {
                    storage.with_token(SecretString::from(token.expose_secret().to_owned()))
                }
                None => storage,
            }))
        }
    }
}
