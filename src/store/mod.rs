//! Content store adapter
//!
//! The pipelines reach persistence only through [`ContentStore`]: one insert
//! and one lookup, each a single request to the backing store. No caching and
//! no retries happen at this layer.

pub mod memory;
pub mod sqlite;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::models::{NewContent, StoredContent};
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new record.
    ///
    /// Never overwrites: an existing key yields `Err(PasteError::KeyCollision)`.
    async fn insert(&self, record: &NewContent) -> Result<()>;

    /// Fetch the retrieval fields of the record stored under `key`.
    /// Returns `None` if no such record exists.
    async fn lookup(&self, key: &str) -> Result<Option<StoredContent>>;
}

/// Open the store described by the configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ContentStore>> {
    match config.backend {
        StorageBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&config.path).await?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
