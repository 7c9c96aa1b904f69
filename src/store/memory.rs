//! In-memory content store

use super::ContentStore;
use crate::error::{PasteError, Result};
use crate::models::{NewContent, StoredContent};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Map-backed store with the same unique-key contract as the SQL store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, NewContent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Full record including audit metadata
    pub async fn record(&self, key: &str) -> Option<NewContent> {
        self.records.read().await.get(key).cloned()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert(&self, record: &NewContent) -> Result<()> {
        let mut records = self.records.write().await;
        match records.entry(record.key.clone()) {
            Entry::Occupied(_) => Err(PasteError::KeyCollision(record.key.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn lookup(&self, key: &str) -> Result<Option<StoredContent>> {
        Ok(self.records.read().await.get(key).map(StoredContent::from))
    }
}
