//! Retrieval pipeline (GET)

use crate::encoding::decode_for_delivery;
use crate::error::{PasteError, Result};
use crate::store::ContentStore;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error};

/// Everything needed to answer a successful GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Value for the `Content-Type` response header
    pub content_type: String,
    /// Value for the `Content-Encoding` response header, if one was stored
    pub content_encoding: Option<String>,
    /// Bytes to send, already gunzipped when the stored encoding is `gzip`
    pub body: Bytes,
}

/// Looks up stored content and prepares it for delivery
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn ContentStore>,
    decompression_limit: Option<u64>,
}

impl Retriever {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            decompression_limit: None,
        }
    }

    /// Fail gzip deliveries that would expand past `limit` bytes
    pub fn with_decompression_limit(mut self, limit: Option<u64>) -> Self {
        self.decompression_limit = limit;
        self
    }

    /// Fetch the content stored under `key`
    ///
    /// The stored encoding label is echoed even when the bytes are decoded
    /// here, and labels other than `gzip` are echoed with the bytes unchanged.
    ///
    /// # Returns
    /// * `Err(PasteError::NotFound)` if no record exists
    /// * `Err(PasteError::Decompression)` if stored gzip content is corrupt
    ///   or expands past the decompression limit
    pub async fn retrieve(&self, key: &str) -> Result<Delivery> {
        let stored = self
            .store
            .lookup(key)
            .await
            .map_err(|e| {
                error!("Lookup of {} failed: {}", key, e);
                e
            })?
            .ok_or_else(|| PasteError::NotFound(key.to_string()))?;

        let content_type = stored.effective_content_type().to_string();
        let content_encoding = stored.declared_encoding().map(str::to_string);
        debug!(
            "Serving {} ({} stored bytes, type={}, encoding={:?})",
            key,
            stored.content.len(),
            content_type,
            content_encoding
        );

        let body = decode_for_delivery(&stored.content_encoding, stored.content, self.decompression_limit)
            .await
            .map_err(|e| {
                error!("Error decompressing content for {}: {}", key, e);
                e
            })?;

        Ok(Delivery {
            content_type,
            content_encoding,
            body,
        })
    }
}
