//! Ingestion pipeline (POST)
//!
//! Takes the raw body plus the client-declared metadata, assigns a fresh key
//! and stores everything verbatim. The body is never parsed, validated against
//! its declared encoding, or re-encoded.

use crate::error::Result;
use crate::key::generate_key;
use crate::models::{NewContent, DEFAULT_CONTENT_TYPE};
use crate::store::ContentStore;
use bytes::Bytes;
use http::header::{HeaderName, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use http::HeaderMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Metadata captured from a POST request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestMetadata {
    pub content_type: String,
    pub content_encoding: String,
    pub user_agent: String,
    pub client_ip: Option<IpAddr>,
}

impl IngestMetadata {
    /// Capture metadata from request headers
    ///
    /// Missing or non-UTF-8 headers fall back to their defaults: `text/plain`
    /// for the content type, empty strings otherwise.
    pub fn from_headers(headers: &HeaderMap, client_ip: Option<IpAddr>) -> Self {
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            content_type: header(CONTENT_TYPE).unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            content_encoding: header(CONTENT_ENCODING).unwrap_or_default(),
            user_agent: header(USER_AGENT).unwrap_or_default(),
            client_ip,
        }
    }
}

/// Stores incoming content under newly generated keys
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn ContentStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Store `body` and return its key
    ///
    /// A key collision is not retried; it fails like any other store error.
    pub async fn ingest(&self, body: Bytes, meta: IngestMetadata) -> Result<String> {
        let key = generate_key();
        let size = body.len();
        let record = NewContent {
            key: key.clone(),
            content: body,
            content_type: meta.content_type,
            content_encoding: meta.content_encoding,
            user_agent: meta.user_agent,
            ip_address: meta.client_ip.map(|ip| ip.to_string()),
        };

        if let Err(e) = self.store.insert(&record).await {
            error!("Failed to store content under {}: {}", key, e);
            return Err(e);
        }

        info!(
            "Stored {} ({} bytes, type={}, encoding={:?})",
            key, size, record.content_type, record.content_encoding
        );
        Ok(key)
    }
}
