//! Data models for stored content

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Content type recorded when the client did not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Encoding label that is reversed on retrieval
pub const GZIP_ENCODING: &str = "gzip";

/// A new record handed to the store on ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    pub key: String,
    pub content: Bytes,
    pub content_type: String,
    /// Empty when the content is stored as-is
    pub content_encoding: String,
    pub user_agent: String,
    /// `None` when the client address could not be determined
    pub ip_address: Option<String>,
}

/// The fields of a record the retrieval path needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub content: Bytes,
    pub content_type: String,
    pub content_encoding: String,
}

impl StoredContent {
    /// Content type to serve, falling back to `text/plain` for empty values
    pub fn effective_content_type(&self) -> &str {
        if self.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }

    /// Encoding header to echo, if one was declared at write time
    pub fn declared_encoding(&self) -> Option<&str> {
        if self.content_encoding.is_empty() {
            None
        } else {
            Some(&self.content_encoding)
        }
    }
}

impl From<&NewContent> for StoredContent {
    fn from(record: &NewContent) -> Self {
        Self {
            content: record.content.clone(),
            content_type: record.content_type.clone(),
            content_encoding: record.content_encoding.clone(),
        }
    }
}

/// JSON body returned after a successful POST
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub key: String,
}

/// JSON body returned when a request is rate limited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitedResponse {
    pub error: bool,
    pub message: String,
}
