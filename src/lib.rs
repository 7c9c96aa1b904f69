//! Pastebin
//!
//! A minimal anonymous content store. Clients POST arbitrary bytes and get back
//! a short opaque key; GET on that key returns the original bytes with the
//! content type (and encoding) they were stored with.
//!
//! # Overview
//!
//! Every request passes an admission gate first: per-client rate limiting
//! (separate buckets for POST and GET) and a ceiling on the declared body
//! size. POST bodies are stored verbatim under a random 8-character key. On
//! GET, content stored with `Content-Encoding: gzip` is decompressed before it
//! is sent.
//!
//! # Architecture
//!
//! - [`AdmissionController`]: rate limit and body size gate
//! - [`RateLimiter`]: keyed limiter collaborator, [`FixedWindowLimiter`] in process
//! - [`ContentStore`]: insert/lookup adapter, backed by [`SqliteStore`] or [`MemoryStore`]
//! - [`Ingestor`]: the POST pipeline
//! - [`Retriever`]: the GET pipeline
//! - [`PasteService`]: HTTP routing over the pieces above
//! - [`PasteServer`]: hyper accept loop
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pastebin::{PasteConfig, PasteMetrics, PasteServer, PasteService, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PasteConfig::default();
//! let metrics = Arc::new(PasteMetrics::new()?);
//! let service = PasteService::new(&config, Arc::new(MemoryStore::new()), metrics)?;
//!
//! PasteServer::new(service)
//!     .run(config.listen_address.parse()?)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```yaml
//! listen_address: "0.0.0.0:8787"
//! max_body_size: 15728640
//! post_rate_limit:
//!   limit: 10
//!   period_secs: 60
//! get_rate_limit:
//!   limit: 100
//!   period_secs: 60
//! storage:
//!   backend: sqlite
//!   path: pastebin.db
//! ```
//!
//! See [`PasteConfig`] for every option and the environment overrides.

pub mod admission;
pub mod config;
pub mod encoding;
pub mod error;
pub mod ingest;
pub mod key;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod rate_limit;
pub mod retrieve;
pub mod server;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use admission::AdmissionController;
pub use config::{PasteConfig, RateLimitPolicy, StorageBackend};
pub use error::{PasteError, Result};
pub use ingest::{IngestMetadata, Ingestor};
pub use key::{generate_key, is_valid_key};
pub use metrics::PasteMetrics;
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{NewContent, StoredContent};
pub use rate_limit::{FixedWindowLimiter, RateDecision, RateLimiter};
pub use retrieve::{Delivery, Retriever};
pub use server::PasteServer;
pub use service::PasteService;
pub use store::{open_store, ContentStore, MemoryStore, SqliteStore};
