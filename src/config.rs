//! Configuration management for the pastebin service

use crate::error::{PasteError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for the pastebin service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PasteConfig {
    /// Address the HTTP service listens on (default: 0.0.0.0:8787)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Largest declared request body accepted, in bytes (default: 15MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,

    /// Also cap the bytes actually read from the body at `max_body_size`
    /// (default: false, only the declared Content-Length is checked)
    #[serde(default)]
    pub strict_body_limit: bool,

    /// Largest size gzip content may expand to when served (default: no
    /// limit). Deliveries over it fail with "Error decompressing content".
    #[serde(default)]
    pub max_decompressed_size: Option<u64>,

    /// Rate limit applied to POST requests per client address
    #[serde(default = "default_post_rate_limit")]
    pub post_rate_limit: RateLimitPolicy,

    /// Rate limit applied to GET requests per client address
    #[serde(default = "default_get_rate_limit")]
    pub get_rate_limit: RateLimitPolicy,

    /// Header carrying the client address when running behind a proxy
    /// (e.g. "cf-connecting-ip"). When unset the TCP peer address is used.
    #[serde(default)]
    pub client_ip_header: Option<String>,

    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// A fixed-window rate limit: `limit` requests every `period_secs` seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub period_secs: u64,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, period_secs: u64) -> Self {
        Self { limit, period_secs }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Parse a policy written as `LIMIT/PERIOD_SECS`, e.g. `10/60`
    pub fn parse(value: &str) -> Result<Self> {
        let (limit, period) = value.trim().split_once('/').ok_or_else(|| {
            PasteError::ConfigError(format!(
                "rate limit must be written as LIMIT/PERIOD_SECS, got '{}'",
                value
            ))
        })?;

        let limit = limit.trim().parse::<u32>().map_err(|e| {
            PasteError::ConfigError(format!("invalid rate limit '{}': {}", limit, e))
        })?;
        let period_secs = period.trim().parse::<u64>().map_err(|e| {
            PasteError::ConfigError(format!("invalid rate limit period '{}': {}", period, e))
        })?;

        Ok(Self { limit, period_secs })
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.limit == 0 {
            return Err(PasteError::ConfigError(format!(
                "{}.limit must be greater than 0",
                name
            )));
        }
        if self.period_secs == 0 {
            return Err(PasteError::ConfigError(format!(
                "{}.period_secs must be greater than 0",
                name
            )));
        }
        Ok(())
    }
}

/// Which store implementation backs the service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SQLite database file
    Sqlite,
    /// Process-local map, lost on restart
    Memory,
}

/// Configuration for the content store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Backend type (default: sqlite)
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Path of the SQLite database (default: pastebin.db)
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_database_path(),
        }
    }
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_max_body_size() -> u64 {
    15 * 1024 * 1024 // 15MB
}

fn default_post_rate_limit() -> RateLimitPolicy {
    RateLimitPolicy::new(10, 60)
}

fn default_get_rate_limit() -> RateLimitPolicy {
    RateLimitPolicy::new(100, 60)
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_database_path() -> String {
    "pastebin.db".to_string()
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for PasteConfig {
    fn default() -> Self {
        PasteConfig {
            listen_address: default_listen_address(),
            max_body_size: default_max_body_size(),
            strict_body_limit: false,
            max_decompressed_size: None,
            post_rate_limit: default_post_rate_limit(),
            get_rate_limit: default_get_rate_limit(),
            client_ip_header: None,
            storage: StorageConfig::default(),
            metrics_endpoint: None,
        }
    }
}

impl PasteConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    ///
    /// # Returns
    /// * `Ok(PasteConfig)` if loading and validation succeed
    /// * `Err(PasteError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PasteError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let mut config: PasteConfig = serde_yaml::from_str(&content).map_err(|e| {
            PasteError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults and environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = PasteConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    ///
    /// Recognized variables: `MAX_BODY_SIZE`, `MAX_DECOMPRESSED_SIZE`,
    /// `POST_RATE_LIMIT`, `GET_RATE_LIMIT`, `LISTEN_ADDRESS`, `DATABASE_PATH`,
    /// `CLIENT_IP_HEADER`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MAX_BODY_SIZE") {
            self.max_body_size = value.trim().parse().map_err(|e| {
                PasteError::ConfigError(format!("invalid MAX_BODY_SIZE '{}': {}", value, e))
            })?;
        }
        if let Some(value) = lookup("MAX_DECOMPRESSED_SIZE") {
            self.max_decompressed_size = if value.trim().is_empty() {
                None
            } else {
                Some(value.trim().parse().map_err(|e| {
                    PasteError::ConfigError(format!(
                        "invalid MAX_DECOMPRESSED_SIZE '{}': {}",
                        value, e
                    ))
                })?)
            };
        }
        if let Some(value) = lookup("POST_RATE_LIMIT") {
            self.post_rate_limit = RateLimitPolicy::parse(&value)?;
        }
        if let Some(value) = lookup("GET_RATE_LIMIT") {
            self.get_rate_limit = RateLimitPolicy::parse(&value)?;
        }
        if let Some(value) = lookup("LISTEN_ADDRESS") {
            self.listen_address = value;
        }
        if let Some(value) = lookup("DATABASE_PATH") {
            self.storage.path = value;
        }
        if let Some(value) = lookup("CLIENT_IP_HEADER") {
            self.client_ip_header = if value.is_empty() { None } else { Some(value) };
        }
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - max_body_size must be > 0
    /// - max_decompressed_size, when set, must be > 0
    /// - both rate limit policies must have a non-zero limit and period
    /// - listen_address (and metrics address when enabled) must be socket addresses
    /// - sqlite storage needs a non-empty path
    pub fn validate(&self) -> Result<()> {
        if self.max_body_size == 0 {
            return Err(PasteError::ConfigError(
                "max_body_size must be greater than 0".to_string(),
            ));
        }

        if self.max_decompressed_size == Some(0) {
            return Err(PasteError::ConfigError(
                "max_decompressed_size must be greater than 0 when set".to_string(),
            ));
        }

        self.post_rate_limit.validate("post_rate_limit")?;
        self.get_rate_limit.validate("get_rate_limit")?;

        self.listen_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                PasteError::ConfigError(format!(
                    "invalid listen_address '{}': {}",
                    self.listen_address, e
                ))
            })?;

        if let Some(metrics) = &self.metrics_endpoint {
            if metrics.enabled {
                metrics.address.parse::<std::net::SocketAddr>().map_err(|e| {
                    PasteError::ConfigError(format!(
                        "invalid metrics_endpoint.address '{}': {}",
                        metrics.address, e
                    ))
                })?;
            }
        }

        if self.storage.backend == StorageBackend::Sqlite && self.storage.path.is_empty() {
            return Err(PasteError::ConfigError(
                "storage.path must not be empty for the sqlite backend".to_string(),
            ));
        }

        Ok(())
    }
}
