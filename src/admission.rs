//! Admission control applied before any handler runs
//!
//! Two gates, in order:
//! 1. Rate limiting. POST and GET each have their own limiter, keyed by
//!    client address. Clients without a known address share the `unknown`
//!    bucket. Other methods are not rate limited.
//! 2. Body size. The declared `Content-Length` is compared against the
//!    configured ceiling; the bytes actually sent are not counted here.

use crate::config::PasteConfig;
use crate::error::{PasteError, Result};
use crate::rate_limit::{FixedWindowLimiter, RateLimiter};
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Bucket key used when the client address cannot be determined
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limit key for a client
pub fn client_key(client_ip: Option<IpAddr>) -> String {
    match client_ip {
        Some(ip) => ip.to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

/// Parse the declared body length
///
/// Reads the leading decimal digits after optional whitespace and a `+`
/// sign, ignoring anything that follows (`"20000000abc"` declares
/// 20000000). Lengths too large for a `u64` saturate. Returns `None` for a
/// missing, negative or non-numeric header; such requests are not subject
/// to the size check.
pub fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim_start();
    let value = value.strip_prefix('+').unwrap_or(value);
    let digits = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);
    if digits.is_empty() {
        return None;
    }
    Some(digits.parse::<u64>().unwrap_or(u64::MAX))
}

/// Per-request gate combining rate limiting and body size limiting
#[derive(Clone)]
pub struct AdmissionController {
    post_limiter: Arc<dyn RateLimiter>,
    get_limiter: Arc<dyn RateLimiter>,
    max_body_size: u64,
}

impl AdmissionController {
    pub fn new(
        post_limiter: Arc<dyn RateLimiter>,
        get_limiter: Arc<dyn RateLimiter>,
        max_body_size: u64,
    ) -> Self {
        Self {
            post_limiter,
            get_limiter,
            max_body_size,
        }
    }

    /// Build a controller with in-process limiters from configuration
    pub fn from_config(config: &PasteConfig) -> Self {
        Self::new(
            Arc::new(FixedWindowLimiter::from_policy(&config.post_rate_limit)),
            Arc::new(FixedWindowLimiter::from_policy(&config.get_rate_limit)),
            config.max_body_size,
        )
    }

    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    fn limiter_for(&self, method: &Method) -> Option<&Arc<dyn RateLimiter>> {
        if method == Method::POST {
            Some(&self.post_limiter)
        } else if method == Method::GET {
            Some(&self.get_limiter)
        } else {
            None
        }
    }

    /// Decide whether a request may proceed
    ///
    /// # Returns
    /// * `Ok(())` if the request is admitted
    /// * `Err(PasteError::RateLimited)` if the client's bucket is exhausted
    /// * `Err(PasteError::PayloadTooLarge)` if the declared length is over the ceiling
    /// * `Err(PasteError::RateLimiter)` if the limiter itself failed
    pub async fn admit(
        &self,
        method: &Method,
        client_ip: Option<IpAddr>,
        headers: &HeaderMap,
    ) -> Result<()> {
        if let Some(limiter) = self.limiter_for(method) {
            let key = client_key(client_ip);
            let decision = limiter.limit(&key).await.map_err(|e| {
                error!("Rate limiter failed for {} {}: {}", method, key, e);
                e
            })?;

            if !decision.allowed {
                warn!("Rate limited {} request from {}", method, key);
                return Err(PasteError::RateLimited {
                    method: method.to_string(),
                    client: key,
                });
            }
            debug!("Admitted {} from {} ({} remaining)", method, key, decision.remaining);
        }

        if let Some(declared) = declared_content_length(headers) {
            if declared > self.max_body_size {
                warn!(
                    "Rejected {} with declared length {} (limit {})",
                    method, declared, self.max_body_size
                );
                return Err(PasteError::PayloadTooLarge {
                    declared,
                    limit: self.max_body_size,
                });
            }
        }

        Ok(())
    }
}
