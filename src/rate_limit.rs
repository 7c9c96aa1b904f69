//! Keyed rate limiting
//!
//! The admission path only talks to the [`RateLimiter`] trait. The bundled
//! [`FixedWindowLimiter`] keeps its buckets in process; a deployment can swap
//! in a limiter backed by an external service without touching admission.

use crate::config::RateLimitPolicy;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of consulting a limiter for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
}

/// A limiter that counts requests per key
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consume one unit from the bucket identified by `key`
    async fn limit(&self, key: &str) -> Result<RateDecision>;
}

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// In-process fixed-window limiter
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter {
    limit: u32,
    period: Duration,
    windows: Arc<DashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            limit,
            period,
            windows: Arc::new(DashMap::new()),
        }
    }

    pub fn from_policy(policy: &RateLimitPolicy) -> Self {
        Self::new(policy.limit, policy.period())
    }

    /// Count one request for `key` at `now`
    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started) >= self.period {
            window.count = 0;
            window.started = now;
        }

        if window.count >= self.limit {
            return RateDecision {
                allowed: false,
                remaining: 0,
            };
        }

        window.count += 1;
        RateDecision {
            allowed: true,
            remaining: self.limit - window.count,
        }
    }

    /// Drop windows that have fully expired, returning how many were removed
    ///
    /// Safe to run while requests are being counted; windows created during
    /// the sweep are either kept or counted as removed, never miscounted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        self.windows.retain(|_, window| {
            let live = now.saturating_duration_since(window.started) < self.period;
            if !live {
                purged += 1;
            }
            live
        });
        purged
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn limit(&self, key: &str) -> Result<RateDecision> {
        Ok(self.check_at(key, Instant::now()))
    }
}
