//! Prometheus metrics for the pastebin service

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics for admission, ingestion and retrieval
///
/// Registered on a private registry so several instances can coexist (tests
/// build one per service).
#[derive(Clone)]
pub struct PasteMetrics {
    registry: Registry,

    /// Responses by method and status code
    pub requests_total: IntCounterVec,

    /// Requests refused by the rate limiter, by method
    pub rate_limited_total: IntCounterVec,

    /// Requests refused for their declared size
    pub payload_too_large_total: IntCounter,

    /// Records successfully stored
    pub pastes_created_total: IntCounter,

    /// Bytes of content successfully stored
    pub bytes_stored_total: IntCounter,

    /// Records successfully served
    pub pastes_served_total: IntCounter,

    /// Stored gzip content that failed to decompress
    pub decompression_failures_total: IntCounter,

    /// Store failures by operation (insert, lookup)
    pub storage_errors_total: IntCounterVec,

    /// Request handling time by method
    pub request_duration_seconds: HistogramVec,
}

impl PasteMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("pastebin_requests_total", "Total number of HTTP requests handled"),
            &["method", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let rate_limited_total = IntCounterVec::new(
            Opts::new("pastebin_rate_limited_total", "Requests rejected by the rate limiter"),
            &["method"],
        )?;
        registry.register(Box::new(rate_limited_total.clone()))?;

        let payload_too_large_total = IntCounter::new(
            "pastebin_payload_too_large_total",
            "Requests rejected for exceeding the body size limit",
        )?;
        registry.register(Box::new(payload_too_large_total.clone()))?;

        let pastes_created_total =
            IntCounter::new("pastebin_pastes_created_total", "Content records created")?;
        registry.register(Box::new(pastes_created_total.clone()))?;

        let bytes_stored_total =
            IntCounter::new("pastebin_bytes_stored_total", "Bytes of content stored")?;
        registry.register(Box::new(bytes_stored_total.clone()))?;

        let pastes_served_total =
            IntCounter::new("pastebin_pastes_served_total", "Content records served")?;
        registry.register(Box::new(pastes_served_total.clone()))?;

        let decompression_failures_total = IntCounter::new(
            "pastebin_decompression_failures_total",
            "Stored gzip content that could not be decompressed",
        )?;
        registry.register(Box::new(decompression_failures_total.clone()))?;

        let storage_errors_total = IntCounterVec::new(
            Opts::new("pastebin_storage_errors_total", "Content store failures"),
            &["operation"],
        )?;
        registry.register(Box::new(storage_errors_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pastebin_request_duration_seconds",
                "Duration of request handling in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["method"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            rate_limited_total,
            payload_too_large_total,
            pastes_created_total,
            bytes_stored_total,
            pastes_served_total,
            decompression_failures_total,
            storage_errors_total,
            request_duration_seconds,
        })
    }

    pub fn record_response(&self, method: &str, status: u16, duration_secs: f64) {
        self.requests_total
            .with_label_values(&[method, &status.to_string()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    pub fn record_rate_limited(&self, method: &str) {
        self.rate_limited_total.with_label_values(&[method]).inc();
    }

    pub fn record_payload_too_large(&self) {
        self.payload_too_large_total.inc();
    }

    pub fn record_created(&self, bytes: usize) {
        self.pastes_created_total.inc();
        self.bytes_stored_total.inc_by(bytes as u64);
    }

    pub fn record_served(&self) {
        self.pastes_served_total.inc();
    }

    pub fn record_decompression_failure(&self) {
        self.decompression_failures_total.inc();
    }

    pub fn record_storage_error(&self, operation: &str) {
        self.storage_errors_total.with_label_values(&[operation]).inc();
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics are not UTF-8: {}", e)))
    }
}
