//! Pastebin server
//!
//! Loads configuration, sets up logging, opens the content store and serves
//! HTTP until interrupted.

use anyhow::Context;
use pastebin::{
    open_store, AdmissionController, FixedWindowLimiter, MetricsEndpoint, PasteConfig,
    PasteMetrics, PasteServer, PasteService,
};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// # Usage
/// ```bash
/// # Defaults plus environment overrides (MAX_BODY_SIZE, POST_RATE_LIMIT, ...)
/// pastebin
///
/// # YAML configuration file, environment still overrides it
/// pastebin /path/to/pastebin.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting pastebin server");

    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            PasteConfig::from_file(&path)
        }
        None => PasteConfig::from_env(),
    }
    .context("failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Max body size: {} bytes", config.max_body_size);
    info!("  - Max decompressed size: {:?}", config.max_decompressed_size);
    info!("  - Strict body limit: {}", config.strict_body_limit);
    info!(
        "  - POST rate limit: {} per {}s",
        config.post_rate_limit.limit, config.post_rate_limit.period_secs
    );
    info!(
        "  - GET rate limit: {} per {}s",
        config.get_rate_limit.limit, config.get_rate_limit.period_secs
    );
    info!("  - Client address header: {:?}", config.client_ip_header);
    info!("  - Storage: {:?} at {}", config.storage.backend, config.storage.path);

    let store = open_store(&config.storage)
        .await
        .context("failed to open content store")?;
    let metrics = Arc::new(PasteMetrics::new().context("failed to register metrics")?);

    if let Some(endpoint) = config.metrics_endpoint.as_ref().filter(|m| m.enabled) {
        let addr: SocketAddr = endpoint
            .address
            .parse()
            .context("invalid metrics endpoint address")?;
        let endpoint = MetricsEndpoint::new(Arc::clone(&metrics), addr);
        tokio::spawn(async move {
            if let Err(e) = endpoint.start().await {
                error!("Metrics endpoint stopped: {}", e);
            }
        });
    }

    let post_limiter = Arc::new(FixedWindowLimiter::from_policy(&config.post_rate_limit));
    let get_limiter = Arc::new(FixedWindowLimiter::from_policy(&config.get_rate_limit));
    let sweep_every = config
        .post_rate_limit
        .period()
        .max(config.get_rate_limit.period());
    spawn_window_sweeper(vec![post_limiter.clone(), get_limiter.clone()], sweep_every);

    let admission = AdmissionController::new(post_limiter, get_limiter, config.max_body_size);
    let service = PasteService::with_admission(&config, admission, store, metrics)
        .context("failed to build service")?;

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    PasteServer::new(service)
        .serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("server failed")?;

    info!("Pastebin server stopped");
    Ok(())
}

/// Periodically drop expired rate limit windows so idle clients do not
/// accumulate in memory
fn spawn_window_sweeper(limiters: Vec<Arc<FixedWindowLimiter>>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            for limiter in &limiters {
                let purged = limiter.purge_expired();
                debug!(
                    "Purged {} expired rate limit windows, {} still tracked",
                    purged,
                    limiter.tracked_keys()
                );
            }
        }
    });
}
