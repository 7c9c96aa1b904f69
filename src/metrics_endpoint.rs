//! Metrics HTTP Endpoint
//!
//! Serves the service metrics in Prometheus format on a separate listener, so
//! the content routes never have to share a path namespace with them.

use crate::metrics::PasteMetrics;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: Arc<PasteMetrics>,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    pub fn new(metrics: Arc<PasteMetrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Start the metrics endpoint server
    ///
    /// Serves `/metrics` and `/health` until the process is terminated.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics available at http://{}/metrics", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = Arc::clone(&self.metrics);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = Arc::clone(&metrics);
                    async move { handle_request(req, metrics).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

async fn handle_request<B>(
    req: Request<B>,
    metrics: Arc<PasteMetrics>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    Ok(match req.uri().path() {
        "/metrics" => metrics_response(&metrics),
        "/health" => plain_response(StatusCode::OK, "application/json", r#"{"status":"healthy"}"#.to_string()),
        _ => plain_response(StatusCode::NOT_FOUND, "text/plain", "404 Not Found".to_string()),
    })
}

fn metrics_response(metrics: &PasteMetrics) -> Response<Full<Bytes>> {
    match metrics.render() {
        Ok(body) => plain_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            body,
        ),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "Failed to render metrics".to_string(),
            )
        }
    }
}

fn plain_response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}
