//! HTTP request handling
//!
//! Routes:
//! - `POST /post` stores the raw body and answers 201 with the new key
//! - `GET /{key}` serves stored content
//! - `OPTIONS *` answers CORS preflight
//!
//! Every request except preflight passes the admission controller first.

use crate::admission::AdmissionController;
use crate::config::PasteConfig;
use crate::error::{PasteError, Result};
use crate::ingest::{IngestMetadata, Ingestor};
use crate::metrics::PasteMetrics;
use crate::models::{CreatedResponse, RateLimitedResponse};
use crate::retrieve::{Delivery, Retriever};
use crate::store::ContentStore;
use bytes::Bytes;
use http::header::{
    HeaderName, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, CONTENT_ENCODING, CONTENT_TYPE,
    LOCATION, VARY,
};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Path that accepts new content
pub const POST_PATH: &str = "/post";

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Where a request is routed after admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Create,
    Fetch(String),
    /// HEAD on a key: answered with the GET response, hyper strips the body
    Head(String),
    NotFound,
}

impl Route {
    pub fn resolve(method: &Method, path: &str) -> Self {
        if method == Method::POST && path == POST_PATH {
            return Route::Create;
        }

        let key = match path.strip_prefix('/') {
            Some(rest) if !rest.is_empty() && !rest.contains('/') => rest,
            _ => return Route::NotFound,
        };

        if method == Method::GET {
            Route::Fetch(key.to_string())
        } else if method == Method::HEAD {
            Route::Head(key.to_string())
        } else {
            Route::NotFound
        }
    }
}

/// The pastebin HTTP service
#[derive(Clone)]
pub struct PasteService {
    admission: AdmissionController,
    ingestor: Ingestor,
    retriever: Retriever,
    metrics: Arc<PasteMetrics>,
    client_ip_header: Option<HeaderName>,
    strict_body_limit: bool,
}

impl PasteService {
    /// Create a service with in-process rate limiters built from `config`
    pub fn new(
        config: &PasteConfig,
        store: Arc<dyn ContentStore>,
        metrics: Arc<PasteMetrics>,
    ) -> Result<Self> {
        Self::with_admission(config, AdmissionController::from_config(config), store, metrics)
    }

    /// Create a service around an existing admission controller
    pub fn with_admission(
        config: &PasteConfig,
        admission: AdmissionController,
        store: Arc<dyn ContentStore>,
        metrics: Arc<PasteMetrics>,
    ) -> Result<Self> {
        let client_ip_header = match &config.client_ip_header {
            Some(name) => Some(HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                PasteError::ConfigError(format!("invalid client_ip_header '{}': {}", name, e))
            })?),
            None => None,
        };

        Ok(Self {
            admission,
            ingestor: Ingestor::new(Arc::clone(&store)),
            retriever: Retriever::new(store)
                .with_decompression_limit(config.max_decompressed_size),
            metrics,
            client_ip_header,
            strict_body_limit: config.strict_body_limit,
        })
    }

    pub fn metrics(&self) -> &Arc<PasteMetrics> {
        &self.metrics
    }

    /// Determine the client address for rate limiting and audit
    ///
    /// With a configured client address header, only that header is trusted
    /// and a missing or unparsable value means "unknown". Otherwise the TCP
    /// peer address is used.
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
        match &self.client_ip_header {
            Some(name) => headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse().ok()),
            None => peer.map(|addr| addr.ip()),
        }
    }

    /// Handle one request
    ///
    /// Never fails: every error is turned into a response here.
    pub async fn handle<B>(&self, req: Request<B>, peer: Option<SocketAddr>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let method = req.method().clone();

        let mut response = if method == Method::OPTIONS {
            preflight_response(req.headers())
        } else {
            self.admit_and_route(req, peer).await
        };

        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

        self.metrics.record_response(
            method.as_str(),
            response.status().as_u16(),
            start.elapsed().as_secs_f64(),
        );
        response
    }

    async fn admit_and_route<B>(&self, req: Request<B>, peer: Option<SocketAddr>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let client_ip = self.client_ip(req.headers(), peer);

        if let Err(e) = self
            .admission
            .admit(req.method(), client_ip, req.headers())
            .await
        {
            return self.error_response(req.method(), &e);
        }

        let route = Route::resolve(req.method(), req.uri().path());
        debug!("{} {} -> {:?}", req.method(), req.uri().path(), route);

        match route {
            Route::Create => match self.create(req, client_ip).await {
                Ok(key) => created_response(&key),
                Err(e) => self.error_response(&Method::POST, &e),
            },
            Route::Fetch(key) => match self.retriever.retrieve(&key).await {
                Ok(delivery) => {
                    self.metrics.record_served();
                    delivery_response(delivery)
                }
                Err(e) => self.error_response(&Method::GET, &e),
            },
            // hyper drops the body of a HEAD response but keeps the length
            // derived from it, so the GET response is returned as is.
            Route::Head(key) => match self.retriever.retrieve(&key).await {
                Ok(delivery) => delivery_response(delivery),
                Err(e) => self.error_response(&Method::HEAD, &e),
            },
            Route::NotFound => text_response(StatusCode::NOT_FOUND, "404 Not Found"),
        }
    }

    async fn create<B>(&self, req: Request<B>, client_ip: Option<IpAddr>) -> Result<String>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let meta = IngestMetadata::from_headers(&parts.headers, client_ip);
        let body = self.read_body(body).await?;
        let size = body.len();

        let key = self.ingestor.ingest(body, meta).await?;
        self.metrics.record_created(size);
        Ok(key)
    }

    /// Collect the request body
    ///
    /// Only capped while reading when `strict_body_limit` is set; otherwise
    /// the declared length checked at admission is trusted.
    async fn read_body<B>(&self, body: B) -> Result<Bytes>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if self.strict_body_limit {
            let limit = self.admission.max_body_size();
            let cap = usize::try_from(limit).unwrap_or(usize::MAX);
            match Limited::new(body, cap).collect().await {
                Ok(collected) => Ok(collected.to_bytes()),
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                    Err(PasteError::BodyTooLarge { limit })
                }
                Err(e) => Err(PasteError::BodyRead(e.to_string())),
            }
        } else {
            match body.collect().await {
                Ok(collected) => Ok(collected.to_bytes()),
                Err(e) => {
                    let e: Box<dyn std::error::Error + Send + Sync> = e.into();
                    Err(PasteError::BodyRead(e.to_string()))
                }
            }
        }
    }

    fn error_response(&self, method: &Method, err: &PasteError) -> Response<Full<Bytes>> {
        let status = StatusCode::from_u16(err.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match err {
            PasteError::RateLimited { .. } => {
                self.metrics.record_rate_limited(method.as_str());
                return json_response(
                    status,
                    &RateLimitedResponse {
                        error: true,
                        message: err.public_message().to_string(),
                    },
                );
            }
            PasteError::PayloadTooLarge { .. } | PasteError::BodyTooLarge { .. } => {
                self.metrics.record_payload_too_large();
            }
            PasteError::Decompression(_) => self.metrics.record_decompression_failure(),
            PasteError::KeyCollision(_) | PasteError::StorageWrite(_) => {
                self.metrics.record_storage_error("insert")
            }
            PasteError::StorageRead(_) => self.metrics.record_storage_error("lookup"),
            PasteError::NotFound(_) => {}
            other => warn!("{} request failed: {}", method, other),
        }

        text_response(status, err.public_message())
    }
}

fn text_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(json) => {
            let mut response = Response::new(Full::new(Bytes::from(json)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn created_response(key: &str) -> Response<Full<Bytes>> {
    let mut response = json_response(
        StatusCode::CREATED,
        &CreatedResponse {
            key: key.to_string(),
        },
    );
    match HeaderValue::from_str(&format!("/{}", key)) {
        Ok(location) => {
            response.headers_mut().insert(LOCATION, location);
        }
        Err(e) => error!("Key {} is not a valid Location header: {}", key, e),
    }
    response
}

fn delivery_response(delivery: Delivery) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(delivery.body));
    let headers = response.headers_mut();

    let content_type = HeaderValue::from_str(&delivery.content_type).unwrap_or_else(|_| {
        warn!("Stored content type {:?} is not a valid header", delivery.content_type);
        HeaderValue::from_static("text/plain")
    });
    headers.insert(CONTENT_TYPE, content_type);

    if let Some(encoding) = delivery.content_encoding {
        match HeaderValue::from_str(&encoding) {
            Ok(value) => {
                headers.insert(CONTENT_ENCODING, value);
            }
            Err(_) => warn!("Stored content encoding {:?} is not a valid header", encoding),
        }
    }
    response
}

fn preflight_response(request_headers: &HeaderMap) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST"),
    );
    if let Some(requested) = request_headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        headers.insert(
            VARY,
            HeaderValue::from_static("Access-Control-Request-Headers"),
        );
    }
    response
}
