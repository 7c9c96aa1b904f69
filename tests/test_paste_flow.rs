//! End-to-end request flow through `PasteService`
//!
//! Covers:
//! - POST then GET round trips, with and without gzip
//! - Content-Type defaulting
//! - Unknown keys
//! - Declared body size boundary
//! - Per-client and shared ("unknown") rate limit buckets
//! - Corrupt gzip content

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use pastebin::{is_valid_key, MemoryStore, PasteConfig, PasteMetrics, PasteService, RateLimitPolicy};
use std::collections::HashSet;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

const CLIENT_A: &str = "203.0.113.10:50000";
const CLIENT_B: &str = "203.0.113.20:50000";

fn test_config() -> PasteConfig {
    PasteConfig {
        post_rate_limit: RateLimitPolicy::new(1000, 60),
        get_rate_limit: RateLimitPolicy::new(1000, 60),
        ..Default::default()
    }
}

fn build(config: PasteConfig) -> (PasteService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let metrics = Arc::new(PasteMetrics::new().unwrap());
    let service = PasteService::new(&config, store.clone(), metrics).unwrap();
    (service, store)
}

fn peer(addr: &str) -> Option<SocketAddr> {
    Some(addr.parse().unwrap())
}

fn post() -> http::request::Builder {
    Request::builder().method(Method::POST).uri("/post")
}

fn post_request(body: Bytes, headers: &[(&str, &str)]) -> Request<Full<Bytes>> {
    let mut builder = post().header("content-length", body.len().to_string());
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Full::new(body)).unwrap()
}

fn get_request(key: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(format!("/{}", key))
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn body_bytes(response: Response<Full<Bytes>>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn create(service: &PasteService, body: Bytes, headers: &[(&str, &str)]) -> String {
    let response = service.handle(post_request(body, headers), peer(CLIENT_A)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    json["key"].as_str().unwrap().to_string()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_post_returns_key_and_location() {
    let (service, _) = build(test_config());

    let response = service
        .handle(post_request(Bytes::from_static(b"hello"), &[]), peer(CLIENT_A))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let location = response.headers()["location"].to_str().unwrap().to_string();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let key = json["key"].as_str().unwrap();

    assert!(is_valid_key(key));
    assert_eq!(location, format!("/{}", key));
}

#[tokio::test]
async fn test_round_trip_with_content_type() {
    let (service, _) = build(test_config());
    let payload = Bytes::from(vec![0u8, 1, 2, 254, 255, b'\n', b'\r']);

    let key = create(&service, payload.clone(), &[("content-type", "application/octet-stream")]).await;

    let response = service.handle(get_request(&key), peer(CLIENT_B)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/octet-stream");
    assert!(response.headers().get("content-encoding").is_none());
    assert_eq!(body_bytes(response).await, payload);
}

#[tokio::test]
async fn test_missing_content_type_defaults_to_text_plain() {
    let (service, store) = build(test_config());
    let key = create(&service, Bytes::from_static(b"no type"), &[]).await;

    assert_eq!(store.record(&key).await.unwrap().content_type, "text/plain");

    let response = service.handle(get_request(&key), None).await;
    assert_eq!(response.headers()["content-type"], "text/plain");
}

#[tokio::test]
async fn test_gzip_round_trip() {
    let (service, store) = build(test_config());
    let original = b"the quick brown fox jumps over the lazy dog ".repeat(50);
    let compressed = gzip(&original);

    let key = create(
        &service,
        Bytes::from(compressed.clone()),
        &[("content-type", "text/plain"), ("content-encoding", "gzip")],
    )
    .await;

    // Stored compressed, served decompressed
    assert_eq!(store.record(&key).await.unwrap().content.as_ref(), &compressed[..]);

    let response = service.handle(get_request(&key), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-encoding"], "gzip");
    assert_eq!(body_bytes(response).await.as_ref(), &original[..]);
}

#[tokio::test]
async fn test_unrecognized_encoding_is_echoed_and_passed_through() {
    let (service, _) = build(test_config());
    let raw = Bytes::from_static(b"\x8b\x00pretend-brotli");

    let key = create(&service, raw.clone(), &[("content-encoding", "br")]).await;

    let response = service.handle(get_request(&key), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-encoding"], "br");
    assert_eq!(body_bytes(response).await, raw);
}

#[tokio::test]
async fn test_malformed_gzip_yields_500() {
    let (service, _) = build(test_config());
    let key = create(
        &service,
        Bytes::from_static(b"this was never gzip"),
        &[("content-encoding", "gzip")],
    )
    .await;

    let response = service.handle(get_request(&key), None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"Error decompressing content"));
    assert_eq!(service.metrics().decompression_failures_total.get(), 1);
}

#[tokio::test]
async fn test_gzip_over_decompression_limit_yields_500() {
    let config = PasteConfig {
        max_decompressed_size: Some(64 * 1024),
        ..test_config()
    };
    let (service, _) = build(config);
    let bomb = gzip(&vec![0u8; 1024 * 1024]);

    let key = create(&service, Bytes::from(bomb), &[("content-encoding", "gzip")]).await;

    let response = service.handle(get_request(&key), None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"Error decompressing content"));

    // Small gzip content is still served
    let key = create(&service, Bytes::from(gzip(b"small")), &[("content-encoding", "gzip")]).await;
    let response = service.handle(get_request(&key), None).await;
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"small"));
}

#[tokio::test]
async fn test_unknown_key_is_404() {
    let (service, _) = build(test_config());

    let response = service.handle(get_request("zzzzzzzz"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"Not found"));
}

#[tokio::test]
async fn test_unmatched_routes_are_404() {
    let (service, _) = build(test_config());

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/post")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = service.handle(request, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = service.handle(get_request(""), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_keys_are_unique_across_posts() {
    let (service, store) = build(test_config());
    let mut keys = HashSet::new();

    for i in 0..200 {
        let key = create(&service, Bytes::from(format!("paste {}", i)), &[]).await;
        assert!(is_valid_key(&key));
        keys.insert(key);
    }

    assert_eq!(keys.len(), 200);
    assert_eq!(store.len().await, 200);
}

#[tokio::test]
async fn test_size_boundary() {
    let config = PasteConfig {
        max_body_size: 16,
        ..test_config()
    };
    let (service, store) = build(config);

    // Exactly at the ceiling
    let at_limit = Bytes::from(vec![b'a'; 16]);
    let response = service.handle(post_request(at_limit, &[]), peer(CLIENT_A)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(store.len().await, 1);

    // One byte over
    let over = Bytes::from(vec![b'a'; 17]);
    let response = service.handle(post_request(over, &[]), peer(CLIENT_A)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"Content too large"));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_declared_length_is_trusted_by_default() {
    let config = PasteConfig {
        max_body_size: 16,
        ..test_config()
    };
    let (service, store) = build(config);

    // Declares 4 bytes, sends 64: admitted and stored in full
    let request = post()
        .header("content-length", "4")
        .body(Full::new(Bytes::from(vec![b'x'; 64])))
        .unwrap();
    let response = service.handle(request, None).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_strict_body_limit_caps_actual_bytes() {
    let config = PasteConfig {
        max_body_size: 16,
        strict_body_limit: true,
        ..test_config()
    };
    let (service, store) = build(config);

    let request = post()
        .header("content-length", "4")
        .body(Full::new(Bytes::from(vec![b'x'; 64])))
        .unwrap();
    let response = service.handle(request, None).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_post_rate_limit_per_client() {
    let config = PasteConfig {
        post_rate_limit: RateLimitPolicy::new(3, 60),
        ..test_config()
    };
    let (service, store) = build(config);

    for _ in 0..3 {
        let response = service
            .handle(post_request(Bytes::from_static(b"x"), &[]), peer(CLIENT_A))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = service
        .handle(post_request(Bytes::from_static(b"x"), &[]), peer(CLIENT_A))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["error"], true);
    assert_eq!(json["message"], "Rate Limited: Too many requests");
    assert_eq!(store.len().await, 3);

    // Another client has its own bucket
    let response = service
        .handle(post_request(Bytes::from_static(b"x"), &[]), peer(CLIENT_B))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // GET has its own bucket too
    let response = service.handle(get_request("zzzzzzzz"), peer(CLIENT_A)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_rate_limit() {
    let config = PasteConfig {
        get_rate_limit: RateLimitPolicy::new(2, 60),
        ..test_config()
    };
    let (service, _) = build(config);
    let key = create(&service, Bytes::from_static(b"popular"), &[]).await;

    for _ in 0..2 {
        let response = service.handle(get_request(&key), peer(CLIENT_B)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = service.handle(get_request(&key), peer(CLIENT_B)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(service.metrics().rate_limited_total.with_label_values(&["GET"]).get(), 1);
}

#[tokio::test]
async fn test_clients_without_address_share_a_bucket() {
    let config = PasteConfig {
        post_rate_limit: RateLimitPolicy::new(2, 60),
        client_ip_header: Some("cf-connecting-ip".to_string()),
        ..test_config()
    };
    let (service, store) = build(config);

    // Different peers, but no address header: both land in "unknown"
    let response = service
        .handle(post_request(Bytes::from_static(b"1"), &[]), peer(CLIENT_A))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = service
        .handle(post_request(Bytes::from_static(b"2"), &[]), peer(CLIENT_B))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = service
        .handle(post_request(Bytes::from_static(b"3"), &[]), None)
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A client identified by the header is unaffected
    let response = service
        .handle(
            post_request(Bytes::from_static(b"4"), &[("cf-connecting-ip", "198.51.100.7")]),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let record = store.record(json["key"].as_str().unwrap()).await.unwrap();
    assert_eq!(record.ip_address.as_deref(), Some("198.51.100.7"));
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn test_other_methods_bypass_rate_limit_but_not_size_check() {
    let config = PasteConfig {
        post_rate_limit: RateLimitPolicy::new(1, 60),
        get_rate_limit: RateLimitPolicy::new(1, 60),
        max_body_size: 8,
        ..test_config()
    };
    let (service, _) = build(config);

    for _ in 0..5 {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/abcd1234")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.handle(request, peer(CLIENT_A)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/post")
        .header("content-length", "9")
        .body(Full::new(Bytes::from_static(b"123456789")))
        .unwrap();
    let response = service.handle(request, peer(CLIENT_A)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_cors_preflight() {
    let config = PasteConfig {
        post_rate_limit: RateLimitPolicy::new(1, 60),
        ..test_config()
    };
    let (service, _) = build(config);

    for _ in 0..3 {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/post")
            .header("origin", "https://example.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type, content-encoding")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.handle(request, peer(CLIENT_A)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["access-control-allow-methods"], "GET,POST");
        assert_eq!(
            response.headers()["access-control-allow-headers"],
            "content-type, content-encoding"
        );
    }
}

#[tokio::test]
async fn test_head_matches_get_response() {
    let (service, _) = build(test_config());
    let original = b"<p>compressed markup</p>".repeat(10);
    let key = create(
        &service,
        Bytes::from(gzip(&original)),
        &[("content-type", "text/html"), ("content-encoding", "gzip")],
    )
    .await;

    let request = Request::builder()
        .method(Method::HEAD)
        .uri(format!("/{}", key))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let head = service.handle(request, None).await;
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(head.headers()["content-type"], "text/html");
    assert_eq!(head.headers()["content-encoding"], "gzip");

    // The connection layer strips the body; its size still sets Content-Length
    assert_eq!(body_bytes(head).await.as_ref(), &original[..]);
}

#[tokio::test]
async fn test_request_metrics_recorded() {
    let (service, _) = build(test_config());
    create(&service, Bytes::from_static(b"abc"), &[]).await;
    service.handle(get_request("zzzzzzzz"), None).await;

    let metrics = service.metrics();
    assert_eq!(metrics.pastes_created_total.get(), 1);
    assert_eq!(metrics.bytes_stored_total.get(), 3);
    assert_eq!(metrics.requests_total.with_label_values(&["POST", "201"]).get(), 1);
    assert_eq!(metrics.requests_total.with_label_values(&["GET", "404"]).get(), 1);
}
