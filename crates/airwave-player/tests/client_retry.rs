//! Retry and rate-limit behavior of the HTTP client wrapper.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use airwave_core::config::ApiConfig;
use airwave_core::error::Error;
use airwave_player::client::RateLimitedClient;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use common::seeded_tokens;
use serde_json::json;

#[derive(Clone, Default)]
struct Hits {
    flaky: Arc<AtomicU32>,
    limited: Arc<AtomicU32>,
    saturated: Arc<AtomicU32>,
    unauthorized: Arc<AtomicU32>,
    broken: Arc<AtomicU32>,
}

async fn flaky(State(hits): State<Hits>) -> impl IntoResponse {
    let n = hits.flaky.fetch_add(1, Ordering::SeqCst) + 1;
    if n < 3 {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else {
        Json(json!({ "ok": true })).into_response()
    }
}

async fn limited(State(hits): State<Hits>) -> impl IntoResponse {
    let n = hits.limited.fetch_add(1, Ordering::SeqCst) + 1;
    if n == 1 {
        ([("Retry-After", "1")], StatusCode::TOO_MANY_REQUESTS).into_response()
    } else {
        Json(json!({ "ok": true })).into_response()
    }
}

async fn saturated(State(hits): State<Hits>) -> impl IntoResponse {
    hits.saturated.fetch_add(1, Ordering::SeqCst);
    ([("Retry-After", "120")], StatusCode::TOO_MANY_REQUESTS)
}

async fn unauthorized(State(hits): State<Hits>) -> StatusCode {
    hits.unauthorized.fetch_add(1, Ordering::SeqCst);
    StatusCode::UNAUTHORIZED
}

async fn broken(State(hits): State<Hits>) -> StatusCode {
    hits.broken.fetch_add(1, Ordering::SeqCst);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn start_server() -> (String, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/flaky", get(flaky))
        .route("/limited", get(limited))
        .route("/saturated", get(saturated))
        .route("/unauthorized", get(unauthorized))
        .route("/broken", get(broken))
        .with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

async fn test_client(tag: &str) -> RateLimitedClient {
    let cfg = ApiConfig {
        max_retries: 3,
        retry_delay_ms: 10,
        ..ApiConfig::default()
    };
    let tokens = seeded_tokens(tag).await;
    RateLimitedClient::new(&cfg, tokens.shared())
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let (base, hits) = start_server().await;
    let client = test_client("flaky").await;

    let body: serde_json::Value = client.get_json(&format!("{base}/flaky")).await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limit_waits_without_consuming_a_retry() {
    let (base, hits) = start_server().await;
    let client = test_client("limited").await;

    let started = Instant::now();
    let body: serde_json::Value = client.get_json(&format!("{base}/limited")).await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(hits.limited.load(Ordering::SeqCst), 2);
    assert!(
        started.elapsed().as_millis() >= 1000,
        "Retry-After was not honored"
    );
}

#[tokio::test]
async fn excessive_retry_after_is_surfaced() {
    let (base, hits) = start_server().await;
    let client = test_client("saturated").await;

    let err = client
        .get_json::<serde_json::Value>(&format!("{base}/saturated"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateLimited { retry_after_secs: 120 }));
    assert_eq!(hits.saturated.load(Ordering::SeqCst), 1, "must not wait and re-issue");
}

#[tokio::test]
async fn unauthorized_fails_fast() {
    let (base, hits) = start_server().await;
    let client = test_client("unauthorized").await;

    let err = client
        .get_json::<serde_json::Value>(&format!("{base}/unauthorized"))
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert_eq!(hits.unauthorized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let (base, hits) = start_server().await;
    let client = test_client("broken").await;

    let err = client
        .get_json::<serde_json::Value>(&format!("{base}/broken"))
        .await
        .unwrap_err();
    assert!(!err.is_auth());
    assert_eq!(hits.broken.load(Ordering::SeqCst), 3);
}
