//! Catalog TTL behavior against a stub provider that counts fetches.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use airwave_player::api::ProviderApi;
use airwave_player::catalog::Catalog;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use common::{fast_config, seeded_tokens};
use serde_json::json;

async fn start_counting_provider() -> (String, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/me/tracks",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(json!({
                    "items": [
                        {
                            "track": {
                                "id": "a1",
                                "uri": "spotify:track:a1",
                                "name": "Track a1",
                                "duration_ms": 200_000
                            }
                        }
                    ]
                }))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

#[tokio::test]
async fn library_reads_within_ttl_hit_the_cache() {
    let (base_url, hits) = start_counting_provider().await;
    let mut config = fast_config(&base_url);
    config.cache.track_ttl_ms = 80;
    let tokens = seeded_tokens("catalog-ttl").await;
    let api = Arc::new(ProviderApi::new(&config.api, tokens.shared()));
    let mut catalog = Catalog::new(api, &config.cache);

    let first = catalog.library_tracks().await.unwrap();
    assert_eq!(first.len(), 1);
    let second = catalog.library_tracks().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(
        hits.load(Ordering::SeqCst),
        1,
        "a read within the TTL must not fetch"
    );

    tokio::time::sleep(Duration::from_millis(120)).await;
    catalog.library_tracks().await.unwrap();
    assert_eq!(
        hits.load(Ordering::SeqCst),
        2,
        "a read after expiry fetches exactly once"
    );
}

#[tokio::test]
async fn clear_drops_the_cached_library() {
    let (base_url, hits) = start_counting_provider().await;
    let config = fast_config(&base_url);
    let tokens = seeded_tokens("catalog-clear").await;
    let api = Arc::new(ProviderApi::new(&config.api, tokens.shared()));
    let mut catalog = Catalog::new(api, &config.cache);

    catalog.library_tracks().await.unwrap();
    catalog.clear();
    catalog.library_tracks().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
