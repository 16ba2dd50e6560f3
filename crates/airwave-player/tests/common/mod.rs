//! Shared test fixtures: a recording SDK mock and a stub provider server.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use airwave_core::config::Config;
use airwave_core::detector::PlaybackSnapshot;
use airwave_core::error::{Error, Result};
use airwave_core::tokens::{TokenSet, TokenStore};
use airwave_player::sdk::Sdk;
use axum::extract::Path;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Activate,
    Play { uris: Vec<String>, position_ms: i64 },
    Resume,
    Pause,
    Seek(i64),
    SetVolume(f32),
}

/// Records every command and simulates a device that starts playing as soon
/// as a play command lands.
pub struct MockSdk {
    pub calls: Mutex<Vec<Call>>,
    pub state: Mutex<Option<PlaybackSnapshot>>,
    pub volume: Mutex<f32>,
    /// When true, volume commands strictly between 0.0 and 0.7 fail,
    /// simulating a device that drops mid-fade steps.
    pub fail_partial_volume: AtomicBool,
    /// Number of upcoming play commands to reject with a 401-style error.
    pub fail_play_auth: AtomicU32,
}

impl MockSdk {
    pub fn new(volume: f32) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(None),
            volume: Mutex::new(volume),
            fail_partial_volume: AtomicBool::new(false),
            fail_play_auth: AtomicU32::new(0),
        }
    }

    pub fn play_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Play { .. }))
            .count()
    }

    pub fn volume_calls(&self) -> Vec<f32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::SetVolume(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Sdk for MockSdk {
    async fn state(&self) -> Result<Option<PlaybackSnapshot>> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn activate(&self) -> Result<()> {
        self.record(Call::Activate);
        Ok(())
    }

    async fn play(&self, uris: &[String], position_ms: i64) -> Result<()> {
        self.record(Call::Play {
            uris: uris.to_vec(),
            position_ms,
        });
        if self.fail_play_auth.load(Ordering::SeqCst) > 0 {
            self.fail_play_auth.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Authentication("access token rejected".into()));
        }
        let track_id = uris
            .first()
            .and_then(|u| u.rsplit(':').next())
            .map(|s| s.to_string());
        *self.state.lock().unwrap() = Some(PlaybackSnapshot {
            position_ms,
            duration_ms: 200_000,
            paused: false,
            track_id,
        });
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.record(Call::Resume);
        if let Some(snap) = self.state.lock().unwrap().as_mut() {
            snap.paused = false;
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.record(Call::Pause);
        if let Some(snap) = self.state.lock().unwrap().as_mut() {
            snap.paused = true;
        }
        Ok(())
    }

    async fn seek(&self, position_ms: i64) -> Result<()> {
        self.record(Call::Seek(position_ms));
        if let Some(snap) = self.state.lock().unwrap().as_mut() {
            snap.position_ms = position_ms;
        }
        Ok(())
    }

    async fn volume(&self) -> Result<f32> {
        Ok(*self.volume.lock().unwrap())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.record(Call::SetVolume(volume));
        if self.fail_partial_volume.load(Ordering::SeqCst) && volume > 0.0 && volume < 0.7 {
            return Err(Error::Playback(format!("volume {volume} rejected")));
        }
        *self.volume.lock().unwrap() = volume;
        Ok(())
    }
}

fn track_json(id: &str) -> Value {
    json!({
        "id": id,
        "uri": format!("spotify:track:{id}"),
        "name": format!("Track {id}"),
        "duration_ms": 200_000,
        "artists": [{ "name": "Artist" }]
    })
}

async fn library_tracks() -> Json<Value> {
    Json(json!({
        "items": [
            { "track": track_json("a1") },
            { "track": track_json("a2") },
            { "track": track_json("a3") }
        ]
    }))
}

async fn playlist_tracks(Path(id): Path<String>) -> Json<Value> {
    let items: Vec<Value> = match id.as_str() {
        "empty" => vec![],
        "ghosts" => vec![
            json!({ "track": { "id": "g1", "uri": null, "name": "Ghost", "duration_ms": 0 } }),
            json!({ "track": null }),
        ],
        _ => vec![json!({ "track": track_json("p1") })],
    };
    Json(json!({ "items": items }))
}

async fn playlist_metadata(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "name": format!("Playlist {id}"),
        "description": "stub playlist",
        "images": [{ "url": "https://img/stub" }],
        "tracks": { "total": 1 }
    }))
}

async fn empty_library_tracks() -> Json<Value> {
    Json(json!({ "items": [] }))
}

async fn auth_refresh() -> Json<Value> {
    Json(json!({ "access_token": "refreshed-token", "expires_in": 3600 }))
}

fn stub_router(empty_library: bool) -> Router {
    let library = if empty_library {
        get(empty_library_tracks)
    } else {
        get(library_tracks)
    };
    Router::new()
        .route("/me/tracks", library)
        .route("/playlists/:id/tracks", get(playlist_tracks))
        .route("/playlists/:id", get(playlist_metadata))
        .route("/auth/refresh", post(auth_refresh))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Serves just enough of the provider catalog API for the controller tests.
/// Doubles as the auth relay so token refreshes succeed. Returns the base
/// URL.
pub async fn start_stub_provider() -> String {
    serve(stub_router(false)).await
}

/// Same stub with a saved-tracks library that has nothing in it.
pub async fn start_stub_provider_empty_library() -> String {
    serve(stub_router(true)).await
}

/// Config with all transition delays shrunk so tests finish quickly.
pub fn fast_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.api.base_url = base_url.to_string();
    config.api.retry_delay_ms = 10;
    config.timing.post_ending_delay_ms = 10;
    config.timing.play_settle_ms = 10;
    config.timing.seek_delay_ms = 10;
    config.timing.volume_restore_delay_ms = 10;
    config.timing.fade_duration_ms = 30;
    config.timing.ending_grace_ms = 300;
    config.timing.ending_retry_delay_ms = 20;
    // Keep the background tickers quiet for the duration of a test.
    config.timing.poll_interval_ms = 60_000;
    config.auth.refresh_check_secs = 3600;
    config
}

/// Token store seeded with a long-lived session, backed by a throwaway file.
pub async fn seeded_tokens(tag: &str) -> Arc<TokenStore> {
    seeded_store(tag, "http://127.0.0.1:1", None).await
}

/// Like [`seeded_tokens`], but refresh-capable against the stub relay.
pub async fn seeded_tokens_with_refresh(tag: &str, relay_url: &str) -> Arc<TokenStore> {
    seeded_store(tag, relay_url, Some("refresh-1".into())).await
}

async fn seeded_store(tag: &str, relay_url: &str, refresh_token: Option<String>) -> Arc<TokenStore> {
    let path = std::env::temp_dir().join(format!(
        "airwave-player-test-{tag}-{}.json",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    let store = Arc::new(TokenStore::new(path, relay_url.to_string()));
    store
        .store(TokenSet {
            access_token: "test-token".into(),
            refresh_token,
            expires_at_ms: airwave_core::now_ms() + 3_600_000,
        })
        .await
        .unwrap();
    store
}
