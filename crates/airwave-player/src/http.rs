use std::time::Duration;

use crate::controller::{PlayerCommand, PlayerEvent};
use crate::projection::{Projection, ProjectionEvent, UiState};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

/// Long-poll requests return early on any state change, or with the
/// unchanged state once this elapses.
const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Clone)]
struct HttpState {
    projection: Projection,
    event_tx: mpsc::Sender<PlayerEvent>,
}

#[derive(Serialize)]
struct VolumeStatus {
    volume: u8,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    projection: Projection,
    event_tx: mpsc::Sender<PlayerEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState { projection, event_tx };

        let app = Router::new()
            .route("/api/state", get(get_state))
            .route("/api/state/poll", get(poll_state))
            .route("/api/play/:id", get(play_station).post(play_station))
            .route("/api/skip", get(skip).post(skip))
            .route("/api/pause", get(pause).post(pause))
            .route("/api/resume", get(resume).post(resume))
            .route("/api/volume/:volume", get(set_volume).post(set_volume))
            .route("/api/volume", get(get_volume))
            .layer(CorsLayer::permissive())
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<UiState> {
    Json(state.projection.get_state().await)
}

/// Blocks until the projection changes (or the timeout), then replies with
/// the current state. Lagged or closed subscriptions reply immediately.
async fn poll_state(State(state): State<HttpState>) -> Json<UiState> {
    let mut rx = state.projection.subscribe();
    let woke = tokio::time::timeout(LONG_POLL_TIMEOUT, rx.recv()).await;
    if let Ok(Ok(ProjectionEvent::Notification(msg))) = woke {
        debug!("long-poll woke on notification: {}", msg);
    }
    Json(state.projection.get_state().await)
}

async fn play_station(
    State(state): State<HttpState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> StatusCode {
    info!("HTTP API: Play station {}", id);
    let cmd = PlayerCommand::PlayStation { station_id: id };
    if state.event_tx.send(PlayerEvent::Command(cmd)).await.is_err() {
        error!("Failed to send play command");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn skip(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Skip");
    if state
        .event_tx
        .send(PlayerEvent::Command(PlayerCommand::Skip))
        .await
        .is_err()
    {
        error!("Failed to send skip command");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn pause(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Pause");
    if state
        .event_tx
        .send(PlayerEvent::Command(PlayerCommand::Pause))
        .await
        .is_err()
    {
        error!("Failed to send pause command");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn resume(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Resume");
    if state
        .event_tx
        .send(PlayerEvent::Command(PlayerCommand::Resume))
        .await
        .is_err()
    {
        error!("Failed to send resume command");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn set_volume(
    State(state): State<HttpState>,
    axum::extract::Path(volume): axum::extract::Path<i32>,
) -> StatusCode {
    let vol = (volume as f32 / 100.0).clamp(0.0, 1.0);
    info!("HTTP API: Set volume to {}%", volume);
    let cmd = PlayerCommand::SetVolume { volume: vol };
    if state.event_tx.send(PlayerEvent::Command(cmd)).await.is_err() {
        error!("Failed to send volume command");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn get_volume(State(state): State<HttpState>) -> Json<VolumeStatus> {
    let ui = state.projection.get_state().await;
    let volume = (ui.volume * 100.0).round() as u8;
    Json(VolumeStatus { volume })
}
