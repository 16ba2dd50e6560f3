//! Read-model for HTTP clients.
//!
//! The controller pushes every user-visible change in here; the HTTP layer
//! only ever reads. A broadcast channel lets long-poll/streaming consumers
//! wake on change without polling the lock.

use std::sync::Arc;

use airwave_core::station::Station;
use airwave_core::track::Track;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
pub enum ProjectionEvent {
    StateUpdated,
    Notification(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StationView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub artwork: String,
}

impl From<&Station> for StationView {
    fn from(s: &Station) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            description: s.description.clone(),
            artwork: s.artwork.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackView {
    pub name: String,
    pub artists: String,
    pub artwork: Option<String>,
}

impl From<&Track> for TrackView {
    fn from(t: &Track) -> Self {
        Self {
            name: t.name.clone(),
            artists: t.artist_line(),
            artwork: t.artwork_url().map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct UiState {
    pub stations: Vec<StationView>,
    pub current_station: Option<String>,
    pub track: Option<TrackView>,
    pub position_ms: i64,
    pub duration_ms: i64,
    pub is_playing: bool,
    pub volume: f32,
    pub notification: Option<String>,
    pub auth_required: bool,
}

#[derive(Clone)]
pub struct Projection {
    state: Arc<RwLock<UiState>>,
    broadcast_tx: broadcast::Sender<ProjectionEvent>,
}

impl Projection {
    pub fn new(stations: &[Station], volume: f32) -> Self {
        let (broadcast_tx, _) = broadcast::channel(64);
        let state = UiState {
            stations: stations.iter().map(StationView::from).collect(),
            volume,
            ..UiState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            broadcast_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProjectionEvent> {
        self.broadcast_tx.subscribe()
    }

    pub async fn get_state(&self) -> UiState {
        self.state.read().await.clone()
    }

    pub async fn set_station(&self, station: Option<&Station>) {
        {
            let mut s = self.state.write().await;
            s.current_station = station.map(|st| st.id.clone());
        }
        self.changed();
    }

    /// Refresh a station's artwork/description after metadata arrives.
    pub async fn update_station_view(&self, station: &Station) {
        {
            let mut s = self.state.write().await;
            if let Some(view) = s.stations.iter_mut().find(|v| v.id == station.id) {
                *view = StationView::from(station);
            }
        }
        self.changed();
    }

    pub async fn set_track(&self, track: Option<&Track>) {
        {
            let mut s = self.state.write().await;
            s.track = track.map(TrackView::from);
        }
        self.changed();
    }

    pub async fn set_progress(&self, position_ms: i64, duration_ms: i64) {
        {
            let mut s = self.state.write().await;
            s.position_ms = position_ms;
            s.duration_ms = duration_ms;
        }
        self.changed();
    }

    pub async fn set_playing(&self, playing: bool) {
        {
            let mut s = self.state.write().await;
            if s.is_playing == playing {
                return;
            }
            s.is_playing = playing;
        }
        self.changed();
    }

    pub async fn set_volume(&self, volume: f32) {
        {
            let mut s = self.state.write().await;
            s.volume = volume;
        }
        self.changed();
    }

    pub async fn set_auth_required(&self, required: bool) {
        {
            let mut s = self.state.write().await;
            s.auth_required = required;
        }
        self.changed();
    }

    /// One-slot user notification; a new message replaces the previous one.
    pub async fn notify(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("notification: {}", message);
        {
            let mut s = self.state.write().await;
            s.notification = Some(message.clone());
        }
        let _ = self.broadcast_tx.send(ProjectionEvent::Notification(message));
    }

    pub async fn clear_notification(&self) {
        {
            let mut s = self.state.write().await;
            s.notification = None;
        }
        self.changed();
    }

    fn changed(&self) {
        let _ = self.broadcast_tx.send(ProjectionEvent::StateUpdated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_wakes_on_change() {
        let projection = Projection::new(&[], 0.5);
        let mut rx = projection.subscribe();

        projection.set_playing(true).await;
        assert!(matches!(rx.recv().await, Ok(ProjectionEvent::StateUpdated)));

        projection.notify("hello").await;
        match rx.recv().await {
            Ok(ProjectionEvent::Notification(msg)) => assert_eq!(msg, "hello"),
            other => panic!("expected notification event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unchanged_playing_state_does_not_broadcast() {
        let projection = Projection::new(&[], 0.5);
        let mut rx = projection.subscribe();

        projection.set_playing(false).await;
        assert!(
            matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)),
            "no-op update must not wake subscribers"
        );
    }
}
