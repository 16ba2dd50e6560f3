//! Thin typed surface over the provider's Web API.
//!
//! All calls go through [`RateLimitedClient`]; this module only knows URLs
//! and payload shapes. Paged listings are drained here so callers always see
//! complete track lists.

use airwave_core::config::ApiConfig;
use airwave_core::detector::PlaybackSnapshot;
use airwave_core::error::{Error, Result};
use airwave_core::tokens::SharedTokens;
use airwave_core::track::{PlaylistMetadata, Track, TrackPage};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::RateLimitedClient;

pub struct ProviderApi {
    client: RateLimitedClient,
    base_url: String,
    page_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub volume_percent: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<Device>,
}

/// Playback state as the provider reports it. `item` is null between tracks
/// and for non-track content.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackState {
    #[serde(default)]
    pub progress_ms: Option<i64>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub item: Option<Track>,
    #[serde(default)]
    pub device: Option<Device>,
}

impl PlaybackState {
    pub fn snapshot(&self) -> Option<PlaybackSnapshot> {
        let item = self.item.as_ref()?;
        Some(PlaybackSnapshot {
            position_ms: self.progress_ms.unwrap_or(0),
            duration_ms: item.duration_ms,
            paused: !self.is_playing,
            track_id: item.id.clone(),
        })
    }
}

impl ProviderApi {
    pub fn new(cfg: &ApiConfig, tokens: SharedTokens) -> Self {
        Self {
            client: RateLimitedClient::new(cfg, tokens),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            page_limit: cfg.page_limit.clamp(1, 50),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The user's full saved-tracks library, drained page by page.
    pub async fn library_tracks(&self) -> Result<Vec<Track>> {
        self.drain_pages("/me/tracks").await
    }

    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        self.drain_pages(&format!("/playlists/{}/tracks", playlist_id))
            .await
    }

    async fn drain_pages(&self, path: &str) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut offset: u32 = 0;
        loop {
            let url = self.url(&format!(
                "{}?limit={}&offset={}",
                path, self.page_limit, offset
            ));
            let page: TrackPage = self.client.get_json(&url).await?;
            let count = page.items.len() as u32;
            tracks.extend(page.into_tracks());
            if count < self.page_limit {
                break;
            }
            offset += count;
        }
        debug!("fetched {} tracks from {}", tracks.len(), path);
        Ok(tracks)
    }

    pub async fn playlist_metadata(&self, playlist_id: &str) -> Result<PlaylistMetadata> {
        let url = self.url(&format!(
            "/playlists/{}?fields=name,description,images,tracks.total",
            playlist_id
        ));
        self.client.get_json(&url).await
    }

    pub async fn devices(&self) -> Result<Vec<Device>> {
        let url = self.url("/me/player/devices");
        let list: DeviceList = self.client.get_json(&url).await?;
        Ok(list.devices)
    }

    /// Makes `device_id` the active playback target without starting audio.
    pub async fn transfer_playback(&self, device_id: &str) -> Result<()> {
        let rb = self
            .client
            .request(Method::PUT, &self.url("/me/player"))
            .json(&json!({ "device_ids": [device_id], "play": false }));
        self.client.send(rb).await?;
        Ok(())
    }

    pub async fn play(
        &self,
        device_id: &str,
        uris: &[String],
        position_ms: i64,
    ) -> Result<()> {
        let url = self.url(&format!("/me/player/play?device_id={}", device_id));
        let rb = self
            .client
            .request(Method::PUT, &url)
            .json(&json!({ "uris": uris, "position_ms": position_ms }));
        self.client.send(rb).await?;
        Ok(())
    }

    /// Resume whatever is loaded on the device.
    pub async fn resume(&self, device_id: &str) -> Result<()> {
        let url = self.url(&format!("/me/player/play?device_id={}", device_id));
        let rb = self.client.request(Method::PUT, &url).json(&json!({}));
        self.client.send(rb).await?;
        Ok(())
    }

    pub async fn pause(&self, device_id: &str) -> Result<()> {
        let url = self.url(&format!("/me/player/pause?device_id={}", device_id));
        let rb = self.client.request(Method::PUT, &url);
        self.client.send(rb).await?;
        Ok(())
    }

    pub async fn seek(&self, device_id: &str, position_ms: i64) -> Result<()> {
        let url = self.url(&format!(
            "/me/player/seek?position_ms={}&device_id={}",
            position_ms, device_id
        ));
        let rb = self.client.request(Method::PUT, &url);
        self.client.send(rb).await?;
        Ok(())
    }

    pub async fn set_volume(&self, device_id: &str, percent: u32) -> Result<()> {
        let url = self.url(&format!(
            "/me/player/volume?volume_percent={}&device_id={}",
            percent.min(100),
            device_id
        ));
        let rb = self.client.request(Method::PUT, &url);
        self.client.send(rb).await?;
        Ok(())
    }

    /// Current playback state; `None` when nothing is active (204).
    pub async fn playback_state(&self) -> Result<Option<PlaybackState>> {
        let url = self.url("/me/player");
        let resp = self.client.send(self.client.request(Method::GET, &url)).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let state = resp
            .json::<PlaybackState>()
            .await
            .map_err(|e| Error::Network(format!("bad playback state body: {}", e)))?;
        Ok(Some(state))
    }
}
