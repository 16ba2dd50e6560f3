//! TTL cache over the provider catalog.
//!
//! Track lists are the hot path (consulted on every advance), so they are
//! kept behind `Arc` and handed out by clone. Metadata is best-effort: a
//! fetch failure degrades to `None` rather than blocking playback.

use std::collections::HashMap;
use std::sync::Arc;

use airwave_core::cache::{fresh_value, CacheEntry};
use airwave_core::config::CacheConfig;
use airwave_core::error::Result;
use airwave_core::now_ms;
use airwave_core::track::{PlaylistMetadata, Track};
use tracing::{info, warn};

use crate::api::ProviderApi;

pub struct Catalog {
    api: Arc<ProviderApi>,
    track_ttl_ms: i64,
    metadata_ttl_ms: i64,
    library: Option<CacheEntry<Arc<Vec<Track>>>>,
    playlists: HashMap<String, CacheEntry<Arc<Vec<Track>>>>,
    metadata: HashMap<String, CacheEntry<PlaylistMetadata>>,
}

impl Catalog {
    pub fn new(api: Arc<ProviderApi>, cfg: &CacheConfig) -> Self {
        Self {
            api,
            track_ttl_ms: cfg.track_ttl_ms,
            metadata_ttl_ms: cfg.metadata_ttl_ms,
            library: None,
            playlists: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub async fn library_tracks(&mut self) -> Result<Arc<Vec<Track>>> {
        if let Some(tracks) = fresh_value(&self.library, now_ms()) {
            return Ok(tracks);
        }
        let tracks = Arc::new(self.api.library_tracks().await?);
        info!("library cache refreshed: {} tracks", tracks.len());
        self.library = Some(CacheEntry::new(Arc::clone(&tracks), self.track_ttl_ms, now_ms()));
        Ok(tracks)
    }

    pub async fn playlist_tracks(&mut self, playlist_id: &str) -> Result<Arc<Vec<Track>>> {
        if let Some(tracks) = fresh_value(&self.playlists.get(playlist_id).cloned(), now_ms()) {
            return Ok(tracks);
        }
        let tracks = Arc::new(self.api.playlist_tracks(playlist_id).await?);
        info!(
            "playlist {} cache refreshed: {} tracks",
            playlist_id,
            tracks.len()
        );
        self.playlists.insert(
            playlist_id.to_string(),
            CacheEntry::new(Arc::clone(&tracks), self.track_ttl_ms, now_ms()),
        );
        Ok(tracks)
    }

    /// Playlist name/description/artwork. Never fails: a fetch error is
    /// logged and reported as `None`.
    pub async fn playlist_metadata(&mut self, playlist_id: &str) -> Option<PlaylistMetadata> {
        if let Some(meta) = fresh_value(&self.metadata.get(playlist_id).cloned(), now_ms()) {
            return Some(meta);
        }
        match self.api.playlist_metadata(playlist_id).await {
            Ok(meta) => {
                self.metadata.insert(
                    playlist_id.to_string(),
                    CacheEntry::new(meta.clone(), self.metadata_ttl_ms, now_ms()),
                );
                Some(meta)
            }
            Err(e) => {
                warn!("playlist {} metadata fetch failed: {}", playlist_id, e);
                None
            }
        }
    }

    /// Drops everything. Used when the session is replaced.
    pub fn clear(&mut self) {
        self.library = None;
        self.playlists.clear();
        self.metadata.clear();
    }
}
