use serde::{Deserialize, Serialize};

/// A playable track as returned by the provider. Only the fields the
/// player consumes are modeled; everything else in the provider payload is
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub album: Option<Album>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl Track {
    /// Deleted and region-blocked tracks come back without a URI; they can
    /// never be handed to the playback driver.
    pub fn is_playable(&self) -> bool {
        self.uri.as_deref().map(|u| !u.is_empty()).unwrap_or(false)
    }

    pub fn artist_line(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Largest album image, if any (provider lists largest first).
    pub fn artwork_url(&self) -> Option<&str> {
        self.album
            .as_ref()
            .and_then(|a| a.images.first())
            .map(|i| i.url.as_str())
    }
}

/// Paged list wrapper. Both saved-tracks and playlist-tracks responses nest
/// the track one level down; playlist items may carry a null track.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackPage {
    #[serde(default)]
    pub items: Vec<TrackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackItem {
    #[serde(default)]
    pub track: Option<Track>,
}

impl TrackPage {
    /// Unwrap items into tracks, dropping null entries. Playability is NOT
    /// filtered here; the selector owns that rule.
    pub fn into_tracks(self) -> Vec<Track> {
        self.items.into_iter().filter_map(|i| i.track).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub tracks: Option<PlaylistTrackRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistTrackRef {
    #[serde(default)]
    pub total: u32,
}

impl PlaylistMetadata {
    pub fn artwork_url(&self) -> Option<&str> {
        self.images.first().map(|i| i.url.as_str())
    }
}
