use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a station draws its tracks from. Closed set, matched exhaustively
/// in the controller's dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StationKind {
    /// The user's saved-tracks library.
    Library,
    /// A specific playlist. `playlist_id` may be absent: the station is
    /// configured but not yet usable.
    Playlist {
        #[serde(default)]
        playlist_id: Option<String>,
    },
    /// Podcast / talk content, not yet supported.
    Podcast,
    /// Anything else; shown but never played.
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Artwork reference (bundled image path or URL). Cosmetic only.
    #[serde(default)]
    pub artwork: String,
    #[serde(flatten)]
    pub kind: StationKind,
}

impl Station {
    /// A playlist station without a configured playlist id is visible but
    /// not playable.
    pub fn playlist_id(&self) -> Option<&str> {
        match &self.kind {
            StationKind::Playlist { playlist_id } => playlist_id.as_deref(),
            _ => None,
        }
    }
}

/// Intermediate struct matching the TOML `[[station]]` table. Kept separate
/// from `Station` so the file schema can diverge from the runtime struct
/// without breaking either.
#[derive(Debug, Deserialize)]
struct TomlStationFile {
    station: Vec<TomlStation>,
}

#[derive(Debug, Deserialize)]
struct TomlStation {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    artwork: String,
    kind: String,
    #[serde(default)]
    playlist_id: Option<String>,
}

pub fn load_stations_from_toml(path: &Path) -> anyhow::Result<Vec<Station>> {
    let content = std::fs::read_to_string(path)?;
    parse_stations_from_toml_str(&content)
}

pub fn parse_stations_from_toml_str(content: &str) -> anyhow::Result<Vec<Station>> {
    let file: TomlStationFile = toml::from_str(content)?;
    let stations = file
        .station
        .into_iter()
        .map(|s| {
            let kind = match s.kind.as_str() {
                "library" => StationKind::Library,
                "playlist" => StationKind::Playlist {
                    playlist_id: s.playlist_id,
                },
                "podcast" => StationKind::Podcast,
                _ => StationKind::Unsupported,
            };
            Station {
                id: s.id,
                name: s.name,
                description: s.description,
                artwork: s.artwork,
                kind,
            }
        })
        .collect();
    Ok(stations)
}

/// Built-in station set, used when no stations file is present.
pub fn default_stations() -> Vec<Station> {
    fn playlist(id: &str, name: &str, desc: &str, art: &str, pl: Option<&str>) -> Station {
        Station {
            id: id.into(),
            name: name.into(),
            description: desc.into(),
            artwork: art.into(),
            kind: StationKind::Playlist {
                playlist_id: pl.map(Into::into),
            },
        }
    }

    vec![
        Station {
            id: "liked".into(),
            name: "Liked Songs".into(),
            description: "Your favorite tracks".into(),
            artwork: "stations/station-liked.webp".into(),
            kind: StationKind::Library,
        },
        playlist(
            "oldies",
            "Golden Oldies",
            "Classics from the 50s & 60s",
            "stations/station-oldies.png",
            None,
        ),
        playlist(
            "70s",
            "Groovy 70s",
            "Hits from the seventies",
            "stations/station-70s.png",
            None,
        ),
        playlist(
            "80s",
            "All Out 80s",
            "The unforgettable eighties",
            "stations/station-80s.png",
            Some("08k56nfGw0gD8t3oXz8ugt"),
        ),
        playlist(
            "90s",
            "90s Throwback",
            "Biggest hits of the nineties",
            "stations/station-90s.png",
            Some("5nCCpeCobBAoF91TwgQetX"),
        ),
        playlist("2k", "Y2K Hits", "Pop from the 2000s", "placeholder.jpg", None),
        playlist(
            "new",
            "Fresh Finds",
            "Latest music releases",
            "placeholder.jpg",
            None,
        ),
        playlist(
            "party",
            "Party Bangers",
            "High-energy anthems",
            "placeholder.jpg",
            None,
        ),
        playlist(
            "highschool",
            "HS Rewind",
            "Your high school soundtrack",
            "placeholder.jpg",
            None,
        ),
        Station {
            id: "talk".into(),
            name: "Talk & Podcasts".into(),
            description: "News, comedy & stories".into(),
            artwork: "placeholder.jpg".into(),
            kind: StationKind::Podcast,
        },
    ]
}
