//! Playback controller: the single owner of all playback state.
//!
//! Every external input funnels into one mpsc channel as a [`PlayerEvent`]:
//! SDK state snapshots from the watcher task, poll/token ticks, HTTP
//! commands, and the controller's own deferred events (ending retry, grace
//! expiry). The loop consumes them one at a time, so transition handling is
//! naturally single-flight; `ending_in_flight` is a plain field, not a lock.

use std::sync::Arc;
use std::time::Duration;

use airwave_core::config::Config;
use airwave_core::detector::{EndingDetector, EndingReason, PlaybackSnapshot};
use airwave_core::error::{Error, Result};
use airwave_core::selector::TrackSelector;
use airwave_core::station::{Station, StationKind};
use airwave_core::tokens::TokenStore;
use airwave_core::track::Track;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::ProviderApi;
use crate::catalog::Catalog;
use crate::driver::PlaybackDriver;
use crate::projection::Projection;
use crate::sdk::Sdk;

const MSG_EMPTY_PLAYLIST: &str = "No tracks found in this playlist.";
const MSG_EMPTY_LIBRARY: &str = "No liked songs found. Please like some songs to play this station.";
const MSG_NO_PLAYABLE: &str = "No playable tracks found in this playlist.";
const MSG_UNCONFIGURED: &str = "This station is not configured yet.";
const MSG_PODCAST: &str = "Podcasts are coming soon.";
const MSG_UNSUPPORTED: &str = "This station type is not supported.";
const MSG_ADVANCE_FAILED: &str = "Couldn't advance to the next track. Skip manually to continue.";
const MSG_SESSION_EXPIRED: &str = "Session expired. Please log in again.";

#[derive(Debug, Clone)]
pub enum PlayerCommand {
    PlayStation { station_id: String },
    Skip,
    SetVolume { volume: f32 },
    Pause,
    Resume,
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Snapshot pushed by the SDK watcher task.
    SdkState(PlaybackSnapshot),
    /// Slow safety-net poll.
    PollTick,
    /// Proactive token refresh check.
    TokenCheckTick,
    /// A command from the HTTP API.
    Command(PlayerCommand),
    /// Deferred second attempt after a failed transition.
    EndingRetry,
    /// Grace period after a transition expired.
    ClearEndingFlag,
    /// An authentication failure observed outside the loop.
    AuthError(String),
    Shutdown,
}

pub struct Controller<S: Sdk> {
    config: Config,
    stations: Vec<Station>,
    driver: PlaybackDriver<S>,
    catalog: Catalog,
    detector: EndingDetector,
    selector: TrackSelector,
    tokens: Arc<TokenStore>,
    projection: Projection,
    event_tx: mpsc::Sender<PlayerEvent>,
    current_station: Option<usize>,
    current_track: Option<Track>,
    /// True from ending detection until the post-transition grace expires.
    ending_in_flight: bool,
    target_volume: f32,
}

impl<S: Sdk> Controller<S> {
    pub fn new(
        config: Config,
        stations: Vec<Station>,
        sdk: Arc<S>,
        api: Arc<ProviderApi>,
        tokens: Arc<TokenStore>,
        projection: Projection,
        event_tx: mpsc::Sender<PlayerEvent>,
    ) -> Self {
        let driver = PlaybackDriver::new(sdk, config.timing.clone());
        let catalog = Catalog::new(api, &config.cache);
        let detector = EndingDetector::new(config.timing.clone());
        let target_volume = config.player.default_volume;
        Self {
            config,
            stations,
            driver,
            catalog,
            detector,
            selector: TrackSelector::new(),
            tokens,
            projection,
            event_tx,
            current_station: None,
            current_track: None,
            ending_in_flight: false,
            target_volume,
        }
    }

    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        info!("controller: starting event loop");

        // Safety-net poll ticker. The watcher covers the common case; this
        // catches endings the reactive rules miss.
        let poll_tx = self.event_tx.clone();
        let poll_interval = Duration::from_millis(self.config.timing.poll_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if poll_tx.send(PlayerEvent::PollTick).await.is_err() {
                    break;
                }
            }
        });

        let token_tx = self.event_tx.clone();
        let token_interval = Duration::from_secs(self.config.auth.refresh_check_secs);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(token_interval).await;
                if token_tx.send(PlayerEvent::TokenCheckTick).await.is_err() {
                    break;
                }
            }
        });

        loop {
            let evt = event_rx.recv().await;
            match evt {
                None => {
                    info!("controller: event channel closed, shutting down");
                    break;
                }

                Some(PlayerEvent::Shutdown) => {
                    info!("controller: shutdown requested");
                    break;
                }

                Some(PlayerEvent::SdkState(snap)) => {
                    self.handle_snapshot(snap).await;
                }

                Some(PlayerEvent::PollTick) => {
                    self.handle_poll_tick().await;
                }

                Some(PlayerEvent::TokenCheckTick) => {
                    let buffer = self.config.auth.refresh_buffer_ms;
                    match self.tokens.refresh_if_needed(buffer).await {
                        Ok(true) => debug!("tokens refreshed proactively"),
                        Ok(false) => {}
                        Err(e) => {
                            self.handle_auth_failure(e).await;
                        }
                    }
                }

                Some(PlayerEvent::Command(cmd)) => {
                    debug!("controller: command {:?}", cmd);
                    self.handle_command(cmd).await;
                }

                Some(PlayerEvent::EndingRetry) => {
                    self.handle_ending_retry().await;
                }

                Some(PlayerEvent::ClearEndingFlag) => {
                    debug!("controller: transition grace expired");
                    self.ending_in_flight = false;
                }

                Some(PlayerEvent::AuthError(msg)) => {
                    self.handle_auth_failure(Error::Authentication(msg)).await;
                }
            }
        }

        Ok(())
    }

    // ── snapshot / poll handling ─────────────────────────────────────────

    async fn handle_snapshot(&mut self, snap: PlaybackSnapshot) {
        self.projection.set_playing(!snap.paused).await;
        self.projection
            .set_progress(snap.position_ms, snap.duration_ms)
            .await;

        let reason = self.detector.observe(&snap);
        if self.ending_in_flight {
            // Detector state keeps tracking; triggers are swallowed until
            // the grace expires.
            return;
        }
        if let Some(reason) = reason {
            self.on_track_ending(reason).await;
        }
    }

    async fn handle_poll_tick(&mut self) {
        if self.ending_in_flight || self.current_station.is_none() {
            return;
        }
        let snap = match self.driver.sdk().state().await {
            Ok(Some(snap)) => snap,
            Ok(None) => return,
            Err(e) if e.is_auth() => {
                self.handle_auth_failure(e).await;
                return;
            }
            Err(e) => {
                debug!("poll state fetch failed: {}", e);
                return;
            }
        };
        if let Some(reason) = self.detector.poll(&snap) {
            self.on_track_ending(reason).await;
        }
    }

    // ── track ending ─────────────────────────────────────────────────────

    async fn on_track_ending(&mut self, reason: EndingReason) {
        if self.ending_in_flight {
            return;
        }
        self.ending_in_flight = true;
        info!("track ending detected: {}", reason.label());
        self.detector.reset_stall();

        // Stop the tail of the old track; failure here is harmless.
        if let Err(e) = self.driver.sdk().pause().await {
            debug!("pre-advance pause failed: {}", e);
        }

        // Let the device settle before issuing the next play.
        tokio::time::sleep(Duration::from_millis(self.config.timing.post_ending_delay_ms)).await;

        match self.advance().await {
            Ok(()) => self.finish_transition(),
            Err(e) if e.is_auth() => {
                // A recovered session still owes the user the next track:
                // the pause above froze playback short of every re-trigger
                // rule, so nothing else would restart it.
                let recovered = self.handle_auth_failure(e).await;
                self.ending_in_flight = false;
                if recovered {
                    self.schedule(
                        Duration::from_millis(self.config.timing.ending_retry_delay_ms),
                        PlayerEvent::EndingRetry,
                    );
                }
            }
            Err(e) => {
                warn!("advance failed: {}", e);
                self.ending_in_flight = false;
                self.schedule(
                    Duration::from_millis(self.config.timing.ending_retry_delay_ms),
                    PlayerEvent::EndingRetry,
                );
            }
        }
    }

    async fn handle_ending_retry(&mut self) {
        if self.ending_in_flight {
            // A newer transition took over while the retry was queued.
            return;
        }
        self.ending_in_flight = true;
        info!("retrying track advance");
        match self.advance().await {
            Ok(()) => self.finish_transition(),
            Err(e) => {
                error!("advance retry failed: {}", e);
                if e.is_auth() {
                    self.handle_auth_failure(e).await;
                } else {
                    self.projection.notify(MSG_ADVANCE_FAILED).await;
                }
                self.ending_in_flight = false;
            }
        }
    }

    /// Keeps `ending_in_flight` raised for a grace window so a late snapshot
    /// of the previous track cannot re-trigger a transition.
    fn finish_transition(&mut self) {
        self.schedule(
            Duration::from_millis(self.config.timing.ending_grace_ms),
            PlayerEvent::ClearEndingFlag,
        );
    }

    /// Picks and starts the next track on the current station, from the top.
    async fn advance(&mut self) -> Result<()> {
        let station = self
            .current_station
            .and_then(|i| self.stations.get(i))
            .cloned()
            .ok_or_else(|| Error::Content("no station selected".into()))?;

        let track = self.pick_track(&station).await?;
        self.driver.play_track(&track, 0).await?;
        self.set_current_track(track).await;
        Ok(())
    }

    /// Resolves the station's track pool and draws from it. Notifies the UI
    /// on empty or fully-unplayable pools before returning the error.
    async fn pick_track(&mut self, station: &Station) -> Result<Track> {
        let (pool, from_library) = match &station.kind {
            StationKind::Library => (self.catalog.library_tracks().await?, true),
            StationKind::Playlist { playlist_id: Some(id) } => {
                (self.catalog.playlist_tracks(id).await?, false)
            }
            StationKind::Playlist { playlist_id: None } => {
                self.projection.notify(MSG_UNCONFIGURED).await;
                return Err(Error::Content(format!("station '{}' has no playlist", station.id)));
            }
            // No native handling yet; keep the music going from the library.
            StationKind::Podcast | StationKind::Unsupported => {
                debug!("station '{}' kind has no pool, using library", station.id);
                (self.catalog.library_tracks().await?, true)
            }
        };

        if pool.is_empty() {
            let msg = if from_library { MSG_EMPTY_LIBRARY } else { MSG_EMPTY_PLAYLIST };
            self.projection.notify(msg).await;
            return Err(Error::Content(format!("station '{}' pool is empty", station.id)));
        }
        match self.selector.select(&pool) {
            Some(track) => Ok(track),
            None => {
                self.projection.notify(MSG_NO_PLAYABLE).await;
                Err(Error::Content(format!(
                    "station '{}' has no playable tracks",
                    station.id
                )))
            }
        }
    }

    async fn set_current_track(&mut self, track: Track) {
        self.projection.set_track(Some(&track)).await;
        self.projection.set_playing(true).await;
        self.detector.reset();
        self.current_track = Some(track);
    }

    // ── commands ─────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::PlayStation { station_id } => {
                match self.start_station(&station_id).await {
                    Ok(()) => {}
                    Err(e) if e.is_auth() => {
                        self.handle_auth_failure(e).await;
                    }
                    // Content errors already produced a specific notification.
                    Err(Error::Content(e)) => warn!("start station '{}': {}", station_id, e),
                    Err(e) => {
                        error!("start station '{}' failed: {}", station_id, e);
                        self.projection.notify("Couldn't start this station.").await;
                    }
                }
            }
            PlayerCommand::Skip => {
                // A manual skip overrides any pending transition.
                self.ending_in_flight = false;
                self.detector.reset();
                if let Err(e) = self.advance().await {
                    if e.is_auth() {
                        self.handle_auth_failure(e).await;
                    } else {
                        warn!("skip failed: {}", e);
                    }
                }
            }
            PlayerCommand::SetVolume { volume } => {
                let volume = volume.clamp(0.0, 1.0);
                self.target_volume = volume;
                if let Err(e) = self.driver.sdk().set_volume(volume).await {
                    warn!("set volume failed: {}", e);
                }
                self.projection.set_volume(volume).await;
            }
            PlayerCommand::Pause => {
                if let Err(e) = self.driver.sdk().pause().await {
                    warn!("pause failed: {}", e);
                } else {
                    self.projection.set_playing(false).await;
                }
            }
            PlayerCommand::Resume => {
                if let Err(e) = self.driver.sdk().resume().await {
                    warn!("resume failed: {}", e);
                } else {
                    self.projection.set_playing(true).await;
                }
            }
        }
    }

    /// Switches station and starts a fresh track at a random position with
    /// the mute-seek-fade transition.
    async fn start_station(&mut self, station_id: &str) -> Result<()> {
        let Some(idx) = self.stations.iter().position(|s| s.id == station_id) else {
            self.projection.notify("Unknown station.").await;
            return Ok(());
        };

        self.current_station = Some(idx);
        self.current_track = None;
        self.ending_in_flight = false;
        self.detector.reset();
        self.selector.clear();

        let station = self.stations[idx].clone();
        info!("starting station '{}'", station.name);
        self.projection.clear_notification().await;
        self.projection.set_station(Some(&station)).await;

        match &station.kind {
            StationKind::Podcast => {
                self.projection.notify(MSG_PODCAST).await;
                return Ok(());
            }
            StationKind::Unsupported => {
                self.projection.notify(MSG_UNSUPPORTED).await;
                return Ok(());
            }
            _ => {}
        }

        self.refresh_station_metadata(idx).await;

        let track = self.pick_track(&station).await?;

        let saved = self.driver.mute_for_transition().await;
        let restore = if saved > 0.01 { saved } else { self.target_volume };

        self.driver.play_track(&track, 0).await?;

        tokio::time::sleep(Duration::from_millis(self.config.timing.seek_delay_ms)).await;
        let position = random_position(&track, &mut rand::thread_rng(), &self.config);
        self.driver.seek(position).await;

        tokio::time::sleep(Duration::from_millis(
            self.config.timing.volume_restore_delay_ms,
        ))
        .await;
        self.driver.fade_back_in(restore).await;

        self.set_current_track(track).await;
        Ok(())
    }

    /// Pulls playlist name/artwork into the station list. Best-effort.
    async fn refresh_station_metadata(&mut self, idx: usize) {
        let Some(playlist_id) = self.stations[idx].playlist_id().map(|s| s.to_string()) else {
            return;
        };
        let Some(meta) = self.catalog.playlist_metadata(&playlist_id).await else {
            return;
        };
        let station = &mut self.stations[idx];
        if let Some(url) = meta.artwork_url() {
            station.artwork = url.to_string();
        }
        if let Some(desc) = meta.description.as_ref().filter(|d| !d.is_empty()) {
            station.description = desc.clone();
        }
        let station = self.stations[idx].clone();
        self.projection.update_station_view(&station).await;
    }

    // ── auth recovery ────────────────────────────────────────────────────

    /// Reactive path: an API call came back 401. One refresh attempt; if
    /// that also fails the session is already cleared and the user has to
    /// log in again. Returns true when the session was recovered.
    async fn handle_auth_failure(&mut self, cause: Error) -> bool {
        warn!("authentication failure: {}", cause);
        match self.tokens.refresh().await {
            Ok(_) => {
                info!("token refresh recovered the session");
                self.projection.set_auth_required(false).await;
                true
            }
            Err(e) => {
                error!("token refresh failed: {}", e);
                // The next login may be a different account.
                self.catalog.clear();
                self.projection.set_auth_required(true).await;
                self.projection.notify(MSG_SESSION_EXPIRED).await;
                false
            }
        }
    }

    fn schedule(&self, delay: Duration, event: PlayerEvent) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event).await;
        });
    }
}

/// Fresh station picks start somewhere in the middle of the track.
fn random_position<R: Rng>(track: &Track, rng: &mut R, config: &Config) -> i64 {
    if track.duration_ms <= 0 {
        return 0;
    }
    let frac = rng.gen_range(config.timing.random_position_min..config.timing.random_position_max);
    (track.duration_ms as f64 * frac) as i64
}

/// Pushes SDK snapshots into the controller at a fixed cadence.
pub fn spawn_state_watcher<S: Sdk>(
    sdk: Arc<S>,
    event_tx: mpsc::Sender<PlayerEvent>,
    interval_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            match sdk.state().await {
                Ok(Some(snap)) => {
                    if event_tx.send(PlayerEvent::SdkState(snap)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_auth() => {
                    if event_tx
                        .send(PlayerEvent::AuthError(e.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => debug!("watcher state fetch failed: {}", e),
            }
        }
    })
}
