//! Playback driver: issues device commands and verifies they stuck.
//!
//! The provider occasionally accepts a play command and then leaves the
//! device idle or paused, so every play is settle-checked and retried a
//! bounded number of times. Volume transitions (mute, fade-in) also live
//! here so the controller stays a pure event loop.

use std::sync::Arc;
use std::time::Duration;

use airwave_core::config::TimingConfig;
use airwave_core::error::{Error, Result};
use airwave_core::track::Track;
use tracing::{debug, info, warn};

use crate::sdk::Sdk;

pub struct PlaybackDriver<S: Sdk> {
    sdk: Arc<S>,
    tuning: TimingConfig,
}

impl<S: Sdk> PlaybackDriver<S> {
    pub fn new(sdk: Arc<S>, tuning: TimingConfig) -> Self {
        Self { sdk, tuning }
    }

    pub fn sdk(&self) -> &Arc<S> {
        &self.sdk
    }

    /// Starts `track` at `position_ms` and confirms audio is actually
    /// running. Retries up to `play_retries` extra attempts; the device is
    /// re-activated before each retry in case the claim was lost.
    pub async fn play_track(&self, track: &Track, position_ms: i64) -> Result<()> {
        let uri = track
            .uri
            .clone()
            .ok_or_else(|| Error::Playback(format!("track '{}' has no uri", track.name)))?;
        let uris = vec![uri];

        let attempts = self.tuning.play_retries + 1;
        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!("play attempt {}/{} for '{}'", attempt, attempts, track.name);
                if let Err(e) = self.sdk.activate().await {
                    warn!("device re-activation failed: {}", e);
                }
            }
            match self.sdk.play(&uris, position_ms).await {
                Ok(()) => {}
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!("play command failed: {}", e);
                    continue;
                }
            }

            tokio::time::sleep(Duration::from_millis(self.tuning.play_settle_ms)).await;
            match self.sdk.state().await {
                Ok(Some(snap)) if !snap.paused => {
                    info!("playing '{}' at {}ms", track.name, position_ms);
                    return Ok(());
                }
                Ok(Some(snap)) if snap.track_id.is_some() => {
                    // Loaded but sitting paused. A resume is usually enough.
                    debug!("track loaded but paused, resuming");
                    if self.sdk.resume().await.is_ok() {
                        tokio::time::sleep(Duration::from_millis(self.tuning.play_settle_ms))
                            .await;
                        if let Ok(Some(snap)) = self.sdk.state().await {
                            if !snap.paused {
                                info!("playing '{}' after resume", track.name);
                                return Ok(());
                            }
                        }
                    }
                }
                Ok(_) => debug!("no playback state after play command"),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => warn!("settle check failed: {}", e),
            }
        }

        Err(Error::Playback(format!(
            "track '{}' did not start after {} attempts",
            track.name, attempts
        )))
    }

    /// Best-effort seek. A failed seek leaves the track playing from the
    /// start, which is preferable to aborting the transition.
    pub async fn seek(&self, position_ms: i64) {
        if let Err(e) = self.sdk.seek(position_ms).await {
            warn!("seek to {}ms failed: {}", position_ms, e);
        }
    }

    /// Mutes the device and returns the volume to restore afterwards.
    pub async fn mute_for_transition(&self) -> f32 {
        let saved = self.sdk.volume().await.unwrap_or(1.0);
        if let Err(e) = self.sdk.set_volume(0.0).await {
            warn!("mute failed: {}", e);
        }
        saved
    }

    /// Steps the volume back up to `target`. The last step always sets the
    /// exact target, so a failed intermediate step cannot strand the device
    /// at partial volume.
    pub async fn fade_back_in(&self, target: f32) {
        let steps = self.tuning.fade_steps.max(1);
        let step_delay = Duration::from_millis(self.tuning.fade_duration_ms / steps as u64);
        for i in 1..steps {
            let level = target * (i as f32 / steps as f32);
            if let Err(e) = self.sdk.set_volume(level).await {
                debug!("fade step {} failed: {}", i, e);
            }
            tokio::time::sleep(step_delay).await;
        }
        if let Err(e) = self.sdk.set_volume(target).await {
            warn!("volume restore to {:.2} failed: {}", target, e);
        }
    }
}
