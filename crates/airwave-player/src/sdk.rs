//! Playback device seam.
//!
//! The controller never talks to a concrete device directly; everything goes
//! through [`Sdk`]. The production implementation drives a Connect device via
//! the Web API, tests substitute a recording mock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use airwave_core::config::PlayerConfig;
use airwave_core::detector::PlaybackSnapshot;
use airwave_core::error::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::ProviderApi;

pub trait Sdk: Send + Sync + 'static {
    /// Current playback snapshot, `None` when nothing is loaded.
    fn state(&self) -> impl Future<Output = Result<Option<PlaybackSnapshot>>> + Send;
    /// Make this device the active playback target without starting audio.
    fn activate(&self) -> impl Future<Output = Result<()>> + Send;
    fn play(&self, uris: &[String], position_ms: i64) -> impl Future<Output = Result<()>> + Send;
    fn resume(&self) -> impl Future<Output = Result<()>> + Send;
    fn pause(&self) -> impl Future<Output = Result<()>> + Send;
    fn seek(&self, position_ms: i64) -> impl Future<Output = Result<()>> + Send;
    /// Volume in 0.0..=1.0.
    fn volume(&self) -> impl Future<Output = Result<f32>> + Send;
    fn set_volume(&self, volume: f32) -> impl Future<Output = Result<()>> + Send;
}

/// Connect-device implementation. Finds the configured device, claims it,
/// and forwards every call to the Web API with the device id pinned.
pub struct ConnectSdk {
    api: Arc<ProviderApi>,
    device_id: String,
    /// Last volume we saw or set. The device report omits volume while
    /// inactive, so this fills the gap.
    last_volume: Mutex<f32>,
}

impl ConnectSdk {
    /// Polls the device list until the configured device shows up, then
    /// claims it. Gives up after `connect_timeout_ms`.
    pub async fn connect(api: Arc<ProviderApi>, cfg: &PlayerConfig) -> Result<Self> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(cfg.connect_timeout_ms);
        loop {
            let devices = api.devices().await?;
            let found = devices
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(&cfg.device_name))
                .or_else(|| devices.iter().find(|d| d.is_active));
            if let Some(dev) = found {
                let Some(id) = dev.id.clone() else {
                    return Err(Error::Playback(format!(
                        "device '{}' has no usable id",
                        dev.name
                    )));
                };
                info!("using playback device '{}' ({})", dev.name, id);
                api.transfer_playback(&id).await?;
                let volume = dev
                    .volume_percent
                    .map(|p| p as f32 / 100.0)
                    .unwrap_or(cfg.default_volume);
                return Ok(Self {
                    api,
                    device_id: id,
                    last_volume: Mutex::new(volume),
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Playback(format!(
                    "no playback device named '{}' appeared within {}ms",
                    cfg.device_name, cfg.connect_timeout_ms
                )));
            }
            debug!("device '{}' not listed yet, retrying", cfg.device_name);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

impl Sdk for ConnectSdk {
    async fn state(&self) -> Result<Option<PlaybackSnapshot>> {
        let state = self.api.playback_state().await?;
        if let Some(pct) = state
            .as_ref()
            .and_then(|s| s.device.as_ref())
            .and_then(|d| d.volume_percent)
        {
            *self.last_volume.lock().await = pct as f32 / 100.0;
        }
        Ok(state.and_then(|s| s.snapshot()))
    }

    async fn activate(&self) -> Result<()> {
        self.api.transfer_playback(&self.device_id).await
    }

    async fn play(&self, uris: &[String], position_ms: i64) -> Result<()> {
        self.api.play(&self.device_id, uris, position_ms).await
    }

    async fn resume(&self) -> Result<()> {
        self.api.resume(&self.device_id).await
    }

    async fn pause(&self) -> Result<()> {
        self.api.pause(&self.device_id).await
    }

    async fn seek(&self, position_ms: i64) -> Result<()> {
        self.api.seek(&self.device_id, position_ms).await
    }

    async fn volume(&self) -> Result<f32> {
        Ok(*self.last_volume.lock().await)
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        let clamped = volume.clamp(0.0, 1.0);
        let pct = (clamped * 100.0).round() as u32;
        if let Err(e) = self.api.set_volume(&self.device_id, pct).await {
            warn!("set_volume({}) failed: {}", pct, e);
            return Err(e);
        }
        *self.last_volume.lock().await = clamped;
        Ok(())
    }
}
