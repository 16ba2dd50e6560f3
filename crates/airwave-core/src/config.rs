use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub stations: StationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Device name announced to the provider; playback is transferred to
    /// the provider device carrying this name.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// How long to wait for the playback device to appear before giving up.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Page size for saved-tracks / playlist-tracks fetches.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for linear retry backoff (delay = base * attempt).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// A 429 `Retry-After` above this is surfaced as an error instead of
    /// being waited out in place.
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the auth relay (airwave-auth).
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    /// Refresh when time-to-expiry drops below this buffer.
    #[serde(default = "default_refresh_buffer_ms")]
    pub refresh_buffer_ms: i64,
    /// Cadence of the proactive refresh check.
    #[serde(default = "default_refresh_check_secs")]
    pub refresh_check_secs: u64,
    /// File the token set persists to (survives restarts).
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for library / playlist track lists.
    #[serde(default = "default_track_ttl_ms")]
    pub track_ttl_ms: i64,
    /// TTL for playlist metadata (changes far less often than tracks).
    #[serde(default = "default_metadata_ttl_ms")]
    pub metadata_ttl_ms: i64,
}

/// Empirically tuned timing knobs for ending detection and transitions.
/// These are deliberately configuration, not constants: they track provider
/// latency, which shifts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Reactive rule: paused with less than this much remaining counts as
    /// an ending.
    #[serde(default = "default_near_end_ms")]
    pub near_end_ms: i64,
    /// Negative tolerance on remaining time (position can overshoot
    /// duration by a rounding hair).
    #[serde(default = "default_end_tolerance_ms")]
    pub end_tolerance_ms: i64,
    /// Proactive rule: playing with less than this much remaining triggers
    /// the transition before the provider's own end event fires.
    #[serde(default = "default_early_trigger_ms")]
    pub early_trigger_ms: i64,
    /// Failsafe for the poll path: trigger regardless of pause state.
    #[serde(default = "default_failsafe_ms")]
    pub failsafe_ms: i64,
    /// Position delta below this is a stall observation.
    #[serde(default = "default_stall_delta_ms")]
    pub stall_delta_ms: i64,
    /// Consecutive stall observations before declaring a stall.
    #[serde(default = "default_stall_checks")]
    pub stall_checks: u32,
    /// Stalls only count as endings within this window of the end.
    #[serde(default = "default_stall_window_ms")]
    pub stall_window_ms: i64,
    /// Fraction of duration treated as "near the end" for the reset rule.
    #[serde(default = "default_reset_end_pct")]
    pub reset_end_pct: f64,
    /// Fraction of duration treated as "near zero" for the reset rule.
    #[serde(default = "default_reset_start_pct")]
    pub reset_start_pct: f64,
    /// Proactive poll interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Reactive snapshot watcher interval.
    #[serde(default = "default_watcher_interval_ms")]
    pub watcher_interval_ms: u64,
    /// Delay between detecting an ending and issuing the next-track play.
    #[serde(default = "default_post_ending_delay_ms")]
    pub post_ending_delay_ms: u64,
    /// Grace period before clearing the in-flight flag after a successful
    /// advance (absorbs trailing duplicate events from the old track).
    #[serde(default = "default_ending_grace_ms")]
    pub ending_grace_ms: u64,
    /// Delay before the single automatic retry of a failed advance.
    #[serde(default = "default_ending_retry_delay_ms")]
    pub ending_retry_delay_ms: u64,
    /// Additional full play_track attempts after the first fails.
    #[serde(default = "default_play_retries")]
    pub play_retries: u32,
    /// Settle time between issuing play and re-reading state.
    #[serde(default = "default_play_settle_ms")]
    pub play_settle_ms: u64,
    /// Delay before seeking to the random start offset.
    #[serde(default = "default_seek_delay_ms")]
    pub seek_delay_ms: u64,
    /// Delay between the seek and starting the fade back in.
    #[serde(default = "default_volume_restore_delay_ms")]
    pub volume_restore_delay_ms: u64,
    #[serde(default = "default_fade_duration_ms")]
    pub fade_duration_ms: u64,
    #[serde(default = "default_fade_steps")]
    pub fade_steps: u32,
    /// Fresh station picks start somewhere in this fractional window of
    /// the track duration.
    #[serde(default = "default_random_position_min")]
    pub random_position_min: f64,
    #[serde(default = "default_random_position_max")]
    pub random_position_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Path to a `[[station]]` TOML file. Falls back to the built-in
    /// station set when absent.
    #[serde(default = "default_stations_toml")]
    pub stations_toml: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            default_volume: default_volume(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            page_limit: default_page_limit(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            refresh_buffer_ms: default_refresh_buffer_ms(),
            refresh_check_secs: default_refresh_check_secs(),
            token_file: default_token_file(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            track_ttl_ms: default_track_ttl_ms(),
            metadata_ttl_ms: default_metadata_ttl_ms(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            near_end_ms: default_near_end_ms(),
            end_tolerance_ms: default_end_tolerance_ms(),
            early_trigger_ms: default_early_trigger_ms(),
            failsafe_ms: default_failsafe_ms(),
            stall_delta_ms: default_stall_delta_ms(),
            stall_checks: default_stall_checks(),
            stall_window_ms: default_stall_window_ms(),
            reset_end_pct: default_reset_end_pct(),
            reset_start_pct: default_reset_start_pct(),
            poll_interval_ms: default_poll_interval_ms(),
            watcher_interval_ms: default_watcher_interval_ms(),
            post_ending_delay_ms: default_post_ending_delay_ms(),
            ending_grace_ms: default_ending_grace_ms(),
            ending_retry_delay_ms: default_ending_retry_delay_ms(),
            play_retries: default_play_retries(),
            play_settle_ms: default_play_settle_ms(),
            seek_delay_ms: default_seek_delay_ms(),
            volume_restore_delay_ms: default_volume_restore_delay_ms(),
            fade_duration_ms: default_fade_duration_ms(),
            fade_steps: default_fade_steps(),
            random_position_min: default_random_position_min(),
            random_position_max: default_random_position_max(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            stations_toml: default_stations_toml(),
        }
    }
}

fn default_device_name() -> String {
    "Airwave".to_string()
}

fn default_volume() -> f32 {
    0.5
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_page_limit() -> u32 {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_rate_limit_wait_secs() -> u64 {
    30
}

fn default_relay_url() -> String {
    "http://127.0.0.1:8990".to_string()
}

fn default_refresh_buffer_ms() -> i64 {
    300_000
}

fn default_refresh_check_secs() -> u64 {
    60
}

fn default_token_file() -> PathBuf {
    platform::data_dir().join("tokens.json")
}

fn default_track_ttl_ms() -> i64 {
    300_000
}

fn default_metadata_ttl_ms() -> i64 {
    1_800_000
}

fn default_near_end_ms() -> i64 {
    1000
}

fn default_end_tolerance_ms() -> i64 {
    100
}

fn default_early_trigger_ms() -> i64 {
    1200
}

fn default_failsafe_ms() -> i64 {
    500
}

fn default_stall_delta_ms() -> i64 {
    100
}

fn default_stall_checks() -> u32 {
    3
}

fn default_stall_window_ms() -> i64 {
    2000
}

fn default_reset_end_pct() -> f64 {
    0.85
}

fn default_reset_start_pct() -> f64 {
    0.10
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_watcher_interval_ms() -> u64 {
    1000
}

fn default_post_ending_delay_ms() -> u64 {
    500
}

fn default_ending_grace_ms() -> u64 {
    5000
}

fn default_ending_retry_delay_ms() -> u64 {
    1000
}

fn default_play_retries() -> u32 {
    2
}

fn default_play_settle_ms() -> u64 {
    500
}

fn default_seek_delay_ms() -> u64 {
    500
}

fn default_volume_restore_delay_ms() -> u64 {
    200
}

fn default_fade_duration_ms() -> u64 {
    300
}

fn default_fade_steps() -> u32 {
    10
}

fn default_random_position_min() -> f64 {
    0.2
}

fn default_random_position_max() -> f64 {
    0.5
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8991
}

fn default_stations_toml() -> PathBuf {
    platform::config_dir().join("stations.toml")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
