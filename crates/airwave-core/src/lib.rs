pub mod cache;
pub mod config;
pub mod detector;
pub mod error;
pub mod platform;
pub mod selector;
pub mod station;
pub mod tokens;
pub mod track;

pub use error::{Error, Result};

/// Current wall-clock time in epoch milliseconds. All expiry bookkeeping
/// (tokens, cache entries) uses this one clock.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
