use thiserror::Error;

/// Error taxonomy for the player. Each variant maps to a distinct recovery
/// policy in the controller: configuration errors are fatal, authentication
/// errors trigger a token refresh (or a re-login prompt when refresh fails),
/// network errors are retried with backoff, content errors become user
/// notifications, playback errors are retried a bounded number of times.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication required: {0}")]
    Authentication(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("no playable content: {0}")]
    Content(String),

    #[error("playback command failed: {0}")]
    Playback(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl Error {
    /// True when the caller should clear the session and prompt a re-login.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Authentication(_))
    }
}
