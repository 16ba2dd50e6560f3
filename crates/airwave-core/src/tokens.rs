//! Access/refresh token storage and the proactive refresh policy.
//!
//! Tokens persist across restarts as a small JSON file (the session-cache
//! analogue of the browser's local storage, same key names). The in-memory
//! copy lives behind an `Arc<RwLock>` so the API client always reads the
//! newest access token; concurrent refreshes are tolerated; both write a
//! full token set and the last write wins.

use crate::error::{Error, Result};
use crate::now_ms;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at_ms: i64,
}

impl TokenSet {
    pub fn from_expires_in(access_token: String, refresh_token: Option<String>, expires_in_secs: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at_ms: now_ms() + expires_in_secs * 1000,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at_ms
    }

    /// Proactive policy: refresh before the token is actually dead, so an
    /// expired token is never presented to the API.
    pub fn needs_refresh(&self, now: i64, buffer_ms: i64) -> bool {
        self.expires_at_ms - now < buffer_ms
    }
}

/// On-disk layout. Key names and the string-typed expiry are kept for
/// compatibility with previously persisted sessions
/// (`access_token`, `token_expires_at`, `refresh_token`).
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTokens {
    access_token: String,
    token_expires_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl PersistedTokens {
    fn into_token_set(self) -> Option<TokenSet> {
        let expires_at_ms = self.token_expires_at.parse().ok()?;
        Some(TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at_ms,
        })
    }

    fn from_token_set(t: &TokenSet) -> Self {
        Self {
            access_token: t.access_token.clone(),
            token_expires_at: t.expires_at_ms.to_string(),
            refresh_token: t.refresh_token.clone(),
        }
    }
}

/// Success payload from the relay's refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub type SharedTokens = Arc<RwLock<Option<TokenSet>>>;

pub struct TokenStore {
    path: PathBuf,
    relay_url: String,
    http: reqwest::Client,
    current: SharedTokens,
}

impl TokenStore {
    pub fn new(path: PathBuf, relay_url: String) -> Self {
        Self {
            path,
            relay_url,
            http: reqwest::Client::new(),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Shared in-memory token cell, read by the API client on every call.
    pub fn shared(&self) -> SharedTokens {
        Arc::clone(&self.current)
    }

    pub async fn current(&self) -> Option<TokenSet> {
        self.current.read().await.clone()
    }

    /// Load persisted tokens. An unexpired set becomes current; an expired
    /// set with a refresh token triggers one refresh attempt; anything else
    /// means the session is unauthenticated.
    pub async fn bootstrap(&self) -> Result<Option<TokenSet>> {
        match self.load_persisted() {
            Some(tokens) if !tokens.is_expired(now_ms()) => {
                info!("token store: loaded valid persisted tokens");
                *self.current.write().await = Some(tokens.clone());
                Ok(Some(tokens))
            }
            Some(tokens) if tokens.refresh_token.is_some() => {
                info!("token store: persisted tokens expired, refreshing");
                *self.current.write().await = Some(tokens);
                let refreshed = self.refresh().await?;
                Ok(Some(refreshed))
            }
            _ => Ok(None),
        }
    }

    fn load_persisted(&self) -> Option<TokenSet> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let persisted: PersistedTokens = serde_json::from_str(&content).ok()?;
        persisted.into_token_set()
    }

    /// Write tokens to persistent storage and the in-memory cell.
    pub async fn store(&self, tokens: TokenSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Configuration(format!("token store dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(&PersistedTokens::from_token_set(&tokens))
            .map_err(|e| Error::Configuration(format!("token encode: {e}")))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| Error::Configuration(format!("token store write: {e}")))?;
        *self.current.write().await = Some(tokens);
        Ok(())
    }

    /// Drop tokens from memory and disk. Missing file is fine.
    pub async fn clear(&self) {
        *self.current.write().await = None;
        let _ = tokio::fs::remove_file(&self.path).await;
    }

    /// Exchange the refresh token at the relay for a fresh access token.
    /// A non-success response clears all stored tokens: the session is no
    /// longer authenticated and the user must sign in again.
    pub async fn refresh(&self) -> Result<TokenSet> {
        let refresh_token = {
            let guard = self.current.read().await;
            guard.as_ref().and_then(|t| t.refresh_token.clone())
        }
        .ok_or_else(|| Error::Authentication("no refresh token".into()))?;

        let url = format!("{}/auth/refresh", self.relay_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if !response.status().is_success() {
            let reason = response
                .json::<RefreshError>()
                .await
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or_else(|| "token refresh failed".into());
            warn!("token store: refresh rejected: {reason}");
            self.clear().await;
            return Err(Error::Authentication(reason));
        }

        let body: RefreshResponse = response.json().await?;
        // The provider may withhold a new refresh token; keep the one we
        // just submitted.
        let tokens = TokenSet::from_expires_in(
            body.access_token,
            body.refresh_token.or(Some(refresh_token)),
            body.expires_in,
        );
        self.store(tokens.clone()).await?;
        info!("token store: access token refreshed");
        Ok(tokens)
    }

    /// Periodic check: refresh when time-to-expiry drops below the buffer.
    /// Returns true when a refresh actually ran.
    pub async fn refresh_if_needed(&self, buffer_ms: i64) -> Result<bool> {
        let due = {
            let guard = self.current.read().await;
            match guard.as_ref() {
                Some(t) if t.refresh_token.is_some() => t.needs_refresh(now_ms(), buffer_ms),
                _ => false,
            }
        };
        if due {
            self.refresh().await?;
        }
        Ok(due)
    }
}
