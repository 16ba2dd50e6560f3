//! HTTP client wrapper with bounded retries and 429 handling.
//!
//! Every provider call goes through [`RateLimitedClient::send`]. The bearer
//! token is attached per attempt, so a refresh that lands between retries is
//! picked up without rebuilding the request.

use std::time::Duration;

use airwave_core::config::ApiConfig;
use airwave_core::error::{Error, Result};
use airwave_core::tokens::SharedTokens;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub struct RateLimitedClient {
    http: Client,
    tokens: SharedTokens,
    max_retries: u32,
    retry_delay: Duration,
    max_rate_limit_wait_secs: u64,
}

impl RateLimitedClient {
    pub fn new(cfg: &ApiConfig, tokens: SharedTokens) -> Self {
        Self {
            http: Client::new(),
            tokens,
            max_retries: cfg.max_retries.max(1),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            max_rate_limit_wait_secs: cfg.max_rate_limit_wait_secs,
        }
    }

    pub fn request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Sends the request, retrying transient failures with linear backoff.
    ///
    /// 429 responses wait out `Retry-After` (default 1s) without consuming a
    /// retry; a `Retry-After` beyond the configured bound is surfaced as
    /// [`Error::RateLimited`] instead of stalling the caller. 401 responses
    /// surface immediately as an authentication error so the caller can
    /// refresh and re-issue.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let mut attempt: u32 = 1;
        loop {
            let rb = builder
                .try_clone()
                .ok_or_else(|| Error::Network("request body is not cloneable".into()))?;

            let token = {
                let guard = self.tokens.read().await;
                guard
                    .as_ref()
                    .map(|t| t.access_token.clone())
                    .ok_or_else(|| Error::Authentication("no access token".into()))?
            };

            match rb.bearer_auth(token).send().await {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = retry_after_secs(&resp);
                    if wait > self.max_rate_limit_wait_secs {
                        return Err(Error::RateLimited { retry_after_secs: wait });
                    }
                    warn!("rate limited, waiting {}s", wait);
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    // Deliberately does not count against the retry budget.
                }
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                    return Err(Error::Authentication("access token rejected".into()));
                }
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if attempt >= self.max_retries {
                        return Err(Error::Network(format!("HTTP {} after {} attempts", status, attempt)));
                    }
                    debug!("HTTP {} (attempt {}/{}), retrying", status, attempt, self.max_retries);
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Network(format!("{} after {} attempts", e, attempt)));
                    }
                    debug!("request error (attempt {}/{}): {}", attempt, self.max_retries, e);
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.send(self.request(reqwest::Method::GET, url)).await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::Network(format!("bad response body: {}", e)))
    }
}

fn retry_after_secs(resp: &Response) -> u64 {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(1)
}
