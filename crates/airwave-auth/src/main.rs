//! OAuth relay. The player never sees the client secret: login redirects
//! through here, the code exchange happens here, and refreshes POST here.
//! Tokens travel back to the app in the URL fragment so they never hit
//! server logs.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SCOPES: &[&str] = &[
    "streaming",
    "user-read-email",
    "user-read-private",
    "user-modify-playback-state",
    "user-read-playback-state",
    "playlist-read-private",
    "playlist-read-collaborative",
    "user-library-read",
    "user-library-modify",
];

#[derive(Clone)]
struct RelayConfig {
    client_id: Option<String>,
    client_secret: Option<String>,
    /// Where the browser app lives; also the base of the callback URL.
    public_url: String,
    authorize_url: String,
    token_url: String,
}

impl RelayConfig {
    fn from_env() -> Self {
        Self {
            client_id: std::env::var("AIRWAVE_CLIENT_ID").ok(),
            client_secret: std::env::var("AIRWAVE_CLIENT_SECRET").ok(),
            public_url: std::env::var("AIRWAVE_PUBLIC_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8990".to_string()),
            authorize_url: std::env::var("AIRWAVE_AUTHORIZE_URL")
                .unwrap_or_else(|_| "https://accounts.spotify.com/authorize".to_string()),
            token_url: std::env::var("AIRWAVE_TOKEN_URL")
                .unwrap_or_else(|_| "https://accounts.spotify.com/api/token".to_string()),
        }
    }

    fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.public_url.trim_end_matches('/'))
    }

    /// Missing credentials are reported per request, not at startup, so the
    /// relay can still serve a diagnostic instead of refusing to boot.
    fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.client_id.as_deref()?, self.client_secret.as_deref()?))
    }
}

#[derive(Clone)]
struct RelayState {
    config: RelayConfig,
    http: reqwest::Client,
}

fn scope_string() -> String {
    SCOPES.join(" ")
}

fn authorize_url(config: &RelayConfig, client_id: &str) -> String {
    format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&scope={}",
        config.authorize_url,
        urlencoding::encode(client_id),
        urlencoding::encode(&config.callback_url()),
        urlencoding::encode(&scope_string()),
    )
}

/// Token payloads ride the fragment: browsers never send it to servers.
fn success_fragment(app_url: &str, body: &Value) -> String {
    let access = body["access_token"].as_str().unwrap_or_default();
    let expires = body["expires_in"].as_i64().unwrap_or(3600);
    let mut fragment = format!(
        "{}/#access_token={}&expires_in={}",
        app_url.trim_end_matches('/'),
        urlencoding::encode(access),
        expires,
    );
    if let Some(refresh) = body["refresh_token"].as_str() {
        fragment.push_str(&format!("&refresh_token={}", urlencoding::encode(refresh)));
    }
    fragment
}

fn error_fragment(app_url: &str, reason: &str) -> String {
    format!(
        "{}/#error={}",
        app_url.trim_end_matches('/'),
        urlencoding::encode(reason)
    )
}

// ── handlers ─────────────────────────────────────────────────────────────

async fn login(State(state): State<RelayState>) -> axum::response::Response {
    let Some((client_id, _)) = state.config.credentials() else {
        error!("login requested but client credentials are not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Auth relay is missing its client credentials.",
        )
            .into_response();
    };
    Redirect::temporary(&authorize_url(&state.config, client_id)).into_response()
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(state): State<RelayState>,
    Query(q): Query<CallbackQuery>,
) -> Redirect {
    let app_url = state.config.public_url.clone();

    if let Some(e) = q.error {
        warn!("authorization denied: {}", e);
        return Redirect::temporary(&error_fragment(&app_url, &e));
    }
    let Some(code) = q.code else {
        return Redirect::temporary(&error_fragment(&app_url, "missing_code"));
    };
    let Some((client_id, client_secret)) = state.config.credentials() else {
        error!("callback received but client credentials are not configured");
        return Redirect::temporary(&error_fragment(&app_url, "server_config_error"));
    };

    let result = state
        .http
        .post(&state.config.token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", &state.config.callback_url()),
        ])
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
            Ok(body) => {
                info!("code exchange succeeded");
                Redirect::temporary(&success_fragment(&app_url, &body))
            }
            Err(e) => {
                error!("token response was not JSON: {}", e);
                Redirect::temporary(&error_fragment(&app_url, "token_exchange_failed"))
            }
        },
        Ok(resp) => {
            error!("code exchange rejected: HTTP {}", resp.status());
            Redirect::temporary(&error_fragment(&app_url, "token_exchange_failed"))
        }
        Err(e) => {
            error!("code exchange request failed: {}", e);
            Redirect::temporary(&error_fragment(&app_url, "token_exchange_failed"))
        }
    }
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    State(state): State<RelayState>,
    Json(req): Json<RefreshRequest>,
) -> (StatusCode, Json<Value>) {
    let Some((client_id, client_secret)) = state.config.credentials() else {
        error!("refresh requested but client credentials are not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "server_config_error" })),
        );
    };

    let result = state
        .http
        .post(&state.config.token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", req.refresh_token.as_str()),
        ])
        .send()
        .await;

    match result {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let body = resp
                .json::<Value>()
                .await
                .unwrap_or_else(|_| json!({ "error": "invalid_provider_response" }));
            if !status.is_success() {
                warn!("refresh rejected: HTTP {} {}", status, body["error"]);
            }
            (status, Json(body))
        }
        Err(e) => {
            error!("refresh request failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "provider_unreachable" })),
            )
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = airwave_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("auth.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,airwave_auth=debug")),
        )
        .init();

    let config = RelayConfig::from_env();
    if config.credentials().is_none() {
        warn!("AIRWAVE_CLIENT_ID / AIRWAVE_CLIENT_SECRET not set; requests will fail");
    }

    let bind_address =
        std::env::var("AIRWAVE_AUTH_BIND").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("AIRWAVE_AUTH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8990);

    let state = RelayState {
        config,
        http: reqwest::Client::new(),
    };

    let app = Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/refresh", post(refresh))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("auth relay listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
