use std::sync::Arc;

use airwave_core::config::Config;
use airwave_core::station::{default_stations, load_stations_from_toml};
use airwave_core::tokens::{TokenSet, TokenStore};
use airwave_player::api::ProviderApi;
use airwave_player::controller::{spawn_state_watcher, Controller, PlayerEvent};
use airwave_player::http;
use airwave_player::projection::Projection;
use airwave_player::sdk::ConnectSdk;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup file logging
    let data_dir = airwave_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("player.log");

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
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,airwave_player=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let stations = if config.stations.stations_toml.exists() {
        load_stations_from_toml(&config.stations.stations_toml)?
    } else {
        default_stations()
    };
    info!("{} stations loaded", stations.len());

    // Token bootstrap: environment first, then the persisted session.
    let token_store = Arc::new(TokenStore::new(
        config.auth.token_file.clone(),
        config.auth.relay_url.clone(),
    ));
    if let Ok(access_token) = std::env::var("AIRWAVE_ACCESS_TOKEN") {
        let refresh_token = std::env::var("AIRWAVE_REFRESH_TOKEN").ok();
        let expires_in: i64 = std::env::var("AIRWAVE_EXPIRES_IN")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);
        token_store
            .store(TokenSet::from_expires_in(access_token, refresh_token, expires_in))
            .await?;
        info!("session taken from environment");
    } else if token_store.bootstrap().await?.is_none() {
        eprintln!("No session found.");
        eprintln!(
            "Log in via the auth relay ({}/auth/login), then either re-run with",
            config.auth.relay_url
        );
        eprintln!("AIRWAVE_ACCESS_TOKEN / AIRWAVE_REFRESH_TOKEN set, or keep the");
        eprintln!("relay running so the persisted session can be refreshed.");
        std::process::exit(1);
    }

    let api = Arc::new(ProviderApi::new(&config.api, token_store.shared()));

    // Event channel: all external inputs funnel into the controller
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<PlayerEvent>(256);

    let projection = Projection::new(&stations, config.player.default_volume);

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            projection.clone(),
            event_tx.clone(),
        );
    } else {
        warn!("HTTP API disabled; only log output will be visible");
    }

    info!("connecting to playback device '{}'", config.player.device_name);
    let sdk = Arc::new(ConnectSdk::connect(Arc::clone(&api), &config.player).await?);

    // Ctrl-C drains through the event loop so the controller exits cleanly.
    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(PlayerEvent::Shutdown).await;
        }
    });

    let _watcher = spawn_state_watcher(
        Arc::clone(&sdk),
        event_tx.clone(),
        config.timing.watcher_interval_ms,
    );

    let controller = Controller::new(
        config,
        stations,
        sdk,
        api,
        token_store,
        projection,
        event_tx.clone(),
    );

    info!("player initialised, running event loop");
    controller.run(event_rx).await?;

    Ok(())
}
