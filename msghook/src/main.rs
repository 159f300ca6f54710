//! msghook server - HTTP entry point.
//!
//! Loads configuration, opens and migrates the SQLite store, installs the
//! Prometheus recorder, and serves the router until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use msghook::web::{install_recorder, router, spawn_upkeep};
use msghook::{AppState, Config, LogFormat, MessageStore};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error
    dotenv::dotenv().ok();

    let (config, invalid_env) = Config::from_env();
    init_tracing(&config);

    info!("web_server_starting");
    for var in &invalid_env {
        var.log();
    }
    info!(
        host = %config.host,
        port = config.port,
        webhook_secret_configured = config.is_webhook_secret_configured(),
        db_max_connections = config.db_max_connections,
        request_timeout_secs = config.request_timeout_secs,
        log_format = ?config.log_format,
        "config_loaded"
    );

    if !config.is_webhook_secret_configured() {
        warn!("webhook_secret_not_configured");
    }

    // Open the database and apply migrations
    let store = MessageStore::connect(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    store
        .migrate()
        .await
        .context("Failed to apply database migrations")?;

    let metrics = install_recorder().context("Failed to install metrics recorder")?;
    let upkeep = spawn_upkeep(metrics.clone());

    // Create application state and router
    let state = AppState::new(config.clone(), store.clone(), metrics);
    let app = router(state);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    upkeep.abort();
    store.pool().close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `LOG_LEVEL`.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true))
            .init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
