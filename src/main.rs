//! grouprelay: Telegram media-group debouncing relay.
//!
//! Main entry point. Loads configuration, selects the group store and sink,
//! starts the debounce engine and serves webhooks until a shutdown signal,
//! then flushes buffered groups before exiting.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use grouprelay_api::{create_router, shutdown_signal, start_server, AppState, Config};
use grouprelay_core::{Clock, GroupStore, MemoryGroupStore, PostgresGroupStore, RealClock};
use grouprelay_delivery::{DebounceEngine, HttpSink, Sink, UnconfiguredSink};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting grouprelay");
    info!(
        database_url = config.database_url_masked().as_deref().unwrap_or("<memory>"),
        sink_configured = config.sink_url().is_some(),
        telegram_bot_token = config.telegram_bot_token_masked().as_deref().unwrap_or("<unset>"),
        webhook_path = %config.webhook_path,
        debounce_window_ms = config.debounce_window_ms,
        sweep_interval_secs = config.sweep_interval_secs,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());

    let (store, db_pool): (Arc<dyn GroupStore>, Option<PgPool>) = match &config.database_url {
        Some(url) => {
            let pool = create_database_pool(url, config.database_max_connections).await?;
            info!("Database connection pool established");

            let store = PostgresGroupStore::new(pool.clone());
            store.migrate().await.context("Failed to prepare group store schema")?;
            info!("Group store schema ready");

            (Arc::new(store), Some(pool))
        },
        None => {
            warn!("DATABASE_URL not set, buffering media groups in memory");
            (Arc::new(MemoryGroupStore::with_clock(clock.clone())), None)
        },
    };

    let sink: Arc<dyn Sink> = match config.sink_url() {
        Some(url) => Arc::new(
            HttpSink::new(url, config.to_client_config()).context("Invalid sink configuration")?,
        ),
        None => {
            warn!("No sink URL configured, deliveries will fail until SINK_URL is set");
            Arc::new(UnconfiguredSink)
        },
    };

    let engine = DebounceEngine::new(store, sink, clock.clone(), config.to_engine_config());
    engine.start();

    let addr = config.parse_server_addr()?;
    let state = AppState::new(engine.clone(), clock, config.sink_url().is_some());
    let app = create_router(state, &config.to_router_config());

    info!(%addr, path = %config.webhook_path, "grouprelay is ready to receive updates");

    if let Err(e) = start_server(app, addr, shutdown_signal()).await {
        error!(error = %e, "Server failed");
    }

    info!("Flushing buffered media groups");
    if let Err(e) = engine.shutdown(config.shutdown_timeout()).await {
        warn!(error = %e, "Some groups may not have been delivered");
    }

    if let Some(pool) = db_pool {
        pool.close().await;
        info!("Database connections closed");
    }

    info!("grouprelay shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
///
/// `RUST_LOG` wins when set; otherwise `base_level` applies, with debug
/// output for grouprelay and tower-http.
fn init_tracing(base_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{base_level},grouprelay=debug,tower_http=debug")))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(url: &str, max_connections: u32) -> Result<PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .execute(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}
