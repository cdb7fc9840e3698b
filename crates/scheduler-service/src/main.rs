//! Scheduler Service
//!
//! Runs the start-time notifier against the PostgreSQL meeting store.
//! The lifecycle operations are a library surface (`scheduler_service`)
//! embedded by the transport layer.
//!
//! # Startup
//!
//! 1. Initialize tracing (`LOG_FORMAT=json` for JSON output)
//! 2. Load configuration
//! 3. Install the Prometheus recorder when `METRICS_BIND_ADDRESS` is set
//! 4. Connect to PostgreSQL and apply migrations
//! 5. Spawn the start notifier
//! 6. Wait for SIGINT/SIGTERM, cancel, drain

use common::clock::SystemClock;
use scheduler_service::config::Config;
use scheduler_service::observability::metrics::init_metrics_recorder;
use scheduler_service::repositories::PgMeetingStore;
use scheduler_service::services::{HttpChatProvisioner, LoggingNotificationChannel};
use scheduler_service::tasks::{start_start_notifier, StartNotifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "scheduler_service=debug".into()),
    );
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting Scheduler Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        conflict_policy = %config.conflict_policy,
        notifier_tick_seconds = config.notifier_tick_seconds,
        start_window_seconds = config.start_window_seconds,
        chat_service_url = %config.chat_service_url,
        "Configuration loaded successfully"
    );

    if let Some(addr) = config.metrics_bind_address {
        info!(%addr, "Initializing Prometheus metrics recorder...");
        init_metrics_recorder(addr).map_err(|e| {
            error!(error = %e, "Failed to install Prometheus metrics recorder");
            format!("Failed to install Prometheus metrics recorder: {e}")
        })?;
    }

    // Initialize database connection pool with query timeout
    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to apply migrations: {}", e);
            e
        })?;

    info!("Database connection established");

    let chat = HttpChatProvisioner::new(
        config.chat_service_url.clone(),
        config.chat_service_token.clone(),
    )
    .map_err(|e| {
        error!("Failed to create chat client: {}", e);
        e
    })?;

    let notifier = Arc::new(StartNotifier::new(
        Arc::new(PgMeetingStore::new(db_pool.clone())),
        Arc::new(LoggingNotificationChannel),
        Arc::new(chat),
        Arc::new(SystemClock),
        config.start_notifier(),
    ));

    let shutdown_token = CancellationToken::new();
    let notifier_handle = tokio::spawn(start_start_notifier(notifier, shutdown_token.child_token()));
    info!("Start notifier started");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    shutdown_token.cancel();

    match tokio::time::timeout(Duration::from_secs(config.drain_seconds), notifier_handle).await {
        Ok(Ok(())) => info!("Start notifier drained"),
        Ok(Err(e)) => warn!(error = %e, "Start notifier task ended abnormally"),
        Err(_) => warn!(
            drain_seconds = config.drain_seconds,
            "Start notifier did not stop within drain period"
        ),
    }

    db_pool.close().await;

    info!("Scheduler Service shutdown complete");
    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
