//! Brokerage core background worker
//!
//! # Usage
//!
//! ```bash
//! BROKER_DATABASE_URL=postgres://... cargo run --bin brokerage-worker
//! ```
//!
//! # Environment Variables
//!
//! * `BROKER_DATABASE_URL` - PostgreSQL connection string
//! * `BROKER_MAX_CONNECTIONS` - Pool size (default: 10)
//! * `BROKER_DB_ACQUIRE_TIMEOUT_SECS` - Wait for a pool connection (default: 30)
//! * `BROKER_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//! * `BROKER_SYNC_INTERVAL_SECS` - Seconds between ticks (default: 300)
//! * `BROKER_POLICY_TERM_DAYS` - Days from issue to due date, at most 36500 (default: 365)
//! * `BROKER_STATUS_RETRY_LIMIT` - Status write attempts (default: 5)
//! * `BROKER_CONFIG_TIMEOUT_MS` - Configuration read timeout (default: 2000)
//! * `BROKER_REJECTION_RULE` - `ignore` or `revert_to_outstanding` (default: ignore)

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use infra_db::{create_pool, run_migrations};
use interface_worker::{build_worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().context("loading worker configuration")?;
    init_tracing(&config.log_level);

    tracing::info!(
        interval_secs = config.sync_interval_secs,
        rejection_rule = %config.rejection_rule,
        "Starting brokerage worker"
    );

    let pool = create_pool(config.database_config())
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;

    let worker = build_worker(pool, &config)?;
    worker.run(config.sync_interval(), shutdown_signal()).await;

    tracing::info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
