//! Brokerage Worker
//!
//! Wires the PostgreSQL adapters into the domain services and runs the
//! periodic jobs.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_worker::{build_worker, config::WorkerConfig};
//!
//! let config = WorkerConfig::from_env()?;
//! let pool = infra_db::create_pool(config.database_config()).await?;
//! let worker = build_worker(pool, &config)?;
//! worker.run(config.sync_interval(), shutdown).await;
//! ```

pub mod config;
pub mod error;
pub mod jobs;

use std::sync::Arc;

use core_kernel::{ConfigStore, StoreExchangeRateProvider};
use domain_billing::ExchangeRateService;
use domain_policy::{DefaultAdviserResolver, PolicyLifecycleManager, QuoteEngine};
use infra_db::adapters::{
    PostgresCatalogAdapter, PostgresConfigStore, PostgresExchangeRateAdapter,
    PostgresPaymentAdapter, PostgresPolicyAdapter, PostgresUserDirectory, PostgresVehicleAdapter,
};
use infra_db::DatabasePool;

pub use crate::config::WorkerConfig;
pub use crate::error::WorkerError;
pub use crate::jobs::{TickReport, Worker};

/// Builds the lifecycle manager over PostgreSQL adapters
pub fn build_lifecycle(
    pool: DatabasePool,
    config: &WorkerConfig,
) -> Result<PolicyLifecycleManager, WorkerError> {
    let store: Arc<dyn ConfigStore> = Arc::new(PostgresConfigStore::new(pool.clone()));
    let quotes = QuoteEngine::new(
        Arc::new(PostgresCatalogAdapter::new(pool.clone())),
        config.quote_currency()?,
    );
    let advisers = DefaultAdviserResolver::new(
        store.clone(),
        Arc::new(PostgresUserDirectory::new(pool.clone())),
    )
    .with_timeout(config.config_timeout());
    let rates = StoreExchangeRateProvider::new(store).with_timeout(config.config_timeout());

    Ok(PolicyLifecycleManager::new(
        quotes,
        Arc::new(PostgresVehicleAdapter::new(pool.clone())),
        Arc::new(PostgresPolicyAdapter::new(pool.clone())),
        Arc::new(PostgresPaymentAdapter::new(pool)),
        Arc::new(rates),
        advisers,
    )
    .with_settings(config.lifecycle_settings()?))
}

/// Builds the worker over PostgreSQL adapters
pub fn build_worker(pool: DatabasePool, config: &WorkerConfig) -> Result<Worker, WorkerError> {
    let lifecycle = build_lifecycle(pool.clone(), config)?;
    let rates = ExchangeRateService::new(
        Arc::new(PostgresExchangeRateAdapter::new(pool.clone())),
        Arc::new(PostgresConfigStore::new(pool)),
    );
    Ok(Worker::new(rates, Arc::new(lifecycle)))
}
