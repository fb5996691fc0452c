//! Worker configuration
//!
//! Read from `BROKER_*` environment variables (after `.env` is loaded by the
//! binary). Every field has a default, so an empty environment yields a
//! working local setup.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use core_kernel::Currency;
use domain_policy::{LifecycleSettings, RejectionRule, MAX_POLICY_TERM_DAYS};
use infra_db::DatabaseConfig;

use crate::error::WorkerError;

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Pool upper bound
    pub max_connections: u32,
    /// Seconds a query waits for a free pool connection
    pub db_acquire_timeout_secs: u64,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Seconds between worker ticks
    pub sync_interval_secs: u64,
    /// Days from issue to due date
    pub policy_term_days: i64,
    /// Attempts at a policy status write before giving up
    pub status_retry_limit: u32,
    /// Bound on a single configuration-store read
    pub config_timeout_ms: u64,
    /// `ignore` or `revert_to_outstanding`
    pub rejection_rule: String,
    /// Currency premiums are quoted in
    pub quote_currency: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/brokerage".to_string(),
            max_connections: 10,
            db_acquire_timeout_secs: 30,
            log_level: "info".to_string(),
            sync_interval_secs: 300,
            policy_term_days: 365,
            status_retry_limit: 5,
            config_timeout_ms: 2000,
            rejection_rule: "ignore".to_string(),
            quote_currency: "USD".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from `BROKER_*` environment variables
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::load(config::Environment::with_prefix("BROKER"))
    }

    /// Loads configuration from an arbitrary `config` source
    pub fn load<S>(source: S) -> Result<Self, WorkerError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let loaded: WorkerConfig = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), WorkerError> {
        if self.sync_interval_secs == 0 {
            return Err(WorkerError::InvalidConfig("sync_interval_secs must be positive".into()));
        }
        if self.max_connections == 0 || self.db_acquire_timeout_secs == 0 {
            return Err(WorkerError::InvalidConfig(
                "max_connections and db_acquire_timeout_secs must be positive".into(),
            ));
        }
        if !(1..=MAX_POLICY_TERM_DAYS).contains(&self.policy_term_days) {
            return Err(WorkerError::InvalidConfig(format!(
                "policy_term_days must be between 1 and {MAX_POLICY_TERM_DAYS}"
            )));
        }
        self.rejection_rule()?;
        self.quote_currency()?;
        Ok(())
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.db_acquire_timeout_secs))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn config_timeout(&self) -> Duration {
        Duration::from_millis(self.config_timeout_ms)
    }

    pub fn rejection_rule(&self) -> Result<RejectionRule, WorkerError> {
        Ok(RejectionRule::from_str(&self.rejection_rule)?)
    }

    pub fn quote_currency(&self) -> Result<Currency, WorkerError> {
        Currency::from_str(&self.quote_currency)
            .map_err(|e| WorkerError::InvalidConfig(format!("quote_currency: {e}")))
    }

    /// Settings handed to the lifecycle manager
    pub fn lifecycle_settings(&self) -> Result<LifecycleSettings, WorkerError> {
        Ok(LifecycleSettings {
            policy_term_days: self.policy_term_days,
            max_status_retries: self.status_retry_limit,
            rejection_rule: self.rejection_rule()?,
        })
    }
}
