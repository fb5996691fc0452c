//! Worker error handling

use thiserror::Error;

use domain_billing::BillingError;
use domain_policy::PolicyError;
use infra_db::DatabaseError;

/// Errors surfaced by the worker
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),
}
