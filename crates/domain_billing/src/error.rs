//! Billing domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{PortError, TemporalError};

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Payment not found
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Payment amounts must be strictly positive
    #[error("Invalid payment amount: {0}")]
    InvalidAmount(Decimal),

    /// Exchange rates must be positive
    #[error("Invalid exchange rate: {0}")]
    InvalidRate(Decimal),

    /// A stored numeric code does not name any known value
    #[error("Unknown {kind} code: {code}")]
    UnknownCode {
        kind: &'static str,
        code: i16,
    },

    #[error("Invalid period: {0}")]
    Temporal(#[from] TemporalError),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Port(#[from] PortError),
}
