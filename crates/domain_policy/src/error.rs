//! Policy domain errors
//!
//! This module defines all error types that can occur while quoting,
//! issuing policies and propagating payment statuses.

use std::fmt;

use thiserror::Error;

use core_kernel::{CoverageId, MoneyError, PlanId, PolicyId, PortError, UsageId};
use domain_billing::BillingError;

/// Errors that can occur in the policy domain
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Requested coverages have no priced rate-table row for the plan and usage
    #[error("No rate for plan {plan_id}, usage {usage_id}, coverages [{}]", join(.coverages))]
    RateNotFound {
        plan_id: PlanId,
        usage_id: UsageId,
        coverages: Vec<CoverageId>,
    },

    /// The coverage selection cannot produce a policy
    #[error("Invalid coverage selection: {0}")]
    InvalidCoverageSelection(String),

    /// The plan is inactive or not sold for the usage class
    #[error("Plan {plan_id} is not available for usage {usage_id}")]
    UsageNotPermitted {
        plan_id: PlanId,
        usage_id: UsageId,
    },

    /// A status update kept losing to concurrent writers
    #[error("Status of policy {policy_id} still conflicting after {attempts} attempts")]
    ConcurrencyConflict {
        policy_id: PolicyId,
        attempts: u32,
    },

    /// A configuration-store value is present but unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Financial calculation error
    #[error("Financial error: {0}")]
    Financial(#[from] MoneyError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Persistence failures, propagated unmodified
    #[error(transparent)]
    Port(#[from] PortError),
}

impl PolicyError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        PolicyError::Validation(message.into())
    }

    /// Creates an invalid coverage selection error
    pub fn invalid_selection(message: impl Into<String>) -> Self {
        PolicyError::InvalidCoverageSelection(message.into())
    }

    /// Returns true for caller mistakes, as opposed to infrastructure failures
    pub fn is_client_error(&self) -> bool {
        match self {
            PolicyError::RateNotFound { .. }
            | PolicyError::InvalidCoverageSelection(_)
            | PolicyError::UsageNotPermitted { .. }
            | PolicyError::Validation(_) => true,
            PolicyError::Port(e) => e.is_not_found() || matches!(e, PortError::Validation { .. }),
            PolicyError::Billing(e) => !matches!(e, BillingError::Port(_)),
            PolicyError::ConcurrencyConflict { .. }
            | PolicyError::Configuration(_)
            | PolicyError::Financial(_) => false,
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_not_found_lists_every_coverage() {
        let missing = vec![CoverageId::new(), CoverageId::new()];
        let err = PolicyError::RateNotFound {
            plan_id: PlanId::new(),
            usage_id: UsageId::new(),
            coverages: missing.clone(),
        };
        let message = err.to_string();
        for id in missing {
            assert!(message.contains(&id.to_string()));
        }
        assert!(err.is_client_error());
    }

    #[test]
    fn test_port_errors_pass_through() {
        let err: PolicyError = PortError::connection("db down").into();
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "Connection error: db down");
    }
}
