//! Domain events for the policy aggregate
//!
//! Events are accumulated on the [`crate::Policy`] while an operation runs
//! and drained by the lifecycle manager once the change is persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{PaymentId, PolicyId};
use domain_billing::PaymentStatus;

use crate::policy::PolicyStatus;

/// Domain events emitted by the Policy aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicyEvent {
    /// Policy and its line items were stored
    PolicyIssued {
        policy_id: PolicyId,
        number: i64,
        total_amount: Decimal,
        currency: String,
        change_factor: Decimal,
        timestamp: DateTime<Utc>,
    },

    /// Status moved after a payment event or the due date
    StatusChanged {
        policy_id: PolicyId,
        from: PolicyStatus,
        to: PolicyStatus,
        timestamp: DateTime<Utc>,
    },

    /// A payment against the policy was reported or reviewed
    PaymentRecorded {
        policy_id: PolicyId,
        payment_id: PaymentId,
        payment_status: PaymentStatus,
        timestamp: DateTime<Utc>,
    },
}

impl PolicyEvent {
    /// Returns the policy ID associated with this event
    pub fn policy_id(&self) -> PolicyId {
        match self {
            PolicyEvent::PolicyIssued { policy_id, .. } => *policy_id,
            PolicyEvent::StatusChanged { policy_id, .. } => *policy_id,
            PolicyEvent::PaymentRecorded { policy_id, .. } => *policy_id,
        }
    }

    /// Returns the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PolicyEvent::PolicyIssued { timestamp, .. } => *timestamp,
            PolicyEvent::StatusChanged { timestamp, .. } => *timestamp,
            PolicyEvent::PaymentRecorded { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            PolicyEvent::PolicyIssued { .. } => "PolicyIssued",
            PolicyEvent::StatusChanged { .. } => "StatusChanged",
            PolicyEvent::PaymentRecorded { .. } => "PaymentRecorded",
        }
    }
}
