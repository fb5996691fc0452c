//! Policy Aggregate Root
//!
//! The Policy aggregate is the consistency boundary for an issued contract
//! and its priced line items.
//!
//! # Invariants
//!
//! - `total_amount` and `total_insured_amount` equal the sums of the items
//! - Items and the change factor are snapshots taken at issue time
//! - `status` is the only field that changes after issue, and only through
//!   [`PolicyStatus::on`]
//!
//! # Status machine
//!
//! ```text
//! Outstanding -> PendingApproval -> Passed -> Expired
//!                      ^              |
//!                      +--------------+   (new pending payment)
//! Rejected, Expired: terminal
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    CoverageId, Money, PaymentId, PlanId, PolicyCoverageId, PolicyId, UsageId, UserId, VehicleId,
};
use domain_billing::{Payment, PaymentStatus};

use crate::error::PolicyError;
use crate::events::PolicyEvent;
use crate::quote::Quote;

/// Policy lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyStatus {
    /// Issued, no payment reported yet
    Outstanding,
    /// At least one payment is waiting for review
    PendingApproval,
    /// Paid in full
    Passed,
    /// Due date reached after being paid
    Expired,
    /// Closed by staff
    Rejected,
}

impl PolicyStatus {
    /// Persistent numeric code
    pub fn code(&self) -> i16 {
        match self {
            PolicyStatus::Outstanding => 0,
            PolicyStatus::PendingApproval => 1,
            PolicyStatus::Passed => 2,
            PolicyStatus::Expired => 3,
            PolicyStatus::Rejected => 4,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, PolicyError> {
        match code {
            0 => Ok(PolicyStatus::Outstanding),
            1 => Ok(PolicyStatus::PendingApproval),
            2 => Ok(PolicyStatus::Passed),
            3 => Ok(PolicyStatus::Expired),
            4 => Ok(PolicyStatus::Rejected),
            other => Err(PolicyError::validation(format!("unknown policy status code {other}"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PolicyStatus::Expired | PolicyStatus::Rejected)
    }

    /// Computes the state reached from `self` on `trigger`.
    ///
    /// Every (state, trigger) pair is covered; pairs without a rule leave the
    /// state unchanged.
    pub fn on(self, trigger: StatusTrigger, rule: RejectionRule) -> Transition {
        use PolicyStatus::*;
        use StatusTrigger::*;

        let next = match (self, trigger) {
            (Expired | Rejected, _) => self,

            (Outstanding | PendingApproval | Passed, PaymentPending) => PendingApproval,

            (Outstanding | PendingApproval | Passed, PaymentAccepted { others_pending: false }) => Passed,
            (Outstanding | PendingApproval | Passed, PaymentAccepted { others_pending: true }) => {
                PendingApproval
            }

            (PendingApproval, PaymentRejected { others_pending: false }) => match rule {
                RejectionRule::Ignore => PendingApproval,
                RejectionRule::RevertToOutstanding => Outstanding,
            },
            (Outstanding | PendingApproval | Passed, PaymentRejected { .. }) => self,

            (Passed, DueDateReached) => Expired,
            (Outstanding | PendingApproval, DueDateReached) => self,
        };

        if next == self {
            Transition::Unchanged(self)
        } else {
            Transition::Changed { from: self, to: next }
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyStatus::Outstanding => "OUTSTANDING",
            PolicyStatus::PendingApproval => "PENDING_APPROVAL",
            PolicyStatus::Passed => "PASSED",
            PolicyStatus::Expired => "EXPIRED",
            PolicyStatus::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

/// Events that can move a policy's status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTrigger {
    /// A payment was reported, or put back, as pending
    PaymentPending,
    /// A payment was accepted
    PaymentAccepted { others_pending: bool },
    /// A payment was rejected
    PaymentRejected { others_pending: bool },
    /// The policy's due date has passed
    DueDateReached,
}

impl StatusTrigger {
    /// Derives the trigger for `changed` given every payment of its policy.
    ///
    /// `payments` may or may not contain `changed`; its own entry never
    /// counts as "another" pending payment.
    pub fn from_payments(changed: &Payment, payments: &[Payment]) -> Self {
        let others_pending = payments
            .iter()
            .any(|p| p.id != changed.id && p.is_pending());
        match changed.status {
            PaymentStatus::Pending => StatusTrigger::PaymentPending,
            PaymentStatus::Accepted => StatusTrigger::PaymentAccepted { others_pending },
            PaymentStatus::Rejected => StatusTrigger::PaymentRejected { others_pending },
        }
    }
}

/// Outcome of applying a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed { from: PolicyStatus, to: PolicyStatus },
    Unchanged(PolicyStatus),
}

impl Transition {
    /// The state after the transition
    pub fn target(&self) -> PolicyStatus {
        match self {
            Transition::Changed { to, .. } => *to,
            Transition::Unchanged(status) => *status,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Transition::Changed { .. })
    }
}

/// What a rejected payment does to a policy awaiting approval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionRule {
    /// Leave the status alone
    #[default]
    Ignore,
    /// Return to `Outstanding` when no other payment is pending
    RevertToOutstanding,
}

impl std::str::FromStr for RejectionRule {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(RejectionRule::Ignore),
            "revert_to_outstanding" | "revert" => Ok(RejectionRule::RevertToOutstanding),
            other => Err(PolicyError::Configuration(format!("unknown rejection rule: {other}"))),
        }
    }
}

/// Who a policy is for, who sold it and who entered it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyParties {
    pub taker: UserId,
    pub adviser: UserId,
    pub created_by: UserId,
}

/// A line item waiting to be stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyItemDraft {
    pub coverage_id: CoverageId,
    pub insured_amount: Money,
    pub cost: Money,
}

/// A policy waiting to be stored
///
/// The store assigns the policy and item numbers and writes everything in
/// one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDraft {
    pub id: PolicyId,
    pub parties: PolicyParties,
    pub vehicle_id: VehicleId,
    pub plan_id: PlanId,
    pub usage_id: UsageId,
    pub total_amount: Money,
    pub total_insured_amount: Money,
    pub change_factor: Decimal,
    pub due_date: DateTime<Utc>,
    pub items: Vec<PolicyItemDraft>,
}

impl PolicyDraft {
    /// Snapshots a quote into a draft.
    ///
    /// # Errors
    ///
    /// `InvalidCoverageSelection` when the quote has no items.
    pub fn from_quote(
        quote: &Quote,
        parties: PolicyParties,
        vehicle_id: VehicleId,
        change_factor: Decimal,
        due_date: DateTime<Utc>,
    ) -> Result<Self, PolicyError> {
        if quote.is_empty() {
            return Err(PolicyError::invalid_selection(
                "no priced coverage available for this plan and usage",
            ));
        }
        Ok(Self {
            id: PolicyId::new_v7(),
            parties,
            vehicle_id,
            plan_id: quote.plan_id,
            usage_id: quote.usage_id,
            total_amount: quote.total_cost,
            total_insured_amount: quote.total_insured_amount,
            change_factor,
            due_date,
            items: quote
                .items
                .iter()
                .map(|item| PolicyItemDraft {
                    coverage_id: item.coverage_id,
                    insured_amount: item.insured_amount,
                    cost: item.cost,
                })
                .collect(),
        })
    }
}

/// A priced line item owned by one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCoverage {
    pub id: PolicyCoverageId,
    pub number: i64,
    pub coverage_id: CoverageId,
    pub insured_amount: Money,
    pub cost: Money,
}

/// The issued insurance contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    /// Sequential, store-assigned number
    pub number: i64,
    pub taker: UserId,
    pub adviser: UserId,
    pub created_by: UserId,
    pub vehicle_id: VehicleId,
    pub plan_id: PlanId,
    /// Usage class the policy was priced against
    pub usage_id: UsageId,
    pub status: PolicyStatus,
    pub total_amount: Money,
    pub total_insured_amount: Money,
    pub change_factor: Decimal,
    pub due_date: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped by the store on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<PolicyCoverage>,
    #[serde(skip)]
    events: Vec<PolicyEvent>,
}

/// A policy as read back from storage
///
/// Converts into [`Policy`] with no pending events.
#[derive(Debug, Clone)]
pub struct PolicyRecord {
    pub id: PolicyId,
    pub number: i64,
    pub taker: UserId,
    pub adviser: UserId,
    pub created_by: UserId,
    pub vehicle_id: VehicleId,
    pub plan_id: PlanId,
    pub usage_id: UsageId,
    pub status: PolicyStatus,
    pub total_amount: Money,
    pub total_insured_amount: Money,
    pub change_factor: Decimal,
    pub due_date: DateTime<Utc>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<PolicyCoverage>,
}

impl From<PolicyRecord> for Policy {
    fn from(record: PolicyRecord) -> Self {
        Self {
            id: record.id,
            number: record.number,
            taker: record.taker,
            adviser: record.adviser,
            created_by: record.created_by,
            vehicle_id: record.vehicle_id,
            plan_id: record.plan_id,
            usage_id: record.usage_id,
            status: record.status,
            total_amount: record.total_amount,
            total_insured_amount: record.total_insured_amount,
            change_factor: record.change_factor,
            due_date: record.due_date,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
            items: record.items,
            events: Vec::new(),
        }
    }
}

impl PartialEq for Policy {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.number == other.number
            && self.status == other.status
            && self.version == other.version
            && self.total_amount == other.total_amount
            && self.total_insured_amount == other.total_insured_amount
            && self.change_factor == other.change_factor
            && self.items == other.items
    }
}

impl Policy {
    /// Builds the stored form of a draft.
    ///
    /// `item_numbers` are paired with the draft's items in order.
    pub fn from_draft(
        draft: PolicyDraft,
        number: i64,
        item_numbers: impl IntoIterator<Item = i64>,
        now: DateTime<Utc>,
    ) -> Self {
        let items = draft
            .items
            .into_iter()
            .zip(item_numbers)
            .map(|(item, number)| PolicyCoverage {
                id: PolicyCoverageId::new_v7(),
                number,
                coverage_id: item.coverage_id,
                insured_amount: item.insured_amount,
                cost: item.cost,
            })
            .collect();
        Self {
            id: draft.id,
            number,
            taker: draft.parties.taker,
            adviser: draft.parties.adviser,
            created_by: draft.parties.created_by,
            vehicle_id: draft.vehicle_id,
            plan_id: draft.plan_id,
            usage_id: draft.usage_id,
            status: PolicyStatus::Outstanding,
            total_amount: draft.total_amount,
            total_insured_amount: draft.total_insured_amount,
            change_factor: draft.change_factor,
            due_date: draft.due_date,
            version: 1,
            created_at: now,
            updated_at: now,
            items,
            events: Vec::new(),
        }
    }

    /// Records the issue event; called once the policy is stored
    pub fn mark_issued(&mut self) {
        self.events.push(PolicyEvent::PolicyIssued {
            policy_id: self.id,
            number: self.number,
            total_amount: self.total_amount.amount(),
            currency: self.total_amount.currency().to_string(),
            change_factor: self.change_factor,
            timestamp: Utc::now(),
        });
    }

    /// Applies a trigger to the in-memory status.
    ///
    /// The caller persists a changed status; `version` is left to the store.
    pub fn apply(&mut self, trigger: StatusTrigger, rule: RejectionRule) -> Transition {
        let transition = self.status.on(trigger, rule);
        if let Transition::Changed { from, to } = transition {
            let now = Utc::now();
            self.status = to;
            self.updated_at = now;
            self.events.push(PolicyEvent::StatusChanged {
                policy_id: self.id,
                from,
                to,
                timestamp: now,
            });
        }
        transition
    }

    pub fn note_payment(&mut self, payment_id: PaymentId, payment_status: PaymentStatus) {
        self.events.push(PolicyEvent::PaymentRecorded {
            policy_id: self.id,
            payment_id,
            payment_status,
            timestamp: Utc::now(),
        });
    }

    /// Returns true when the stored totals equal the sums of the items
    pub fn totals_match_items(&self) -> bool {
        let currency = self.total_amount.currency();
        let cost = Money::checked_sum(currency, self.items.iter().map(|i| &i.cost));
        let insured = Money::checked_sum(currency, self.items.iter().map(|i| &i.insured_amount));
        matches!((cost, insured), (Ok(c), Ok(i)) if c == self.total_amount && i == self.total_insured_amount)
    }

    /// Returns true when the policy has passed its due date at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date <= now
    }

    pub fn events(&self) -> &[PolicyEvent] {
        &self.events
    }

    /// Drains the accumulated events
    pub fn take_events(&mut self) -> Vec<PolicyEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [PolicyStatus; 5] = [
        PolicyStatus::Outstanding,
        PolicyStatus::PendingApproval,
        PolicyStatus::Passed,
        PolicyStatus::Expired,
        PolicyStatus::Rejected,
    ];

    fn all_triggers() -> Vec<StatusTrigger> {
        vec![
            StatusTrigger::PaymentPending,
            StatusTrigger::PaymentAccepted { others_pending: false },
            StatusTrigger::PaymentAccepted { others_pending: true },
            StatusTrigger::PaymentRejected { others_pending: false },
            StatusTrigger::PaymentRejected { others_pending: true },
            StatusTrigger::DueDateReached,
        ]
    }

    #[test]
    fn test_terminal_states_ignore_everything() {
        for state in [PolicyStatus::Expired, PolicyStatus::Rejected] {
            for trigger in all_triggers() {
                for rule in [RejectionRule::Ignore, RejectionRule::RevertToOutstanding] {
                    assert_eq!(state.on(trigger, rule), Transition::Unchanged(state));
                }
            }
        }
    }

    #[test]
    fn test_reapplying_a_trigger_is_a_no_op() {
        for state in ALL_STATES {
            for trigger in all_triggers() {
                let once = state.on(trigger, RejectionRule::default()).target();
                let twice = once.on(trigger, RejectionRule::default());
                assert!(!twice.is_change(), "{state} then {trigger:?} toggled again");
            }
        }
    }

    #[test]
    fn test_pending_then_accepted() {
        let pending = PolicyStatus::Outstanding.on(StatusTrigger::PaymentPending, RejectionRule::Ignore);
        assert_eq!(
            pending,
            Transition::Changed {
                from: PolicyStatus::Outstanding,
                to: PolicyStatus::PendingApproval
            }
        );
        let accepted = pending
            .target()
            .on(StatusTrigger::PaymentAccepted { others_pending: false }, RejectionRule::Ignore);
        assert_eq!(accepted.target(), PolicyStatus::Passed);
    }

    #[test]
    fn test_rejection_rule() {
        let trigger = StatusTrigger::PaymentRejected { others_pending: false };
        assert_eq!(
            PolicyStatus::PendingApproval.on(trigger, RejectionRule::Ignore),
            Transition::Unchanged(PolicyStatus::PendingApproval)
        );
        assert_eq!(
            PolicyStatus::PendingApproval.on(trigger, RejectionRule::RevertToOutstanding).target(),
            PolicyStatus::Outstanding
        );
        let with_others = StatusTrigger::PaymentRejected { others_pending: true };
        assert!(!PolicyStatus::PendingApproval
            .on(with_others, RejectionRule::RevertToOutstanding)
            .is_change());
    }

    #[test]
    fn test_only_passed_expires() {
        assert_eq!(
            PolicyStatus::Passed.on(StatusTrigger::DueDateReached, RejectionRule::Ignore).target(),
            PolicyStatus::Expired
        );
        assert!(!PolicyStatus::Outstanding
            .on(StatusTrigger::DueDateReached, RejectionRule::Ignore)
            .is_change());
    }

    #[test]
    fn test_status_codes() {
        for state in ALL_STATES {
            assert_eq!(PolicyStatus::from_code(state.code()).unwrap(), state);
        }
        assert!(PolicyStatus::from_code(5).is_err());
    }

    #[test]
    fn test_rejection_rule_parse() {
        assert_eq!("ignore".parse::<RejectionRule>().unwrap(), RejectionRule::Ignore);
        assert_eq!(
            "REVERT_TO_OUTSTANDING".parse::<RejectionRule>().unwrap(),
            RejectionRule::RevertToOutstanding
        );
        assert!("reject".parse::<RejectionRule>().is_err());
    }
}
