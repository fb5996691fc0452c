//! Policy Lifecycle Manager
//!
//! Issues policies from quotes and moves their status in response to
//! payment events and the passage of the due date.
//!
//! Status writes use a compare-and-set on the policy version. A lost update
//! re-reads the policy and its payments and tries again, up to
//! [`LifecycleSettings::max_status_retries`] attempts.
//!
//! Every payment insert or review also bumps the policy version before the
//! status is re-derived. A decision taken from a payment list that has since
//! grown or changed therefore loses its compare-and-set and is retried.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    BankId, CoverageId, Currency, ExchangeRateProvider, Money, PaymentId, PlanId, PolicyId, UserId,
    VehicleId,
};
use domain_billing::{NewPayment, Payment, PaymentMethod, PaymentPort, PaymentStatus};

use crate::adviser::DefaultAdviserResolver;
use crate::error::PolicyError;
use crate::events::PolicyEvent;
use crate::policy::{Policy, PolicyDraft, PolicyParties, RejectionRule, StatusTrigger, Transition};
use crate::ports::{PolicyPort, VehiclePort};
use crate::quote::QuoteEngine;

/// Longest accepted policy term, about a century
pub const MAX_POLICY_TERM_DAYS: i64 = 36_500;

/// Tunables injected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Days from issue to due date
    pub policy_term_days: i64,
    /// Attempts at a status write before giving up
    pub max_status_retries: u32,
    pub rejection_rule: RejectionRule,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            policy_term_days: 365,
            max_status_retries: 5,
            rejection_rule: RejectionRule::Ignore,
        }
    }
}

/// Request to issue a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePolicy {
    pub plan_id: PlanId,
    pub vehicle_id: VehicleId,
    pub taker: UserId,
    /// Falls back to the configured default, then the web user
    pub adviser: Option<UserId>,
    pub created_by: UserId,
    /// Absent or empty means the plan's effective coverage set
    pub coverage_selection: Option<Vec<CoverageId>>,
}

/// Request to report a payment against a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPayment {
    pub policy_id: PolicyId,
    pub method: PaymentMethod,
    pub bank_id: Option<BankId>,
    pub reference: String,
    pub coin: Currency,
    /// Defaults to the policy total, converted into `coin` when needed
    pub amount: Option<Decimal>,
    pub user_id: Option<UserId>,
    pub commentary: Option<String>,
}

/// Staff verdict on a pending payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentDecision {
    Accept,
    Reject { commentary: Option<String> },
}

/// Coordinates issuance and status propagation
pub struct PolicyLifecycleManager {
    quotes: QuoteEngine,
    vehicles: Arc<dyn VehiclePort>,
    policies: Arc<dyn PolicyPort>,
    payments: Arc<dyn PaymentPort>,
    rates: Arc<dyn ExchangeRateProvider>,
    advisers: DefaultAdviserResolver,
    settings: LifecycleSettings,
}

impl PolicyLifecycleManager {
    pub fn new(
        quotes: QuoteEngine,
        vehicles: Arc<dyn VehiclePort>,
        policies: Arc<dyn PolicyPort>,
        payments: Arc<dyn PaymentPort>,
        rates: Arc<dyn ExchangeRateProvider>,
        advisers: DefaultAdviserResolver,
    ) -> Self {
        Self {
            quotes,
            vehicles,
            policies,
            payments,
            rates,
            advisers,
            settings: LifecycleSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    pub fn quotes(&self) -> &QuoteEngine {
        &self.quotes
    }

    /// Prices the vehicle's usage under the plan and stores the result as a
    /// new `Outstanding` policy.
    ///
    /// # Errors
    ///
    /// * `UsageNotPermitted` - the plan is not sold for the vehicle's usage
    /// * `RateNotFound` / `InvalidCoverageSelection` - from pricing, or an
    ///   empty quote
    /// * `Configuration` - the default adviser setting is unusable, or the
    ///   configured term is out of range
    /// * `Port` - storage failures; nothing is written
    #[instrument(skip(self, request), fields(plan_id = %request.plan_id, vehicle_id = %request.vehicle_id))]
    pub async fn issue_policy(&self, request: IssuePolicy) -> Result<Policy, PolicyError> {
        let adviser = self.advisers.resolve(request.adviser).await?;
        let change_factor = self.rates.current_factor().await?;
        let vehicle = self.vehicles.get_vehicle(request.vehicle_id).await?;

        let quote = self
            .quotes
            .price(
                request.plan_id,
                vehicle.usage_id,
                request.coverage_selection.as_deref(),
            )
            .await?;

        let due = due_date(Utc::now(), self.settings.policy_term_days)?;
        let draft = PolicyDraft::from_quote(
            &quote,
            PolicyParties {
                taker: request.taker,
                adviser,
                created_by: request.created_by,
            },
            vehicle.id,
            change_factor,
            due,
        )?;

        let mut policy = self.policies.insert_policy(draft).await?;
        policy.mark_issued();
        info!(
            policy_id = %policy.id,
            number = policy.number,
            items = policy.items.len(),
            total = %policy.total_amount,
            "Policy issued"
        );
        self.publish(&mut policy);
        Ok(policy)
    }

    /// Re-derives the policy status after `payment` changed.
    ///
    /// `payment` wins over its stored copy when deriving the trigger. An
    /// unchanged status writes nothing.
    #[instrument(skip(self, payment), fields(policy_id = %payment.policy_id, payment_id = %payment.id))]
    pub async fn record_payment_status(&self, payment: &Payment) -> Result<Policy, PolicyError> {
        let max_attempts = self.settings.max_status_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut policy = self.policies.get_policy(payment.policy_id).await?;
            let payments = self.payments.list_for_policy(payment.policy_id).await?;
            let trigger = StatusTrigger::from_payments(payment, &payments);

            policy.note_payment(payment.id, payment.status);
            match policy.apply(trigger, self.settings.rejection_rule) {
                Transition::Unchanged(status) => {
                    if status.is_terminal() {
                        warn!(%status, ?trigger, "Payment event on closed policy ignored");
                    } else {
                        debug!(%status, ?trigger, "Status unchanged");
                    }
                    self.publish(&mut policy);
                    return Ok(policy);
                }
                Transition::Changed { from, to } => {
                    match self.policies.update_status(policy.id, policy.version, to).await {
                        Ok(version) => {
                            policy.version = version;
                            info!(%from, %to, attempt, "Policy status changed");
                            self.publish(&mut policy);
                            return Ok(policy);
                        }
                        Err(e) if e.is_conflict() && attempt < max_attempts => {
                            warn!(attempt, max_attempts, "Lost status update, retrying");
                        }
                        Err(e) if e.is_conflict() => {
                            warn!(attempt, "Giving up on status update");
                            return Err(PolicyError::ConcurrencyConflict {
                                policy_id: policy.id,
                                attempts: attempt,
                            });
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Stores a pending payment and moves the policy accordingly.
    #[instrument(skip(self, request), fields(policy_id = %request.policy_id, coin = %request.coin))]
    pub async fn submit_payment(&self, request: SubmitPayment) -> Result<(Payment, Policy), PolicyError> {
        let policy = self.policies.get_policy(request.policy_id).await?;
        let change_factor = self.rates.current_factor().await?;

        let amount = match request.amount {
            Some(amount) => Money::new(amount, request.coin),
            None => amount_due(&policy, request.coin, change_factor)?,
        };

        let new = NewPayment {
            policy_id: policy.id,
            amount,
            method: request.method,
            bank_id: request.bank_id,
            reference: request.reference,
            change_factor,
            status: PaymentStatus::Pending,
            commentary: request.commentary,
            user_id: request.user_id,
        };
        new.validate()?;

        let payment = self.payments.insert_payment(new).await?;
        self.policies.touch(payment.policy_id).await?;
        info!(payment_id = %payment.id, number = payment.number, amount = %payment.amount, "Payment reported");
        let policy = self.record_payment_status(&payment).await?;
        Ok((payment, policy))
    }

    /// Applies a staff decision to a payment and moves the policy accordingly.
    #[instrument(skip(self, decision))]
    pub async fn review_payment(
        &self,
        payment_id: PaymentId,
        decision: PaymentDecision,
    ) -> Result<(Payment, Policy), PolicyError> {
        let (status, commentary) = match decision {
            PaymentDecision::Accept => (PaymentStatus::Accepted, None),
            PaymentDecision::Reject { commentary } => (PaymentStatus::Rejected, commentary),
        };
        let payment = self.payments.set_status(payment_id, status, commentary).await?;
        self.policies.touch(payment.policy_id).await?;
        info!(policy_id = %payment.policy_id, status = ?payment.status, "Payment reviewed");
        let policy = self.record_payment_status(&payment).await?;
        Ok((payment, policy))
    }

    /// Expires every paid policy whose due date is at or before `now`.
    ///
    /// Returns the policies that changed. A policy lost to a concurrent
    /// writer is skipped and picked up on the next run.
    #[instrument(skip(self))]
    pub async fn expire_due_policies(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, PolicyError> {
        let due = self.policies.list_due(now).await?;
        let mut expired = Vec::with_capacity(due.len());

        for mut policy in due {
            let Transition::Changed { to, .. } =
                policy.apply(StatusTrigger::DueDateReached, self.settings.rejection_rule)
            else {
                continue;
            };
            match self.policies.update_status(policy.id, policy.version, to).await {
                Ok(version) => {
                    policy.version = version;
                    info!(policy_id = %policy.id, number = policy.number, "Policy expired");
                    self.publish(&mut policy);
                    expired.push(policy);
                }
                Err(e) if e.is_conflict() => {
                    warn!(policy_id = %policy.id, "Policy changed while expiring, skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(expired)
    }

    fn publish(&self, policy: &mut Policy) {
        for event in policy.take_events() {
            match &event {
                PolicyEvent::StatusChanged { from, to, .. } => {
                    debug!(event = event.event_type(), policy_id = %event.policy_id(), %from, %to, "Domain event");
                }
                _ => debug!(event = event.event_type(), policy_id = %event.policy_id(), "Domain event"),
            }
        }
    }
}

/// `issued_at` plus the term, rejecting terms the calendar cannot hold
fn due_date(issued_at: DateTime<Utc>, term_days: i64) -> Result<DateTime<Utc>, PolicyError> {
    if !(1..=MAX_POLICY_TERM_DAYS).contains(&term_days) {
        return Err(PolicyError::Configuration(format!(
            "policy term of {term_days} days is outside 1..={MAX_POLICY_TERM_DAYS}"
        )));
    }
    TimeDelta::try_days(term_days)
        .and_then(|term| issued_at.checked_add_signed(term))
        .ok_or_else(|| PolicyError::Configuration(format!("policy term of {term_days} days overflows")))
}

/// Policy total expressed in `coin`.
///
/// The exchange factor is the number of bolivars per unit of the policy
/// currency, so only conversions to or from VES are possible.
fn amount_due(policy: &Policy, coin: Currency, factor: Decimal) -> Result<Money, PolicyError> {
    let total = policy.total_amount;
    if total.currency() == coin {
        return Ok(total);
    }
    if factor.is_zero() {
        return Err(PolicyError::Configuration(format!(
            "no exchange factor set, cannot express {total} in {coin}"
        )));
    }
    match (total.currency(), coin) {
        (_, Currency::VES) => Ok(total.convert(factor, coin)?),
        (Currency::VES, _) => Ok(total.convert(Decimal::ONE / factor, coin)?),
        (from, to) => Err(PolicyError::Configuration(format!(
            "no exchange factor between {from} and {to}"
        ))),
    }
}
