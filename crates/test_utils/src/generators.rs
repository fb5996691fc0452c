//! Property-Based Test Generators
//!
//! proptest strategies producing catalog data, statuses and triggers that
//! respect the domain's invariants.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{Currency, Money, PremiumId};
use domain_billing::PaymentStatus;
use domain_policy::{Coverage, Plan, PolicyStatus, Premium, RateTable, StatusTrigger, Usage};

/// Non-negative amounts with two decimal places, up to 1,000,000.00
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strictly positive amounts with two decimal places
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

pub fn usd_money_strategy() -> impl Strategy<Value = Money> {
    amount_strategy().prop_map(|amount| Money::new(amount, Currency::USD))
}

/// Exchange factors between 0.0001 and 10,000
pub fn factor_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|n| Decimal::new(n, 4))
}

pub fn policy_status_strategy() -> impl Strategy<Value = PolicyStatus> {
    prop_oneof![
        Just(PolicyStatus::Outstanding),
        Just(PolicyStatus::PendingApproval),
        Just(PolicyStatus::Passed),
        Just(PolicyStatus::Expired),
        Just(PolicyStatus::Rejected),
    ]
}

pub fn trigger_strategy() -> impl Strategy<Value = StatusTrigger> {
    prop_oneof![
        Just(StatusTrigger::PaymentPending),
        any::<bool>().prop_map(|others_pending| StatusTrigger::PaymentAccepted { others_pending }),
        any::<bool>().prop_map(|others_pending| StatusTrigger::PaymentRejected { others_pending }),
        Just(StatusTrigger::DueDateReached),
    ]
}

pub fn payment_status_strategy() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Accepted),
        Just(PaymentStatus::Rejected),
    ]
}

/// One generated coverage: default flag, linked flag, insured, cost
type CoverageSpec = (bool, bool, Decimal, Option<Decimal>);

fn coverage_spec_strategy() -> impl Strategy<Value = CoverageSpec> {
    (
        any::<bool>(),
        any::<bool>(),
        amount_strategy(),
        proptest::option::weighted(0.8, amount_strategy()),
    )
}

/// A random catalog around a single plan and usage
#[derive(Debug, Clone)]
pub struct GeneratedCatalog {
    pub plan: Plan,
    pub usage: Usage,
    pub coverages: Vec<Coverage>,
    pub premiums: Vec<Premium>,
    /// Coverages of another plan that must never leak into this one
    pub foreign: Vec<Coverage>,
}

impl GeneratedCatalog {
    pub fn rate_table(&self) -> RateTable {
        RateTable::new(self.premiums.clone())
    }

    /// Every candidate a store would return for the plan, in store order
    pub fn candidates(&self) -> Vec<Coverage> {
        self.coverages.iter().chain(&self.foreign).cloned().collect()
    }
}

/// Catalogs of up to `max_coverages` coverages with mixed default and
/// linked flags, and rate rows that are sometimes unpriced
pub fn catalog_strategy(max_coverages: usize) -> impl Strategy<Value = GeneratedCatalog> {
    (
        proptest::collection::vec(coverage_spec_strategy(), 0..=max_coverages),
        0usize..3,
    )
        .prop_map(|(specs, foreign_count)| {
            let usage = Usage::new("PRIVATE", "Private");
            let plan = Plan::new("PLAN", "Generated").with_usage(usage.id);
            let other = Plan::new("OTHER", "Other").with_usage(usage.id);
            let base = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now);

            let mut coverages = Vec::with_capacity(specs.len());
            let mut premiums = Vec::with_capacity(specs.len());
            for (i, (default, linked, insured, cost)) in specs.into_iter().enumerate() {
                let mut coverage = Coverage::new(format!("COV{i}"), format!("Coverage {i}"))
                    .created_at(base + Duration::minutes(i as i64));
                if default {
                    coverage = coverage.as_default();
                }
                if linked {
                    coverage = coverage.linked_to(plan.id);
                }
                premiums.push(Premium {
                    id: PremiumId::new_v7(),
                    plan_id: plan.id,
                    usage_id: usage.id,
                    coverage_id: coverage.id,
                    insured_amount: Money::new(insured, Currency::USD),
                    cost: cost.map(|c| Money::new(c, Currency::USD)),
                });
                coverages.push(coverage);
            }

            let foreign = (0..foreign_count)
                .map(|i| Coverage::new(format!("FOREIGN{i}"), "Foreign").linked_to(other.id))
                .collect();

            GeneratedCatalog {
                plan,
                usage,
                coverages,
                premiums,
                foreign,
            }
        })
}
