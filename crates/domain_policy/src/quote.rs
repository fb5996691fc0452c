//! Quote Engine
//!
//! Resolves which coverages a plan offers for a usage class and prices them
//! against the rate table. The pure functions in this module hold the rules;
//! [`QuoteEngine`] loads the catalog through [`CatalogPort`] and applies them.
//!
//! # Effective coverage set
//!
//! ```text
//! linked to plan, not default, active, priced for (plan, usage)
//!   ∪
//! default, active, priced for (plan, usage)
//! ordered by: default first, then created_at, then id
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use core_kernel::{CoverageId, Currency, Money, MoneyError, PlanId, UsageId};

use crate::catalog::{Coverage, Plan, Premium, PremiumUpsert, RateKey, RateTable, Usage};
use crate::error::PolicyError;
use crate::ports::CatalogPort;

/// One priced line of a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    pub coverage_id: CoverageId,
    pub coverage_code: String,
    pub insured_amount: Money,
    pub cost: Money,
}

/// A priced coverage breakdown with exact totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub plan_id: PlanId,
    pub usage_id: UsageId,
    pub currency: Currency,
    pub items: Vec<PricedItem>,
    pub total_insured_amount: Money,
    pub total_cost: Money,
}

impl Quote {
    /// Builds a quote, summing the items exactly.
    ///
    /// Every amount must be in `currency`.
    pub fn from_items(
        plan_id: PlanId,
        usage_id: UsageId,
        currency: Currency,
        items: Vec<PricedItem>,
    ) -> Result<Self, MoneyError> {
        let total_cost = Money::checked_sum(currency, items.iter().map(|i| &i.cost))?;
        let total_insured_amount =
            Money::checked_sum(currency, items.iter().map(|i| &i.insured_amount))?;
        Ok(Self {
            plan_id,
            usage_id,
            currency,
            items,
            total_insured_amount,
            total_cost,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total cost converted with `factor`, rounded for display
    pub fn converted_total(&self, factor: Decimal, target: Currency) -> Result<Money, MoneyError> {
        self.total_cost.convert(factor, target)
    }
}

/// Computes the effective coverage set of `plan` for `usage_id`.
///
/// `candidates` may contain any coverages; only those offered by the plan and
/// priced in `rates` are kept. Returns an empty list when nothing qualifies.
pub fn resolve_coverage_set(
    plan: &Plan,
    usage_id: UsageId,
    candidates: &[Coverage],
    rates: &RateTable,
) -> Vec<Coverage> {
    let mut seen = HashSet::new();
    let mut resolved: Vec<Coverage> = candidates
        .iter()
        .filter(|c| c.offered_by(plan.id))
        .filter(|c| rates.priced(&RateKey::new(plan.id, usage_id, c.id)).is_some())
        .filter(|c| seen.insert(c.id))
        .cloned()
        .collect();
    resolved.sort_by(|a, b| {
        b.default
            .cmp(&a.default)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    resolved
}

/// Prices `coverages` against `rates`, in the given order.
///
/// Every coverage must have a priced row for (plan, usage); otherwise the
/// call fails with `RateNotFound` naming all of the missing ones and no
/// item is produced.
pub fn price_coverages(
    plan_id: PlanId,
    usage_id: UsageId,
    currency: Currency,
    coverages: &[Coverage],
    rates: &RateTable,
) -> Result<Quote, PolicyError> {
    let missing: Vec<CoverageId> = coverages
        .iter()
        .filter(|c| rates.priced(&RateKey::new(plan_id, usage_id, c.id)).is_none())
        .map(|c| c.id)
        .collect();
    if !missing.is_empty() {
        return Err(PolicyError::RateNotFound {
            plan_id,
            usage_id,
            coverages: missing,
        });
    }

    let mut items = Vec::with_capacity(coverages.len());
    for coverage in coverages {
        let key = RateKey::new(plan_id, usage_id, coverage.id);
        let (insured_amount, cost) = match rates.priced(&key) {
            Some(Premium {
                insured_amount,
                cost: Some(cost),
                ..
            }) => (*insured_amount, *cost),
            _ => {
                return Err(PolicyError::RateNotFound {
                    plan_id,
                    usage_id,
                    coverages: vec![coverage.id],
                })
            }
        };
        items.push(PricedItem {
            coverage_id: coverage.id,
            coverage_code: coverage.code.clone(),
            insured_amount,
            cost,
        });
    }

    Ok(Quote::from_items(plan_id, usage_id, currency, items)?)
}

/// Checks an explicit selection before anything is priced.
///
/// Duplicates are rejected. Ids with no matching coverage, or whose coverage
/// has no priced row, are all reported together as `RateNotFound`. The
/// returned coverages follow the order of `selection`.
pub fn select_coverages(
    plan_id: PlanId,
    usage_id: UsageId,
    selection: &[CoverageId],
    known: &[Coverage],
    rates: &RateTable,
) -> Result<Vec<Coverage>, PolicyError> {
    let mut seen = HashSet::with_capacity(selection.len());
    if let Some(duplicate) = selection.iter().find(|id| !seen.insert(**id)) {
        return Err(PolicyError::invalid_selection(format!(
            "coverage {duplicate} selected more than once"
        )));
    }

    let mut selected = Vec::with_capacity(selection.len());
    let mut missing = Vec::new();
    for id in selection {
        match known.iter().find(|c| c.id == *id) {
            Some(coverage) if rates.priced(&RateKey::new(plan_id, usage_id, *id)).is_some() => {
                selected.push(coverage.clone())
            }
            _ => missing.push(*id),
        }
    }
    if !missing.is_empty() {
        return Err(PolicyError::RateNotFound {
            plan_id,
            usage_id,
            coverages: missing,
        });
    }
    Ok(selected)
}

/// Active plans sold for `usage` that price at least one coverage above zero
pub fn plans_for_usage(usage: &Usage, plans: &[Plan], premiums: &[Premium]) -> Vec<Plan> {
    if !usage.is_active {
        return Vec::new();
    }
    plans
        .iter()
        .filter(|plan| plan.permits(usage.id))
        .filter(|plan| {
            premiums
                .iter()
                .any(|p| p.plan_id == plan.id && p.usage_id == usage.id && p.has_positive_cost())
        })
        .cloned()
        .collect()
}

/// Catalog-backed quote engine
pub struct QuoteEngine {
    catalog: Arc<dyn CatalogPort>,
    currency: Currency,
}

impl QuoteEngine {
    /// Creates an engine quoting in `currency`; rate-table rows in any other
    /// currency are a financial error.
    pub fn new(catalog: Arc<dyn CatalogPort>, currency: Currency) -> Self {
        Self { catalog, currency }
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Resolves the effective coverage set for a plan and usage class.
    #[instrument(skip(self))]
    pub async fn resolve_coverage_set(
        &self,
        plan_id: PlanId,
        usage_id: UsageId,
    ) -> Result<Vec<Coverage>, PolicyError> {
        let plan = self.catalog.get_plan(plan_id).await?;
        let candidates = self.catalog.candidate_coverages(plan_id).await?;
        let rates = RateTable::new(self.catalog.premiums_for(plan_id, usage_id).await?);
        Ok(resolve_coverage_set(&plan, usage_id, &candidates, &rates))
    }

    /// Prices a plan for a usage class.
    ///
    /// # Arguments
    ///
    /// * `plan_id` - Plan being sold
    /// * `usage_id` - Usage class of the vehicle
    /// * `selection` - Explicit coverages; `None` or empty uses the effective set
    ///
    /// # Errors
    ///
    /// * `UsageNotPermitted` - the plan is inactive or not sold for the usage
    /// * `InvalidCoverageSelection` - the selection repeats a coverage
    /// * `RateNotFound` - a coverage has no priced rate-table row
    #[instrument(skip(self, selection), fields(selected = selection.map_or(0, |s| s.len())))]
    pub async fn price(
        &self,
        plan_id: PlanId,
        usage_id: UsageId,
        selection: Option<&[CoverageId]>,
    ) -> Result<Quote, PolicyError> {
        let plan = self.catalog.get_plan(plan_id).await?;
        let usage = self.catalog.get_usage(usage_id).await?;
        if !usage.is_active || !plan.permits(usage_id) {
            return Err(PolicyError::UsageNotPermitted { plan_id, usage_id });
        }

        let rates = RateTable::new(self.catalog.premiums_for(plan_id, usage_id).await?);

        let coverages = match selection.filter(|s| !s.is_empty()) {
            Some(ids) => {
                let known = self.catalog.get_coverages(ids).await?;
                select_coverages(plan_id, usage_id, ids, &known, &rates)?
            }
            None => {
                let candidates = self.catalog.candidate_coverages(plan_id).await?;
                resolve_coverage_set(&plan, usage_id, &candidates, &rates)
            }
        };

        let quote = price_coverages(plan_id, usage_id, self.currency, &coverages, &rates)?;
        debug!(
            items = quote.items.len(),
            total_cost = %quote.total_cost.amount(),
            "quote priced"
        );
        Ok(quote)
    }

    /// Plans that can be sold for a usage class.
    pub async fn available_plans(&self, usage_id: UsageId) -> Result<Vec<Plan>, PolicyError> {
        let usage = self.catalog.get_usage(usage_id).await?;
        let plans = self.catalog.list_plans().await?;
        let premiums = self.catalog.premiums_for_usage(usage_id).await?;
        Ok(plans_for_usage(&usage, &plans, &premiums))
    }

    /// Inserts or updates rate-table rows keyed by (plan, usage, coverage).
    ///
    /// The batch is validated as a whole before anything is written: amounts
    /// must be non-negative, in the engine currency, and no key may repeat.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn upsert_premiums(&self, rows: Vec<PremiumUpsert>) -> Result<Vec<Premium>, PolicyError> {
        let mut keys = HashSet::with_capacity(rows.len());
        for row in &rows {
            row.validate()?;
            if row.insured_amount.currency() != self.currency {
                return Err(MoneyError::CurrencyMismatch(
                    self.currency.to_string(),
                    row.insured_amount.currency().to_string(),
                )
                .into());
            }
            if !keys.insert(row.key()) {
                return Err(PolicyError::validation(format!(
                    "rate for plan {}, usage {}, coverage {} appears twice in the batch",
                    row.plan_id, row.usage_id, row.coverage_id
                )));
            }
        }
        Ok(self.catalog.upsert_premiums(rows).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use core_kernel::PremiumId;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    struct Basic {
        plan: Plan,
        usage: Usage,
        theft: Coverage,
        collision: Coverage,
        rates: RateTable,
    }

    fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    fn premium(plan: &Plan, usage: &Usage, coverage: &Coverage, insured: Decimal, cost: Option<Decimal>) -> Premium {
        Premium {
            id: PremiumId::new(),
            plan_id: plan.id,
            usage_id: usage.id,
            coverage_id: coverage.id,
            insured_amount: usd(insured),
            cost: cost.map(usd),
        }
    }

    fn basic() -> Basic {
        let usage = Usage::new("PRIVATE", "Private");
        let plan = Plan::new("BASIC", "Basic").with_usage(usage.id);
        let earlier = Utc::now() - Duration::days(30);
        // Collision is older than Theft; default-first ordering must still win
        let collision = Coverage::new("COLLISION", "Collision")
            .linked_to(plan.id)
            .created_at(earlier);
        let theft = Coverage::new("THEFT", "Theft").as_default();
        let rates = RateTable::new(vec![
            premium(&plan, &usage, &theft, dec!(1000.00), Some(dec!(50.00))),
            premium(&plan, &usage, &collision, dec!(5000.00), Some(dec!(120.00))),
        ]);
        Basic {
            plan,
            usage,
            theft,
            collision,
            rates,
        }
    }

    #[test]
    fn test_resolve_orders_default_first() {
        let b = basic();
        let candidates = vec![b.collision.clone(), b.theft.clone()];
        let resolved = resolve_coverage_set(&b.plan, b.usage.id, &candidates, &b.rates);
        let codes: Vec<_> = resolved.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["THEFT", "COLLISION"]);
    }

    #[test]
    fn test_resolve_skips_inactive_unlinked_and_unpriced() {
        let b = basic();
        let mut inactive = Coverage::new("GLASS", "Glass").linked_to(b.plan.id);
        inactive.is_active = false;
        let unlinked = Coverage::new("FLOOD", "Flood");
        let unpriced = Coverage::new("TOWING", "Towing").as_default();
        let mut rates = vec![
            premium(&b.plan, &b.usage, &b.theft, dec!(1000.00), Some(dec!(50.00))),
            premium(&b.plan, &b.usage, &inactive, dec!(10.00), Some(dec!(1.00))),
            premium(&b.plan, &b.usage, &unlinked, dec!(10.00), Some(dec!(1.00))),
        ];
        rates.push(premium(&b.plan, &b.usage, &unpriced, dec!(10.00), None));
        let rates = RateTable::new(rates);

        let candidates = vec![b.theft.clone(), inactive, unlinked, unpriced];
        let resolved = resolve_coverage_set(&b.plan, b.usage.id, &candidates, &rates);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, b.theft.id);
    }

    #[test]
    fn test_linked_default_coverage_appears_once() {
        let b = basic();
        let both = b.theft.clone().linked_to(b.plan.id);
        let resolved = resolve_coverage_set(&b.plan, b.usage.id, &[both.clone(), both], &b.rates);
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_price_literal_scenario() {
        let b = basic();
        let coverages = resolve_coverage_set(
            &b.plan,
            b.usage.id,
            &[b.theft.clone(), b.collision.clone()],
            &b.rates,
        );
        let quote = price_coverages(b.plan.id, b.usage.id, Currency::USD, &coverages, &b.rates).unwrap();

        assert_eq!(quote.items.len(), 2);
        assert_eq!(quote.items[0].coverage_code, "THEFT");
        assert_eq!(quote.items[0].cost.amount(), dec!(50.00));
        assert_eq!(quote.items[1].coverage_code, "COLLISION");
        assert_eq!(quote.total_cost.amount(), dec!(170.00));
        assert_eq!(quote.total_insured_amount.amount(), dec!(6000.00));
    }

    #[test]
    fn test_select_reports_all_missing() {
        let b = basic();
        let unknown = CoverageId::new();
        let glass = Coverage::new("GLASS", "Glass").linked_to(b.plan.id);
        let known = vec![b.theft.clone(), glass.clone()];

        let err = select_coverages(
            b.plan.id,
            b.usage.id,
            &[b.theft.id, glass.id, unknown],
            &known,
            &b.rates,
        )
        .unwrap_err();

        match err {
            PolicyError::RateNotFound { coverages, .. } => {
                assert_eq!(coverages, vec![glass.id, unknown]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_select_rejects_duplicates() {
        let b = basic();
        let err = select_coverages(
            b.plan.id,
            b.usage.id,
            &[b.theft.id, b.theft.id],
            &[b.theft.clone()],
            &b.rates,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidCoverageSelection(_)));
    }

    #[test]
    fn test_select_keeps_caller_order() {
        let b = basic();
        let selected = select_coverages(
            b.plan.id,
            b.usage.id,
            &[b.collision.id, b.theft.id],
            &[b.theft.clone(), b.collision.clone()],
            &b.rates,
        )
        .unwrap();
        assert_eq!(selected[0].id, b.collision.id);
        assert_eq!(selected[1].id, b.theft.id);
    }

    #[test]
    fn test_mixed_currency_rates_are_financial_error() {
        let b = basic();
        let mut ves = premium(&b.plan, &b.usage, &b.collision, dec!(5000.00), None);
        ves.insured_amount = Money::new(dec!(5000.00), Currency::VES);
        ves.cost = Some(Money::new(dec!(4380.00), Currency::VES));
        let rates = RateTable::new(vec![
            premium(&b.plan, &b.usage, &b.theft, dec!(1000.00), Some(dec!(50.00))),
            ves,
        ]);
        let result = price_coverages(
            b.plan.id,
            b.usage.id,
            Currency::USD,
            &[b.theft.clone(), b.collision.clone()],
            &rates,
        );
        assert!(matches!(result, Err(PolicyError::Financial(MoneyError::CurrencyMismatch(_, _)))));
    }

    #[test]
    fn test_plans_for_usage_requires_positive_cost() {
        let b = basic();
        let free_usage = Usage::new("CARGO", "Cargo");
        let free_plan = Plan::new("FREE", "Free").with_usage(free_usage.id);
        let premiums = vec![
            premium(&free_plan, &free_usage, &b.theft, dec!(1000.00), Some(dec!(0.00))),
            premium(&b.plan, &b.usage, &b.theft, dec!(1000.00), Some(dec!(50.00))),
        ];
        let plans = vec![b.plan.clone(), free_plan];

        assert_eq!(plans_for_usage(&b.usage, &plans, &premiums), vec![b.plan.clone()]);
        assert!(plans_for_usage(&free_usage, &plans, &premiums).is_empty());
    }

    #[test]
    fn test_converted_total() {
        let b = basic();
        let quote = price_coverages(
            b.plan.id,
            b.usage.id,
            Currency::USD,
            &[b.theft.clone(), b.collision.clone()],
            &b.rates,
        )
        .unwrap();
        let ves = quote.converted_total(dec!(36.50), Currency::VES).unwrap();
        assert_eq!(ves.amount(), dec!(6205.00));
    }

    proptest! {
        #[test]
        fn totals_equal_item_sums(
            rows in proptest::collection::vec((0i64..10_000_000, 0i64..100_000_000), 0..12)
        ) {
            let usage = Usage::new("PRIVATE", "Private");
            let plan = Plan::new("BASIC", "Basic").with_usage(usage.id);
            let coverages: Vec<Coverage> = rows
                .iter()
                .enumerate()
                .map(|(i, _)| Coverage::new(format!("C{i}"), "generated").linked_to(plan.id))
                .collect();
            let rates = RateTable::new(coverages.iter().zip(&rows).map(|(c, (cost, insured))| {
                premium(&plan, &usage, c, Decimal::new(*insured, 2), Some(Decimal::new(*cost, 2)))
            }));

            let quote = price_coverages(plan.id, usage.id, Currency::USD, &coverages, &rates).unwrap();

            let cost: Decimal = rows.iter().map(|(c, _)| Decimal::new(*c, 2)).sum();
            let insured: Decimal = rows.iter().map(|(_, i)| Decimal::new(*i, 2)).sum();
            prop_assert_eq!(quote.total_cost.amount(), cost);
            prop_assert_eq!(quote.total_insured_amount.amount(), insured);
        }

        #[test]
        fn resolution_is_idempotent(shuffle in 0usize..8) {
            let b = basic();
            let mut candidates = vec![b.theft.clone(), b.collision.clone()];
            candidates.rotate_left(shuffle % 2);
            let first = resolve_coverage_set(&b.plan, b.usage.id, &candidates, &b.rates);
            let second = resolve_coverage_set(&b.plan, b.usage.id, &candidates, &b.rates);
            prop_assert_eq!(first, second);
        }
    }
}
