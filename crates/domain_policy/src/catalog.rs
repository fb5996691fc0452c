//! Product catalog
//!
//! Static reference data maintained by staff: usage classes, plans, the
//! coverages a plan can carry and the premium rate table pricing each
//! (plan, usage, coverage) triple.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{CoverageId, Money, PlanId, PremiumId, UsageId};

use crate::error::PolicyError;

/// Vehicle-usage classification (private, commercial, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub id: UsageId,
    pub code: String,
    pub description: String,
    pub is_active: bool,
}

impl Usage {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: UsageId::new_v7(),
            code: code.into(),
            description: description.into(),
            is_active: true,
        }
    }
}

/// A sellable pricing plan
///
/// The coverages a plan offers are not stored on the plan. They are derived
/// from coverage links and the global default flag, see
/// [`crate::quote::resolve_coverage_set`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub code: String,
    pub description: String,
    pub is_active: bool,
    /// Usage classes this plan may be sold for
    pub usages: BTreeSet<UsageId>,
}

impl Plan {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: PlanId::new_v7(),
            code: code.into(),
            description: description.into(),
            is_active: true,
            usages: BTreeSet::new(),
        }
    }

    pub fn with_usage(mut self, usage_id: UsageId) -> Self {
        self.usages.insert(usage_id);
        self
    }

    /// Returns true if the plan is on sale for `usage_id`
    pub fn permits(&self, usage_id: UsageId) -> bool {
        self.is_active && self.usages.contains(&usage_id)
    }
}

/// A named protection item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub id: CoverageId,
    pub code: String,
    pub description: String,
    /// Plans this coverage is explicitly linked to
    pub plans: BTreeSet<PlanId>,
    /// Default coverages belong to every plan's effective set
    pub default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coverage {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: CoverageId::new_v7(),
            code: code.into(),
            description: description.into(),
            plans: BTreeSet::new(),
            default: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn linked_to(mut self, plan_id: PlanId) -> Self {
        self.plans.insert(plan_id);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns true if this coverage may appear in `plan_id`'s effective set
    pub fn offered_by(&self, plan_id: PlanId) -> bool {
        self.is_active && (self.default || self.plans.contains(&plan_id))
    }
}

/// Key of a rate-table row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RateKey {
    pub plan_id: PlanId,
    pub usage_id: UsageId,
    pub coverage_id: CoverageId,
}

impl RateKey {
    pub fn new(plan_id: PlanId, usage_id: UsageId, coverage_id: CoverageId) -> Self {
        Self {
            plan_id,
            usage_id,
            coverage_id,
        }
    }
}

/// A rate-table row
///
/// A row without a cost exists but is unpriced; it never takes part in
/// pricing or in the effective coverage set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Premium {
    pub id: PremiumId,
    pub plan_id: PlanId,
    pub usage_id: UsageId,
    pub coverage_id: CoverageId,
    pub insured_amount: Money,
    pub cost: Option<Money>,
}

impl Premium {
    pub fn key(&self) -> RateKey {
        RateKey::new(self.plan_id, self.usage_id, self.coverage_id)
    }

    /// Returns true when the row carries a cost strictly above zero
    pub fn has_positive_cost(&self) -> bool {
        self.cost.is_some_and(|c| c.is_positive())
    }
}

/// Insert-or-update request for one rate-table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumUpsert {
    pub plan_id: PlanId,
    pub usage_id: UsageId,
    pub coverage_id: CoverageId,
    pub insured_amount: Money,
    pub cost: Option<Money>,
}

impl PremiumUpsert {
    pub fn key(&self) -> RateKey {
        RateKey::new(self.plan_id, self.usage_id, self.coverage_id)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.insured_amount.is_negative() {
            return Err(PolicyError::validation(format!(
                "insured amount must not be negative: {}",
                self.insured_amount
            )));
        }
        if let Some(cost) = self.cost {
            if cost.is_negative() {
                return Err(PolicyError::validation(format!(
                    "cost must not be negative: {cost}"
                )));
            }
            if cost.currency() != self.insured_amount.currency() {
                return Err(PolicyError::validation(format!(
                    "cost in {} but insured amount in {}",
                    cost.currency(),
                    self.insured_amount.currency()
                )));
            }
        }
        Ok(())
    }
}

/// Rate-table rows indexed by key
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rows: HashMap<RateKey, Premium>,
}

impl RateTable {
    pub fn new(premiums: impl IntoIterator<Item = Premium>) -> Self {
        Self {
            rows: premiums.into_iter().map(|p| (p.key(), p)).collect(),
        }
    }

    pub fn get(&self, key: &RateKey) -> Option<&Premium> {
        self.rows.get(key)
    }

    /// The row for `key` if it carries a cost
    pub fn priced(&self, key: &RateKey) -> Option<&Premium> {
        self.rows.get(key).filter(|p| p.cost.is_some())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
