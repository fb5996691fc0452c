//! Policy Domain Ports
//!
//! Storage-facing interfaces for the catalog, vehicles, users and policies.
//! The PostgreSQL adapters live in `infra_db`; the in-memory adapters in
//! [`mock`] back the unit and scenario tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{CoverageId, DomainPort, PlanId, PolicyId, PortError, UsageId, UserId, VehicleId};

use crate::adviser::User;
use crate::catalog::{Coverage, Plan, Premium, PremiumUpsert, Usage};
use crate::policy::{Policy, PolicyDraft, PolicyStatus};
use crate::vehicle::Vehicle;

/// Port for the product catalog
#[async_trait]
pub trait CatalogPort: DomainPort {
    async fn get_plan(&self, id: PlanId) -> Result<Plan, PortError>;

    async fn get_usage(&self, id: UsageId) -> Result<Usage, PortError>;

    async fn list_plans(&self) -> Result<Vec<Plan>, PortError>;

    /// Coverages linked to the plan plus every default coverage
    async fn candidate_coverages(&self, plan_id: PlanId) -> Result<Vec<Coverage>, PortError>;

    /// The coverages among `ids` that exist; unknown ids are skipped
    async fn get_coverages(&self, ids: &[CoverageId]) -> Result<Vec<Coverage>, PortError>;

    /// Rate-table rows for one plan and usage, priced or not
    async fn premiums_for(&self, plan_id: PlanId, usage_id: UsageId) -> Result<Vec<Premium>, PortError>;

    /// Rate-table rows for one usage across every plan
    async fn premiums_for_usage(&self, usage_id: UsageId) -> Result<Vec<Premium>, PortError>;

    /// Inserts or updates rows by (plan, usage, coverage), all or nothing
    async fn upsert_premiums(&self, rows: Vec<PremiumUpsert>) -> Result<Vec<Premium>, PortError>;
}

/// Port for vehicle lookups
#[async_trait]
pub trait VehiclePort: DomainPort {
    async fn get_vehicle(&self, id: VehicleId) -> Result<Vehicle, PortError>;
}

/// Port for user lookups
#[async_trait]
pub trait UserDirectory: DomainPort {
    async fn get_user(&self, id: UserId) -> Result<User, PortError>;

    /// Returns the user with `email`, creating it when absent.
    ///
    /// Concurrent callers must end up with the same user.
    async fn get_or_create_system_user(&self, email: &str, name: &str) -> Result<User, PortError>;
}

/// Port for policy storage
#[async_trait]
pub trait PolicyPort: DomainPort {
    /// Stores the policy and its items in one transaction, assigning
    /// the policy number and one number per item
    async fn insert_policy(&self, draft: PolicyDraft) -> Result<Policy, PortError>;

    async fn get_policy(&self, id: PolicyId) -> Result<Policy, PortError>;

    /// Writes `status` if the stored version still equals `expected_version`.
    ///
    /// Returns the new version, or `Conflict` when the row moved on.
    async fn update_status(
        &self,
        id: PolicyId,
        expected_version: i64,
        status: PolicyStatus,
    ) -> Result<i64, PortError>;

    /// Bumps the version and leaves the status alone; returns the new version.
    ///
    /// Called after every payment write so that a status decision read
    /// before that write fails its compare-and-set.
    async fn touch(&self, id: PolicyId) -> Result<i64, PortError>;

    /// `Passed` policies whose due date is at or before `now`
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, PortError>;
}

/// In-memory adapters for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
    use tokio::sync::RwLock;

    use core_kernel::PremiumId;

    use crate::catalog::RateKey;

    /// In-memory catalog
    #[derive(Debug, Default)]
    pub struct MockCatalogPort {
        plans: RwLock<HashMap<PlanId, Plan>>,
        usages: RwLock<HashMap<UsageId, Usage>>,
        coverages: RwLock<HashMap<CoverageId, Coverage>>,
        premiums: RwLock<HashMap<RateKey, Premium>>,
    }

    impl MockCatalogPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates the whole catalog
        pub async fn with_catalog(
            usages: Vec<Usage>,
            plans: Vec<Plan>,
            coverages: Vec<Coverage>,
            premiums: Vec<Premium>,
        ) -> Self {
            let port = Self::new();
            port.usages.write().await.extend(usages.into_iter().map(|u| (u.id, u)));
            port.plans.write().await.extend(plans.into_iter().map(|p| (p.id, p)));
            port.coverages
                .write()
                .await
                .extend(coverages.into_iter().map(|c| (c.id, c)));
            port.premiums
                .write()
                .await
                .extend(premiums.into_iter().map(|p| (p.key(), p)));
            port
        }

        pub async fn premium_count(&self) -> usize {
            self.premiums.read().await.len()
        }
    }

    impl DomainPort for MockCatalogPort {}

    #[async_trait]
    impl CatalogPort for MockCatalogPort {
        async fn get_plan(&self, id: PlanId) -> Result<Plan, PortError> {
            self.plans
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Plan", id))
        }

        async fn get_usage(&self, id: UsageId) -> Result<Usage, PortError> {
            self.usages
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Usage", id))
        }

        async fn list_plans(&self) -> Result<Vec<Plan>, PortError> {
            let mut plans: Vec<Plan> = self.plans.read().await.values().cloned().collect();
            plans.sort_by_key(|p| p.id);
            Ok(plans)
        }

        async fn candidate_coverages(&self, plan_id: PlanId) -> Result<Vec<Coverage>, PortError> {
            Ok(self
                .coverages
                .read()
                .await
                .values()
                .filter(|c| c.default || c.plans.contains(&plan_id))
                .cloned()
                .collect())
        }

        async fn get_coverages(&self, ids: &[CoverageId]) -> Result<Vec<Coverage>, PortError> {
            let coverages = self.coverages.read().await;
            Ok(ids.iter().filter_map(|id| coverages.get(id).cloned()).collect())
        }

        async fn premiums_for(&self, plan_id: PlanId, usage_id: UsageId) -> Result<Vec<Premium>, PortError> {
            Ok(self
                .premiums
                .read()
                .await
                .values()
                .filter(|p| p.plan_id == plan_id && p.usage_id == usage_id)
                .cloned()
                .collect())
        }

        async fn premiums_for_usage(&self, usage_id: UsageId) -> Result<Vec<Premium>, PortError> {
            Ok(self
                .premiums
                .read()
                .await
                .values()
                .filter(|p| p.usage_id == usage_id)
                .cloned()
                .collect())
        }

        async fn upsert_premiums(&self, rows: Vec<PremiumUpsert>) -> Result<Vec<Premium>, PortError> {
            {
                let plans = self.plans.read().await;
                let usages = self.usages.read().await;
                let coverages = self.coverages.read().await;
                for row in &rows {
                    if !plans.contains_key(&row.plan_id) {
                        return Err(PortError::not_found("Plan", row.plan_id));
                    }
                    if !usages.contains_key(&row.usage_id) {
                        return Err(PortError::not_found("Usage", row.usage_id));
                    }
                    if !coverages.contains_key(&row.coverage_id) {
                        return Err(PortError::not_found("Coverage", row.coverage_id));
                    }
                }
            }

            let mut premiums = self.premiums.write().await;
            let stored = rows
                .into_iter()
                .map(|row| {
                    let key = row.key();
                    let id = premiums.get(&key).map(|p| p.id).unwrap_or_else(PremiumId::new_v7);
                    let premium = Premium {
                        id,
                        plan_id: row.plan_id,
                        usage_id: row.usage_id,
                        coverage_id: row.coverage_id,
                        insured_amount: row.insured_amount,
                        cost: row.cost,
                    };
                    premiums.insert(key, premium.clone());
                    premium
                })
                .collect();
            Ok(stored)
        }
    }

    /// In-memory vehicle registry
    #[derive(Debug, Default)]
    pub struct MockVehiclePort {
        vehicles: RwLock<HashMap<VehicleId, Vehicle>>,
    }

    impl MockVehiclePort {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn with_vehicles(vehicles: Vec<Vehicle>) -> Self {
            let port = Self::new();
            port.vehicles
                .write()
                .await
                .extend(vehicles.into_iter().map(|v| (v.id, v)));
            port
        }
    }

    impl DomainPort for MockVehiclePort {}

    #[async_trait]
    impl VehiclePort for MockVehiclePort {
        async fn get_vehicle(&self, id: VehicleId) -> Result<Vehicle, PortError> {
            self.vehicles
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Vehicle", id))
        }
    }

    /// In-memory user directory
    #[derive(Debug, Default)]
    pub struct MockUserDirectory {
        users: RwLock<HashMap<UserId, User>>,
    }

    impl MockUserDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn with_users(users: Vec<User>) -> Self {
            let port = Self::new();
            port.users.write().await.extend(users.into_iter().map(|u| (u.id, u)));
            port
        }

        pub async fn count(&self) -> usize {
            self.users.read().await.len()
        }
    }

    impl DomainPort for MockUserDirectory {}

    #[async_trait]
    impl UserDirectory for MockUserDirectory {
        async fn get_user(&self, id: UserId) -> Result<User, PortError> {
            self.users
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("User", id))
        }

        async fn get_or_create_system_user(&self, email: &str, name: &str) -> Result<User, PortError> {
            // Single write lock makes lookup and insert one step
            let mut users = self.users.write().await;
            if let Some(user) = users.values().find(|u| u.email.eq_ignore_ascii_case(email)) {
                return Ok(user.clone());
            }
            let user = User::new(email, name);
            users.insert(user.id, user.clone());
            Ok(user)
        }
    }

    /// In-memory policy store
    ///
    /// Numbers come from atomic sequences so concurrent issuance never
    /// hands out the same number twice.
    #[derive(Debug)]
    pub struct MockPolicyPort {
        policies: RwLock<HashMap<PolicyId, Policy>>,
        policy_sequence: AtomicI64,
        item_sequence: AtomicI64,
        forced_conflicts: AtomicU32,
    }

    impl Default for MockPolicyPort {
        fn default() -> Self {
            Self {
                policies: RwLock::new(HashMap::new()),
                policy_sequence: AtomicI64::new(1),
                item_sequence: AtomicI64::new(1),
                forced_conflicts: AtomicU32::new(0),
            }
        }
    }

    impl MockPolicyPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `n` status updates fail with `Conflict`
        pub fn fail_status_updates(&self, n: u32) {
            self.forced_conflicts.store(n, Ordering::SeqCst);
        }

        pub async fn all(&self) -> Vec<Policy> {
            let mut policies: Vec<Policy> = self.policies.read().await.values().cloned().collect();
            policies.sort_by_key(|p| p.number);
            policies
        }

        /// Overwrites a stored policy, bumping its version
        pub async fn force_status(&self, id: PolicyId, status: PolicyStatus) {
            if let Some(policy) = self.policies.write().await.get_mut(&id) {
                policy.status = status;
                policy.version += 1;
            }
        }

        fn take_forced_conflict(&self) -> bool {
            self.forced_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl DomainPort for MockPolicyPort {}

    #[async_trait]
    impl PolicyPort for MockPolicyPort {
        async fn insert_policy(&self, draft: PolicyDraft) -> Result<Policy, PortError> {
            let number = self.policy_sequence.fetch_add(1, Ordering::SeqCst);
            let item_numbers: Vec<i64> = draft
                .items
                .iter()
                .map(|_| self.item_sequence.fetch_add(1, Ordering::SeqCst))
                .collect();
            let policy = Policy::from_draft(draft, number, item_numbers, Utc::now());

            let mut policies = self.policies.write().await;
            if policies.contains_key(&policy.id) {
                return Err(PortError::conflict(format!("policy {} already exists", policy.id)));
            }
            policies.insert(policy.id, policy.clone());
            Ok(policy)
        }

        async fn get_policy(&self, id: PolicyId) -> Result<Policy, PortError> {
            self.policies
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Policy", id))
        }

        async fn update_status(
            &self,
            id: PolicyId,
            expected_version: i64,
            status: PolicyStatus,
        ) -> Result<i64, PortError> {
            let mut policies = self.policies.write().await;
            let policy = policies
                .get_mut(&id)
                .ok_or_else(|| PortError::not_found("Policy", id))?;

            if self.take_forced_conflict() {
                // Simulates a concurrent writer landing first
                policy.version += 1;
            }
            if policy.version != expected_version {
                return Err(PortError::conflict(format!(
                    "policy {id} is at version {}, expected {expected_version}",
                    policy.version
                )));
            }
            policy.status = status;
            policy.version += 1;
            policy.updated_at = Utc::now();
            Ok(policy.version)
        }

        async fn touch(&self, id: PolicyId) -> Result<i64, PortError> {
            let mut policies = self.policies.write().await;
            let policy = policies
                .get_mut(&id)
                .ok_or_else(|| PortError::not_found("Policy", id))?;
            policy.version += 1;
            policy.updated_at = Utc::now();
            Ok(policy.version)
        }

        async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, PortError> {
            let mut due: Vec<Policy> = self
                .policies
                .read()
                .await
                .values()
                .filter(|p| p.status == PolicyStatus::Passed && p.is_due(now))
                .cloned()
                .collect();
            due.sort_by_key(|p| p.number);
            Ok(due)
        }
    }
}
