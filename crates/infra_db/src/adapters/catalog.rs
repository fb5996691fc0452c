//! PostgreSQL catalog adapter

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{CoverageId, DomainPort, PlanId, PortError, UsageId};
use domain_policy::{CatalogPort, Coverage, Plan, Premium, PremiumUpsert, Usage};

use crate::repositories::CatalogRepository;

/// PostgreSQL-backed implementation of [`CatalogPort`]
#[derive(Debug, Clone)]
pub struct PostgresCatalogAdapter {
    repository: CatalogRepository,
}

impl PostgresCatalogAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: CatalogRepository::new(pool),
        }
    }

    /// The underlying repository, for seeding reference data
    pub fn repository(&self) -> &CatalogRepository {
        &self.repository
    }
}

impl DomainPort for PostgresCatalogAdapter {}

#[async_trait]
impl CatalogPort for PostgresCatalogAdapter {
    async fn get_plan(&self, id: PlanId) -> Result<Plan, PortError> {
        Ok(self.repository.get_plan(id).await?)
    }

    async fn get_usage(&self, id: UsageId) -> Result<Usage, PortError> {
        Ok(self.repository.get_usage(id).await?)
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, PortError> {
        Ok(self.repository.list_plans().await?)
    }

    #[instrument(skip(self), fields(plan_id = %plan_id))]
    async fn candidate_coverages(&self, plan_id: PlanId) -> Result<Vec<Coverage>, PortError> {
        let coverages = self.repository.candidate_coverages(plan_id).await?;
        debug!(count = coverages.len(), "Loaded candidate coverages");
        Ok(coverages)
    }

    async fn get_coverages(&self, ids: &[CoverageId]) -> Result<Vec<Coverage>, PortError> {
        Ok(self.repository.get_coverages(ids).await?)
    }

    async fn premiums_for(&self, plan_id: PlanId, usage_id: UsageId) -> Result<Vec<Premium>, PortError> {
        Ok(self.repository.premiums_for(plan_id, usage_id).await?)
    }

    async fn premiums_for_usage(&self, usage_id: UsageId) -> Result<Vec<Premium>, PortError> {
        Ok(self.repository.premiums_for_usage(usage_id).await?)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_premiums(&self, rows: Vec<PremiumUpsert>) -> Result<Vec<Premium>, PortError> {
        Ok(self.repository.upsert_premiums(rows).await?)
    }
}
