//! PostgreSQL policy adapter
//!
//! # Error Handling
//!
//! - `DatabaseError::NotFound` -> `PortError::NotFound`
//! - `DatabaseError::StaleVersion` -> `PortError::Conflict`, which the
//!   lifecycle manager retries
//! - constraint violations -> `PortError::Validation`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{DomainPort, PolicyId, PortError};
use domain_policy::{Policy, PolicyDraft, PolicyPort, PolicyStatus};

use crate::repositories::PolicyRepository;

/// PostgreSQL-backed implementation of [`PolicyPort`]
#[derive(Debug, Clone)]
pub struct PostgresPolicyAdapter {
    repository: PolicyRepository,
}

impl PostgresPolicyAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: PolicyRepository::new(pool),
        }
    }
}

impl DomainPort for PostgresPolicyAdapter {}

#[async_trait]
impl PolicyPort for PostgresPolicyAdapter {
    #[instrument(skip(self, draft), fields(policy_id = %draft.id, items = draft.items.len()))]
    async fn insert_policy(&self, draft: PolicyDraft) -> Result<Policy, PortError> {
        Ok(self.repository.insert(draft).await?)
    }

    async fn get_policy(&self, id: PolicyId) -> Result<Policy, PortError> {
        Ok(self.repository.get(id).await?)
    }

    #[instrument(skip(self), fields(policy_id = %id, %status))]
    async fn update_status(
        &self,
        id: PolicyId,
        expected_version: i64,
        status: PolicyStatus,
    ) -> Result<i64, PortError> {
        let version = self.repository.update_status(id, expected_version, status).await?;
        debug!(version, "Status written");
        Ok(version)
    }

    async fn touch(&self, id: PolicyId) -> Result<i64, PortError> {
        Ok(self.repository.touch(id).await?)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, PortError> {
        Ok(self.repository.list_due(now).await?)
    }
}
