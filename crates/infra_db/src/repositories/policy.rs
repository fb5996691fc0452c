//! Policy repository implementation
//!
//! Policies and their line items are written together in one transaction.
//! Policy and item numbers come from PostgreSQL sequences. Status changes
//! are a compare-and-set on the `version` column.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use core_kernel::{
    CoverageId, Money, PlanId, PolicyCoverageId, PolicyId, UsageId, UserId, VehicleId,
};
use domain_policy::{Policy, PolicyCoverage, PolicyDraft, PolicyRecord, PolicyStatus};

use crate::error::DatabaseError;
use crate::repositories::catalog::parse_currency;

const POLICY_COLUMNS: &str = "id, number, taker_id, adviser_id, created_by, vehicle_id, plan_id, \
     usage_id, status, total_amount, total_insured_amount, currency, change_factor, due_date, \
     version, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, policy_id, number, position, coverage_id, insured_amount, cost, currency";

#[derive(Debug, Clone, FromRow)]
pub struct PolicyRow {
    pub id: Uuid,
    pub number: i64,
    pub taker_id: Uuid,
    pub adviser_id: Uuid,
    pub created_by: Uuid,
    pub vehicle_id: Uuid,
    pub plan_id: Uuid,
    pub usage_id: Uuid,
    pub status: i16,
    pub total_amount: Decimal,
    pub total_insured_amount: Decimal,
    pub currency: String,
    pub change_factor: Decimal,
    pub due_date: DateTime<Utc>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PolicyCoverageRow {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub number: i64,
    pub position: i32,
    pub coverage_id: Uuid,
    pub insured_amount: Decimal,
    pub cost: Decimal,
    pub currency: String,
}

impl TryFrom<PolicyCoverageRow> for PolicyCoverage {
    type Error = DatabaseError;

    fn try_from(row: PolicyCoverageRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        Ok(PolicyCoverage {
            id: PolicyCoverageId::from(row.id),
            number: row.number,
            coverage_id: CoverageId::from(row.coverage_id),
            insured_amount: Money::new(row.insured_amount, currency),
            cost: Money::new(row.cost, currency),
        })
    }
}

fn assemble(row: PolicyRow, items: Vec<PolicyCoverageRow>) -> Result<Policy, DatabaseError> {
    let currency = parse_currency(&row.currency)?;
    let status = PolicyStatus::from_code(row.status)
        .map_err(|e| DatabaseError::invalid_data(e.to_string()))?;
    let items = items
        .into_iter()
        .map(PolicyCoverage::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Policy::from(PolicyRecord {
        id: PolicyId::from(row.id),
        number: row.number,
        taker: UserId::from(row.taker_id),
        adviser: UserId::from(row.adviser_id),
        created_by: UserId::from(row.created_by),
        vehicle_id: VehicleId::from(row.vehicle_id),
        plan_id: PlanId::from(row.plan_id),
        usage_id: UsageId::from(row.usage_id),
        status,
        total_amount: Money::new(row.total_amount, currency),
        total_insured_amount: Money::new(row.total_insured_amount, currency),
        change_factor: row.change_factor,
        due_date: row.due_date,
        version: row.version,
        created_at: row.created_at,
        updated_at: row.updated_at,
        items,
    }))
}

/// Repository for the policy aggregate
#[derive(Debug, Clone)]
pub struct PolicyRepository {
    pool: PgPool,
}

impl PolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Writes the policy and every item in one transaction.
    ///
    /// Numbers are drawn from sequences inside the transaction; a rollback
    /// may leave gaps but never duplicates.
    pub async fn insert(&self, draft: PolicyDraft) -> Result<Policy, DatabaseError> {
        let currency = draft.total_amount.currency().code();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO policies (id, taker_id, adviser_id, created_by, vehicle_id, plan_id, usage_id,
                                   status, total_amount, total_insured_amount, currency, change_factor,
                                   due_date, version)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 1)
             RETURNING {POLICY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PolicyRow>(&sql)
            .bind(Uuid::from(draft.id))
            .bind(Uuid::from(draft.parties.taker))
            .bind(Uuid::from(draft.parties.adviser))
            .bind(Uuid::from(draft.parties.created_by))
            .bind(Uuid::from(draft.vehicle_id))
            .bind(Uuid::from(draft.plan_id))
            .bind(Uuid::from(draft.usage_id))
            .bind(PolicyStatus::Outstanding.code())
            .bind(draft.total_amount.amount())
            .bind(draft.total_insured_amount.amount())
            .bind(currency)
            .bind(draft.change_factor)
            .bind(draft.due_date)
            .fetch_one(&mut *tx)
            .await?;

        let item_sql = format!(
            "INSERT INTO policy_coverages (id, policy_id, position, coverage_id, insured_amount, cost, currency)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {ITEM_COLUMNS}"
        );
        let mut items = Vec::with_capacity(draft.items.len());
        for (position, item) in draft.items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| DatabaseError::invalid_data("too many policy items"))?;
            let stored = sqlx::query_as::<_, PolicyCoverageRow>(&item_sql)
                .bind(Uuid::from(PolicyCoverageId::new_v7()))
                .bind(row.id)
                .bind(position)
                .bind(Uuid::from(item.coverage_id))
                .bind(item.insured_amount.amount())
                .bind(item.cost.amount())
                .bind(item.cost.currency().code())
                .fetch_one(&mut *tx)
                .await?;
            items.push(stored);
        }

        tx.commit().await?;
        debug!(policy_id = %row.id, number = row.number, items = items.len(), "Policy inserted");
        assemble(row, items)
    }

    pub async fn get(&self, id: PolicyId) -> Result<Policy, DatabaseError> {
        let sql = format!("SELECT {POLICY_COLUMNS} FROM policies WHERE id = $1");
        let row = sqlx::query_as::<_, PolicyRow>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Policy", id))?;

        let item_sql = format!("SELECT {ITEM_COLUMNS} FROM policy_coverages WHERE policy_id = $1 ORDER BY position");
        let items = sqlx::query_as::<_, PolicyCoverageRow>(&item_sql)
            .bind(row.id)
            .fetch_all(&self.pool)
            .await?;
        assemble(row, items)
    }

    /// Compare-and-set on the status; returns the new version
    pub async fn update_status(
        &self,
        id: PolicyId,
        expected_version: i64,
        status: PolicyStatus,
    ) -> Result<i64, DatabaseError> {
        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE policies
             SET status = $3, version = version + 1, updated_at = NOW()
             WHERE id = $1 AND version = $2
             RETURNING version",
        )
        .bind(Uuid::from(id))
        .bind(expected_version)
        .bind(status.code())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = updated {
            return Ok(version);
        }

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM policies WHERE id = $1)")
            .bind(Uuid::from(id))
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Err(DatabaseError::StaleVersion(format!(
                "policy {id} is no longer at version {expected_version}"
            )))
        } else {
            Err(DatabaseError::not_found("Policy", id))
        }
    }

    /// Bumps the version without touching the status
    pub async fn touch(&self, id: PolicyId) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE policies SET version = version + 1, updated_at = NOW() WHERE id = $1 RETURNING version",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Policy", id))
    }

    /// Passed policies due at or before `now`, oldest number first
    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, DatabaseError> {
        let sql = format!(
            "SELECT {POLICY_COLUMNS} FROM policies WHERE status = $1 AND due_date <= $2 ORDER BY number"
        );
        let rows = sqlx::query_as::<_, PolicyRow>(&sql)
            .bind(PolicyStatus::Passed.code())
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_sql = format!(
            "SELECT {ITEM_COLUMNS} FROM policy_coverages WHERE policy_id = ANY($1) ORDER BY policy_id, position"
        );
        let mut items: HashMap<Uuid, Vec<PolicyCoverageRow>> = HashMap::new();
        for item in sqlx::query_as::<_, PolicyCoverageRow>(&item_sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?
        {
            items.entry(item.policy_id).or_default().push(item);
        }

        rows.into_iter()
            .map(|row| {
                let own = items.remove(&row.id).unwrap_or_default();
                assemble(row, own)
            })
            .collect()
    }
}
