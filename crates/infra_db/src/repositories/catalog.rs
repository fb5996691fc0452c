//! Catalog repository
//!
//! Usage classes, plans, coverages and the premium rate table. Plan-usage
//! and plan-coverage links are aggregated into arrays so each entity loads
//! in a single round trip.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use core_kernel::{CoverageId, Currency, Money, PlanId, PremiumId, UsageId};
use domain_policy::{Coverage, Plan, Premium, PremiumUpsert, Usage};

use crate::error::DatabaseError;

const PLAN_SELECT: &str = r#"
    SELECT p.id, p.code, p.description, p.is_active,
           COALESCE(array_agg(pu.usage_id) FILTER (WHERE pu.usage_id IS NOT NULL), '{}') AS usages
    FROM plans p
    LEFT JOIN plan_usages pu ON pu.plan_id = p.id
"#;

const COVERAGE_SELECT: &str = r#"
    SELECT c.id, c.code, c.description, c.is_default, c.is_active, c.created_at,
           COALESCE(array_agg(pc.plan_id) FILTER (WHERE pc.plan_id IS NOT NULL), '{}') AS plans
    FROM coverages c
    LEFT JOIN plan_coverages pc ON pc.coverage_id = c.id
"#;

const PREMIUM_COLUMNS: &str =
    "id, plan_id, usage_id, coverage_id, insured_amount, cost, currency";

#[derive(Debug, Clone, FromRow)]
pub struct UsageRow {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub is_active: bool,
}

impl From<UsageRow> for Usage {
    fn from(row: UsageRow) -> Self {
        Usage {
            id: UsageId::from(row.id),
            code: row.code,
            description: row.description,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub is_active: bool,
    pub usages: Vec<Uuid>,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Plan {
            id: PlanId::from(row.id),
            code: row.code,
            description: row.description,
            is_active: row.is_active,
            usages: row.usages.into_iter().map(UsageId::from).collect::<BTreeSet<_>>(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CoverageRow {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub plans: Vec<Uuid>,
}

impl From<CoverageRow> for Coverage {
    fn from(row: CoverageRow) -> Self {
        Coverage {
            id: CoverageId::from(row.id),
            code: row.code,
            description: row.description,
            plans: row.plans.into_iter().map(PlanId::from).collect(),
            default: row.is_default,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PremiumRow {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub usage_id: Uuid,
    pub coverage_id: Uuid,
    pub insured_amount: Decimal,
    pub cost: Option<Decimal>,
    pub currency: String,
}

impl TryFrom<PremiumRow> for Premium {
    type Error = DatabaseError;

    fn try_from(row: PremiumRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        Ok(Premium {
            id: PremiumId::from(row.id),
            plan_id: PlanId::from(row.plan_id),
            usage_id: UsageId::from(row.usage_id),
            coverage_id: CoverageId::from(row.coverage_id),
            insured_amount: Money::new(row.insured_amount, currency),
            cost: row.cost.map(|c| Money::new(c, currency)),
        })
    }
}

pub(crate) fn parse_currency(code: &str) -> Result<Currency, DatabaseError> {
    Currency::from_str(code).map_err(|e| DatabaseError::invalid_data(e.to_string()))
}

fn premiums(rows: Vec<PremiumRow>) -> Result<Vec<Premium>, DatabaseError> {
    rows.into_iter().map(Premium::try_from).collect()
}

/// Repository for catalog reference data
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_usage(&self, id: UsageId) -> Result<Usage, DatabaseError> {
        sqlx::query_as::<_, UsageRow>(
            "SELECT id, code, description, is_active FROM usages WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await?
        .map(Usage::from)
        .ok_or_else(|| DatabaseError::not_found("Usage", id))
    }

    pub async fn get_plan(&self, id: PlanId) -> Result<Plan, DatabaseError> {
        let sql = format!("{PLAN_SELECT} WHERE p.id = $1 GROUP BY p.id");
        sqlx::query_as::<_, PlanRow>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .map(Plan::from)
            .ok_or_else(|| DatabaseError::not_found("Plan", id))
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>, DatabaseError> {
        let sql = format!("{PLAN_SELECT} GROUP BY p.id ORDER BY p.code");
        let rows = sqlx::query_as::<_, PlanRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Plan::from).collect())
    }

    /// Coverages linked to `plan_id` plus every default coverage
    pub async fn candidate_coverages(&self, plan_id: PlanId) -> Result<Vec<Coverage>, DatabaseError> {
        let sql = format!(
            "{COVERAGE_SELECT}
             WHERE c.is_default
                OR EXISTS (SELECT 1 FROM plan_coverages l WHERE l.coverage_id = c.id AND l.plan_id = $1)
             GROUP BY c.id"
        );
        let rows = sqlx::query_as::<_, CoverageRow>(&sql)
            .bind(Uuid::from(plan_id))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Coverage::from).collect())
    }

    pub async fn get_coverages(&self, ids: &[CoverageId]) -> Result<Vec<Coverage>, DatabaseError> {
        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let sql = format!("{COVERAGE_SELECT} WHERE c.id = ANY($1) GROUP BY c.id");
        let rows = sqlx::query_as::<_, CoverageRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Coverage::from).collect())
    }

    pub async fn premiums_for(&self, plan_id: PlanId, usage_id: UsageId) -> Result<Vec<Premium>, DatabaseError> {
        let sql = format!("SELECT {PREMIUM_COLUMNS} FROM premiums WHERE plan_id = $1 AND usage_id = $2");
        let rows = sqlx::query_as::<_, PremiumRow>(&sql)
            .bind(Uuid::from(plan_id))
            .bind(Uuid::from(usage_id))
            .fetch_all(&self.pool)
            .await?;
        premiums(rows)
    }

    pub async fn premiums_for_usage(&self, usage_id: UsageId) -> Result<Vec<Premium>, DatabaseError> {
        let sql = format!("SELECT {PREMIUM_COLUMNS} FROM premiums WHERE usage_id = $1");
        let rows = sqlx::query_as::<_, PremiumRow>(&sql)
            .bind(Uuid::from(usage_id))
            .fetch_all(&self.pool)
            .await?;
        premiums(rows)
    }

    /// Inserts or updates rate-table rows in one transaction
    pub async fn upsert_premiums(&self, rows: Vec<PremiumUpsert>) -> Result<Vec<Premium>, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO premiums (id, plan_id, usage_id, coverage_id, insured_amount, cost, currency)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (plan_id, usage_id, coverage_id) DO UPDATE
                SET insured_amount = EXCLUDED.insured_amount,
                    cost = EXCLUDED.cost,
                    currency = EXCLUDED.currency,
                    updated_at = NOW()
             RETURNING {PREMIUM_COLUMNS}"
        );

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let saved = sqlx::query_as::<_, PremiumRow>(&sql)
                .bind(Uuid::from(PremiumId::new_v7()))
                .bind(Uuid::from(row.plan_id))
                .bind(Uuid::from(row.usage_id))
                .bind(Uuid::from(row.coverage_id))
                .bind(row.insured_amount.amount())
                .bind(row.cost.map(|c| c.amount()))
                .bind(row.insured_amount.currency().code())
                .fetch_one(&mut *tx)
                .await?;
            stored.push(Premium::try_from(saved)?);
        }

        tx.commit().await?;
        debug!(rows = stored.len(), "Premiums upserted");
        Ok(stored)
    }

    // Seeding, used by administration scripts and tests

    pub async fn insert_usage(&self, usage: &Usage) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO usages (id, code, description, is_active) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::from(usage.id))
            .bind(&usage.code)
            .bind(&usage.description)
            .bind(usage.is_active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_plan(&self, plan: &Plan) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO plans (id, code, description, is_active) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::from(plan.id))
            .bind(&plan.code)
            .bind(&plan.description)
            .bind(plan.is_active)
            .execute(&mut *tx)
            .await?;
        for usage_id in &plan.usages {
            sqlx::query("INSERT INTO plan_usages (plan_id, usage_id) VALUES ($1, $2)")
                .bind(Uuid::from(plan.id))
                .bind(Uuid::from(*usage_id))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_coverage(&self, coverage: &Coverage) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO coverages (id, code, description, is_default, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::from(coverage.id))
        .bind(&coverage.code)
        .bind(&coverage.description)
        .bind(coverage.default)
        .bind(coverage.is_active)
        .bind(coverage.created_at)
        .execute(&mut *tx)
        .await?;
        for plan_id in &coverage.plans {
            sqlx::query("INSERT INTO plan_coverages (plan_id, coverage_id) VALUES ($1, $2)")
                .bind(Uuid::from(*plan_id))
                .bind(Uuid::from(coverage.id))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
