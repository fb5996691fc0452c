//! Billing repository implementation
//!
//! Payments, banks and the exchange-rate history. Payment numbers come from
//! the `payment_number_seq` sequence.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use core_kernel::{BankId, DateRange, ExchangeRateId, Money, PaymentId, PolicyId, UserId};
use domain_billing::{
    Bank, ExchangeRate, NewExchangeRate, NewPayment, Payment, PaymentMethod, PaymentStatus,
};

use crate::error::DatabaseError;
use crate::repositories::catalog::parse_currency;

const PAYMENT_COLUMNS: &str = "id, number, policy_id, amount, currency, method, bank_id, reference, \
     change_factor, status, commentary, user_id, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub number: i64,
    pub policy_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: i16,
    pub bank_id: Option<Uuid>,
    pub reference: String,
    pub change_factor: Decimal,
    pub status: i16,
    pub commentary: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        let method = PaymentMethod::from_code(row.method)
            .map_err(|e| DatabaseError::invalid_data(e.to_string()))?;
        let status = PaymentStatus::from_code(row.status)
            .map_err(|e| DatabaseError::invalid_data(e.to_string()))?;
        Ok(Payment {
            id: PaymentId::from(row.id),
            number: row.number,
            policy_id: PolicyId::from(row.policy_id),
            amount: Money::new(row.amount, currency),
            method,
            bank_id: row.bank_id.map(BankId::from),
            reference: row.reference,
            change_factor: row.change_factor,
            status,
            commentary: row.commentary,
            user_id: row.user_id.map(UserId::from),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BankRow {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub is_active: bool,
}

impl From<BankRow> for Bank {
    fn from(row: BankRow) -> Self {
        Bank {
            id: BankId::from(row.id),
            code: row.code,
            description: row.description,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ExchangeRateRow {
    pub id: Uuid,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub rate: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ExchangeRateRow> for ExchangeRate {
    type Error = DatabaseError;

    fn try_from(row: ExchangeRateRow) -> Result<Self, Self::Error> {
        let period = DateRange::new(row.valid_from, row.valid_until)
            .map_err(|e| DatabaseError::invalid_data(e.to_string()))?;
        Ok(ExchangeRate {
            id: ExchangeRateId::from(row.id),
            period,
            rate: row.rate,
            created_at: row.created_at,
        })
    }
}

/// Repository for payments, banks and exchange rates
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: PgPool,
}

impl BillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let sql = format!(
            "INSERT INTO payments (id, policy_id, amount, currency, method, bank_id, reference,
                                   change_factor, status, commentary, user_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {PAYMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(Uuid::from(PaymentId::new_v7()))
            .bind(Uuid::from(payment.policy_id))
            .bind(payment.amount.amount())
            .bind(payment.amount.currency().code())
            .bind(payment.method.code())
            .bind(payment.bank_id.map(Uuid::from))
            .bind(&payment.reference)
            .bind(payment.change_factor)
            .bind(payment.status.code())
            .bind(&payment.commentary)
            .bind(payment.user_id.map(Uuid::from))
            .fetch_one(&self.pool)
            .await?;
        Payment::try_from(row)
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, DatabaseError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Payment", id))?;
        Payment::try_from(row)
    }

    pub async fn list_for_policy(&self, policy_id: PolicyId) -> Result<Vec<Payment>, DatabaseError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE policy_id = $1 ORDER BY number");
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(Uuid::from(policy_id))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Payment::try_from)
            .collect()
    }

    /// Sets the status, keeping the stored commentary when none is given
    pub async fn set_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
        commentary: Option<String>,
    ) -> Result<Payment, DatabaseError> {
        let sql = format!(
            "UPDATE payments
             SET status = $2, commentary = COALESCE($3, commentary), updated_at = NOW()
             WHERE id = $1
             RETURNING {PAYMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(Uuid::from(id))
            .bind(status.code())
            .bind(commentary)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Payment", id))?;
        Payment::try_from(row)
    }

    pub async fn get_bank(&self, id: BankId) -> Result<Bank, DatabaseError> {
        sqlx::query_as::<_, BankRow>("SELECT id, code, description, is_active FROM banks WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .map(Bank::from)
            .ok_or_else(|| DatabaseError::not_found("Bank", id))
    }

    pub async fn insert_bank(&self, bank: &Bank) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO banks (id, code, description, is_active) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::from(bank.id))
            .bind(&bank.code)
            .bind(&bank.description)
            .bind(bank.is_active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_rate(&self, rate: NewExchangeRate) -> Result<ExchangeRate, DatabaseError> {
        let row = sqlx::query_as::<_, ExchangeRateRow>(
            "INSERT INTO exchange_rates (id, valid_from, valid_until, rate)
             VALUES ($1, $2, $3, $4)
             RETURNING id, valid_from, valid_until, rate, created_at",
        )
        .bind(Uuid::from(ExchangeRateId::new_v7()))
        .bind(rate.period.start)
        .bind(rate.period.end)
        .bind(rate.rate)
        .fetch_one(&self.pool)
        .await?;
        ExchangeRate::try_from(row)
    }

    /// Latest recorded rate covering `day`
    pub async fn rate_valid_on(&self, day: NaiveDate) -> Result<Option<ExchangeRate>, DatabaseError> {
        sqlx::query_as::<_, ExchangeRateRow>(
            "SELECT id, valid_from, valid_until, rate, created_at
             FROM exchange_rates
             WHERE valid_from <= $1 AND valid_until >= $1
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(day)
        .fetch_optional(&self.pool)
        .await?
        .map(ExchangeRate::try_from)
        .transpose()
    }
}
