//! PostgreSQL billing adapters

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{BankId, DomainPort, PaymentId, PolicyId, PortError};
use domain_billing::{
    Bank, ExchangeRate, ExchangeRatePort, NewExchangeRate, NewPayment, Payment, PaymentPort,
    PaymentStatus,
};

use crate::repositories::BillingRepository;

/// PostgreSQL-backed implementation of [`PaymentPort`]
#[derive(Debug, Clone)]
pub struct PostgresPaymentAdapter {
    repository: BillingRepository,
}

impl PostgresPaymentAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool),
        }
    }

    pub fn repository(&self) -> &BillingRepository {
        &self.repository
    }
}

impl DomainPort for PostgresPaymentAdapter {}

#[async_trait]
impl PaymentPort for PostgresPaymentAdapter {
    #[instrument(skip(self, payment), fields(policy_id = %payment.policy_id))]
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PortError> {
        Ok(self.repository.insert_payment(payment).await?)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError> {
        Ok(self.repository.get_payment(id).await?)
    }

    async fn list_for_policy(&self, policy_id: PolicyId) -> Result<Vec<Payment>, PortError> {
        Ok(self.repository.list_for_policy(policy_id).await?)
    }

    async fn set_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
        commentary: Option<String>,
    ) -> Result<Payment, PortError> {
        Ok(self.repository.set_status(id, status, commentary).await?)
    }

    async fn get_bank(&self, id: BankId) -> Result<Bank, PortError> {
        Ok(self.repository.get_bank(id).await?)
    }
}

/// PostgreSQL-backed implementation of [`ExchangeRatePort`]
#[derive(Debug, Clone)]
pub struct PostgresExchangeRateAdapter {
    repository: BillingRepository,
}

impl PostgresExchangeRateAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: BillingRepository::new(pool),
        }
    }
}

impl DomainPort for PostgresExchangeRateAdapter {}

#[async_trait]
impl ExchangeRatePort for PostgresExchangeRateAdapter {
    async fn insert_rate(&self, rate: NewExchangeRate) -> Result<ExchangeRate, PortError> {
        Ok(self.repository.insert_rate(rate).await?)
    }

    async fn rate_valid_on(&self, day: NaiveDate) -> Result<Option<ExchangeRate>, PortError> {
        Ok(self.repository.rate_valid_on(day).await?)
    }
}
