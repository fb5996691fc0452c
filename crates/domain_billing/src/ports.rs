//! Billing Domain Ports
//!
//! Storage-facing interfaces for payments, banks and exchange-rate history.
//! The PostgreSQL adapters live in `infra_db`; the in-memory adapters in
//! [`mock`] back the unit and scenario tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{BankId, DomainPort, PaymentId, PolicyId, PortError};

use crate::exchange::{ExchangeRate, NewExchangeRate};
use crate::payment::{Bank, NewPayment, Payment, PaymentStatus};

/// Port for payment and bank storage
#[async_trait]
pub trait PaymentPort: DomainPort {
    /// Stores a payment, assigning its sequential number
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PortError>;

    async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError>;

    /// All payments of a policy, oldest first
    async fn list_for_policy(&self, policy_id: PolicyId) -> Result<Vec<Payment>, PortError>;

    /// Overwrites the review status, and the commentary when one is given
    async fn set_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
        commentary: Option<String>,
    ) -> Result<Payment, PortError>;

    async fn get_bank(&self, id: BankId) -> Result<Bank, PortError>;
}

/// Port for the exchange-rate history
#[async_trait]
pub trait ExchangeRatePort: DomainPort {
    async fn insert_rate(&self, rate: NewExchangeRate) -> Result<ExchangeRate, PortError>;

    /// The most recently recorded rate whose period contains `day`
    async fn rate_valid_on(&self, day: NaiveDate) -> Result<Option<ExchangeRate>, PortError>;
}

/// In-memory adapters for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::RwLock;

    use core_kernel::ExchangeRateId;

    /// In-memory payment store with an atomic number sequence
    #[derive(Debug)]
    pub struct MockPaymentPort {
        payments: RwLock<HashMap<PaymentId, Payment>>,
        banks: RwLock<HashMap<BankId, Bank>>,
        sequence: AtomicI64,
    }

    impl Default for MockPaymentPort {
        fn default() -> Self {
            Self {
                payments: RwLock::new(HashMap::new()),
                banks: RwLock::new(HashMap::new()),
                sequence: AtomicI64::new(1),
            }
        }
    }

    impl MockPaymentPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates with banks for testing
        pub async fn with_banks(banks: Vec<Bank>) -> Self {
            let port = Self::new();
            {
                let mut stored = port.banks.write().await;
                for bank in banks {
                    stored.insert(bank.id, bank);
                }
            }
            port
        }
    }

    impl DomainPort for MockPaymentPort {}

    #[async_trait]
    impl PaymentPort for MockPaymentPort {
        async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PortError> {
            if let Some(bank_id) = payment.bank_id {
                if !self.banks.read().await.contains_key(&bank_id) {
                    return Err(PortError::not_found("Bank", bank_id));
                }
            }
            let number = self.sequence.fetch_add(1, Ordering::SeqCst);
            let stored = Payment::from_new(payment, number, Utc::now());
            self.payments.write().await.insert(stored.id, stored.clone());
            Ok(stored)
        }

        async fn get_payment(&self, id: PaymentId) -> Result<Payment, PortError> {
            self.payments
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Payment", id))
        }

        async fn list_for_policy(&self, policy_id: PolicyId) -> Result<Vec<Payment>, PortError> {
            let payments = self.payments.read().await;
            let mut found: Vec<Payment> = payments
                .values()
                .filter(|p| p.policy_id == policy_id)
                .cloned()
                .collect();
            found.sort_by_key(|p| p.number);
            Ok(found)
        }

        async fn set_status(
            &self,
            id: PaymentId,
            status: PaymentStatus,
            commentary: Option<String>,
        ) -> Result<Payment, PortError> {
            let mut payments = self.payments.write().await;
            let payment = payments
                .get_mut(&id)
                .ok_or_else(|| PortError::not_found("Payment", id))?;
            payment.set_status(status);
            if commentary.is_some() {
                payment.commentary = commentary;
            }
            Ok(payment.clone())
        }

        async fn get_bank(&self, id: BankId) -> Result<Bank, PortError> {
            self.banks
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Bank", id))
        }
    }

    /// In-memory exchange-rate history
    #[derive(Debug, Default)]
    pub struct MockExchangeRatePort {
        rates: RwLock<Vec<ExchangeRate>>,
    }

    impl MockExchangeRatePort {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn all(&self) -> Vec<ExchangeRate> {
            self.rates.read().await.clone()
        }
    }

    impl DomainPort for MockExchangeRatePort {}

    #[async_trait]
    impl ExchangeRatePort for MockExchangeRatePort {
        async fn insert_rate(&self, rate: NewExchangeRate) -> Result<ExchangeRate, PortError> {
            let stored = ExchangeRate {
                id: ExchangeRateId::new_v7(),
                period: rate.period,
                rate: rate.rate,
                created_at: Utc::now(),
            };
            self.rates.write().await.push(stored.clone());
            Ok(stored)
        }

        async fn rate_valid_on(&self, day: NaiveDate) -> Result<Option<ExchangeRate>, PortError> {
            // Later inserts win over earlier ones covering the same day
            Ok(self
                .rates
                .read()
                .await
                .iter()
                .rev()
                .find(|r| r.period.contains(day))
                .cloned())
        }
    }
}
