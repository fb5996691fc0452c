//! Billing Domain - payments and exchange rates
//!
//! Payments are reported against issued policies and reviewed by staff;
//! their statuses drive the policy lifecycle in `domain_policy`. The
//! exchange-rate history feeds the live `CHANGE_FACTOR` that quotes and
//! payments snapshot.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{ExchangeRateService, PaymentPort};
//!
//! let service = ExchangeRateService::new(rates, config_store);
//! service.record_rate(period, dec!(36.50), today).await?;
//!
//! let payments = payment_port.list_for_policy(policy_id).await?;
//! ```

pub mod payment;
pub mod exchange;
pub mod ports;
pub mod error;

pub use payment::{Bank, NewPayment, Payment, PaymentMethod, PaymentStatus};
pub use exchange::{ExchangeRate, ExchangeRateService, NewExchangeRate};
pub use ports::{ExchangeRatePort, PaymentPort};
pub use error::BillingError;
