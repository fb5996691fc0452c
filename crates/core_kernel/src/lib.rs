//! Core Kernel - Foundational types for the vehicle brokerage core
//!
//! This crate provides the building blocks shared by every domain crate:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Date ranges for validity windows
//! - Port error type and marker traits for the hexagonal adapters
//! - The key-value configuration store and the exchange-rate provider built on it

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod config_store;

pub use money::{Money, Currency, MoneyError};
pub use temporal::{DateRange, TemporalError};
pub use identifiers::{
    PlanId, UsageId, CoverageId, PremiumId, VehicleId, UserId,
    PolicyId, PolicyCoverageId, PaymentId, BankId, ExchangeRateId,
};
pub use ports::{PortError, DomainPort};
pub use config_store::{
    get_with_timeout, ConfigKey, ConfigStore, ExchangeRateProvider, StoreExchangeRateProvider,
    DEFAULT_READ_TIMEOUT,
};
