//! Domain Adapters
//!
//! PostgreSQL implementations of the domain ports. Each adapter wraps a
//! repository, delegates to it and converts [`crate::DatabaseError`] into
//! `PortError`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresPolicyAdapter;
//! use domain_policy::PolicyPort;
//!
//! let policies: Arc<dyn PolicyPort> = Arc::new(PostgresPolicyAdapter::new(pool));
//! let policy = policies.get_policy(policy_id).await?;
//! ```

pub mod catalog;
pub mod policy;
pub mod billing;
pub mod reference;

pub use catalog::PostgresCatalogAdapter;
pub use policy::PostgresPolicyAdapter;
pub use billing::{PostgresExchangeRateAdapter, PostgresPaymentAdapter};
pub use reference::{PostgresConfigStore, PostgresUserDirectory, PostgresVehicleAdapter};
