//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the brokerage core using SQLx.
//!
//! # Architecture
//!
//! Repositories own the SQL and map rows into domain types. Adapters wrap
//! the repositories and implement the domain ports, converting
//! [`DatabaseError`] into `PortError` so the domain never sees SQLx.
//!
//! Policy status writes are a compare-and-set on a `version` column;
//! policy, item and payment numbers come from PostgreSQL sequences.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig};
//! use infra_db::adapters::PostgresPolicyAdapter;
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/brokerage")).await?;
//! run_migrations(&pool).await?;
//! let policies = PostgresPolicyAdapter::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
