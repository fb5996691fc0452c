//! Repository implementations for domain entities
//!
//! Repositories own the SQL and the row types, and convert rows into
//! domain values. Queries are built at runtime with `sqlx::query_as` and
//! bound parameters.

pub mod catalog;
pub mod policy;
pub mod billing;
pub mod reference;

pub use catalog::CatalogRepository;
pub use policy::PolicyRepository;
pub use billing::BillingRepository;
pub use reference::ReferenceRepository;
