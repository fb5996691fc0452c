//! Test Utilities Crate
//!
//! Shared test infrastructure for the brokerage core.
//!
//! # Modules
//!
//! - `fixtures`: the reference catalog and an in-memory wired brokerage
//! - `builders`: builders for rate rows and payments, fake users and vehicles
//! - `database`: PostgreSQL testcontainer management and seeding
//! - `assertions`: assertion helpers for money, quotes and policies
//! - `generators`: proptest strategies

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
