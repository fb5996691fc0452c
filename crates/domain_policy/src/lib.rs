//! Policy Domain - quoting, issuance and status lifecycle
//!
//! This crate holds the brokerage's business logic, following Domain-Driven
//! Design and Hexagonal Architecture principles:
//! - **Catalog**: plans, usage classes, coverages and the premium rate table
//! - **Quote Engine**: resolves a plan's effective coverage set and prices it
//! - **Aggregate**: Policy with its priced line items
//! - **Lifecycle Manager**: issues policies and moves their status on
//!   payment events and due dates
//! - **Ports**: storage interfaces implemented by `infra_db`
//!
//! # Policy Lifecycle
//!
//! ```text
//! Outstanding -> PendingApproval -> Passed -> Expired
//!                      ^              |
//!                      +--------------+
//! Rejected, Expired: terminal
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_policy::{IssuePolicy, PolicyLifecycleManager};
//!
//! let policy = manager
//!     .issue_policy(IssuePolicy {
//!         plan_id,
//!         vehicle_id,
//!         taker,
//!         adviser: None,
//!         created_by,
//!         coverage_selection: None,
//!     })
//!     .await?;
//! ```

pub mod catalog;
pub mod vehicle;
pub mod quote;
pub mod policy;
pub mod events;
pub mod adviser;
pub mod lifecycle;
pub mod ports;
pub mod error;

pub use catalog::{Coverage, Plan, Premium, PremiumUpsert, RateKey, RateTable, Usage};
pub use vehicle::Vehicle;
pub use quote::{PricedItem, Quote, QuoteEngine};
pub use policy::{
    Policy, PolicyCoverage, PolicyDraft, PolicyItemDraft, PolicyParties, PolicyRecord, PolicyStatus,
    RejectionRule, StatusTrigger, Transition,
};
pub use events::PolicyEvent;
pub use adviser::{DefaultAdviserResolver, User, WEB_USER_EMAIL, WEB_USER_NAME};
pub use lifecycle::{
    IssuePolicy, LifecycleSettings, PaymentDecision, PolicyLifecycleManager, SubmitPayment,
    MAX_POLICY_TERM_DAYS,
};
pub use ports::{CatalogPort, PolicyPort, UserDirectory, VehiclePort};
pub use error::PolicyError;
