//! Pre-built Test Fixtures
//!
//! The reference catalog used across the suite: plan `BASIC` sold for usage
//! `PRIVATE`, with `THEFT` (a global default, 1000.00 insured for 50.00) and
//! `COLLISION` (linked to the plan, 5000.00 insured for 120.00). Quoting it
//! yields `[THEFT, COLLISION]` for a total of 170.00 on 6000.00 insured.
//!
//! [`InMemoryBrokerage`] wires the lifecycle manager over the in-memory
//! ports so scenario tests can drive the whole flow without a database.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::config_store::mock::InMemoryConfigStore;
use core_kernel::{ConfigKey, Currency, Money, PremiumId, StoreExchangeRateProvider};
use domain_billing::ports::mock::{MockExchangeRatePort, MockPaymentPort};
use domain_billing::{Bank, ExchangeRateService};
use domain_policy::ports::mock::{MockCatalogPort, MockPolicyPort, MockUserDirectory, MockVehiclePort};
use domain_policy::{
    Coverage, DefaultAdviserResolver, IssuePolicy, LifecycleSettings, Plan, PolicyLifecycleManager,
    Premium, QuoteEngine, Usage, User, Vehicle,
};

/// Exchange factor used by the reference scenario
pub const SCENARIO_FACTOR: Decimal = dec!(36.50);

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn usd(amount: Decimal) -> Money {
        Money::new(amount, Currency::USD)
    }

    pub fn theft_insured() -> Money {
        Self::usd(dec!(1000.00))
    }

    pub fn theft_cost() -> Money {
        Self::usd(dec!(50.00))
    }

    pub fn collision_insured() -> Money {
        Self::usd(dec!(5000.00))
    }

    pub fn collision_cost() -> Money {
        Self::usd(dec!(120.00))
    }

    /// 50.00 + 120.00
    pub fn scenario_total_cost() -> Money {
        Self::usd(dec!(170.00))
    }

    /// 1000.00 + 5000.00
    pub fn scenario_total_insured() -> Money {
        Self::usd(dec!(6000.00))
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Fixed issue instant for deterministic assertions
    pub fn issue_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid fixture timestamp")
    }

    /// Comfortably past the default 365-day term of anything issued now
    pub fn after_term() -> DateTime<Utc> {
        Utc::now() + Duration::days(400)
    }
}

/// The reference catalog plus the parties needed to issue against it
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    pub usage: Usage,
    pub plan: Plan,
    /// Global default coverage
    pub theft: Coverage,
    /// Coverage linked to `plan`
    pub collision: Coverage,
    pub premiums: Vec<Premium>,
    pub taker: User,
    pub vehicle: Vehicle,
    pub bank: Bank,
}

impl ScenarioCatalog {
    /// Basic plan, Private usage, Theft and Collision
    pub fn basic_private() -> Self {
        let usage = Usage::new("PRIVATE", "Private");
        let plan = Plan::new("BASIC", "Basic").with_usage(usage.id);
        let created = TemporalFixtures::issue_time();
        let theft = Coverage::new("THEFT", "Theft").as_default().created_at(created);
        let collision = Coverage::new("COLLISION", "Collision")
            .linked_to(plan.id)
            .created_at(created - Duration::days(1));

        let premiums = vec![
            premium(&plan, &usage, &theft, MoneyFixtures::theft_insured(), MoneyFixtures::theft_cost()),
            premium(
                &plan,
                &usage,
                &collision,
                MoneyFixtures::collision_insured(),
                MoneyFixtures::collision_cost(),
            ),
        ];

        let taker = User::new("taker@example.com", "Policy Taker");
        let vehicle = Vehicle::new(usage.id, taker.id, "AB123CD");

        Self {
            usage,
            plan,
            theft,
            collision,
            premiums,
            taker,
            vehicle,
            bank: Bank::new("0102", "Banco de Venezuela"),
        }
    }

    pub fn coverages(&self) -> Vec<Coverage> {
        vec![self.theft.clone(), self.collision.clone()]
    }

    /// Issue request for the scenario vehicle with no explicit adviser
    pub fn issue_request(&self) -> IssuePolicy {
        IssuePolicy {
            plan_id: self.plan.id,
            vehicle_id: self.vehicle.id,
            taker: self.taker.id,
            adviser: None,
            created_by: self.taker.id,
            coverage_selection: None,
        }
    }
}

fn premium(plan: &Plan, usage: &Usage, coverage: &Coverage, insured: Money, cost: Money) -> Premium {
    Premium {
        id: PremiumId::new_v7(),
        plan_id: plan.id,
        usage_id: usage.id,
        coverage_id: coverage.id,
        insured_amount: insured,
        cost: Some(cost),
    }
}

/// Lifecycle manager wired over in-memory ports, with handles to each port
pub struct InMemoryBrokerage {
    pub scenario: ScenarioCatalog,
    pub manager: Arc<PolicyLifecycleManager>,
    pub rates: ExchangeRateService,
    pub catalog: Arc<MockCatalogPort>,
    pub policies: Arc<MockPolicyPort>,
    pub payments: Arc<MockPaymentPort>,
    pub users: Arc<MockUserDirectory>,
    pub exchange_rates: Arc<MockExchangeRatePort>,
    pub config: Arc<InMemoryConfigStore>,
}

impl InMemoryBrokerage {
    /// Reference scenario with default settings and factor 36.50
    pub async fn new() -> Self {
        Self::with_settings(LifecycleSettings::default()).await
    }

    pub async fn with_settings(settings: LifecycleSettings) -> Self {
        let scenario = ScenarioCatalog::basic_private();
        let catalog = Arc::new(
            MockCatalogPort::with_catalog(
                vec![scenario.usage.clone()],
                vec![scenario.plan.clone()],
                scenario.coverages(),
                scenario.premiums.clone(),
            )
            .await,
        );
        let vehicles = Arc::new(MockVehiclePort::with_vehicles(vec![scenario.vehicle.clone()]).await);
        let users = Arc::new(MockUserDirectory::with_users(vec![scenario.taker.clone()]).await);
        let config = Arc::new(InMemoryConfigStore::with_values([(
            ConfigKey::ChangeFactor,
            SCENARIO_FACTOR.to_string(),
        )]));
        let policies = Arc::new(MockPolicyPort::new());
        let payments = Arc::new(MockPaymentPort::with_banks(vec![scenario.bank.clone()]).await);
        let exchange_rates = Arc::new(MockExchangeRatePort::new());

        let manager = PolicyLifecycleManager::new(
            QuoteEngine::new(catalog.clone(), Currency::USD),
            vehicles,
            policies.clone(),
            payments.clone(),
            Arc::new(StoreExchangeRateProvider::new(config.clone())),
            DefaultAdviserResolver::new(config.clone(), users.clone()),
        )
        .with_settings(settings);

        Self {
            scenario,
            manager: Arc::new(manager),
            rates: ExchangeRateService::new(exchange_rates.clone(), config.clone()),
            catalog,
            policies,
            payments,
            users,
            exchange_rates,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_totals() {
        let total = MoneyFixtures::theft_cost()
            .checked_add(&MoneyFixtures::collision_cost())
            .unwrap();
        assert_eq!(total, MoneyFixtures::scenario_total_cost());
    }

    #[test]
    fn test_scenario_links() {
        let s = ScenarioCatalog::basic_private();
        assert!(s.plan.permits(s.usage.id));
        assert!(s.theft.offered_by(s.plan.id));
        assert!(s.collision.offered_by(s.plan.id));
        assert_eq!(s.premiums.len(), 2);
    }
}
