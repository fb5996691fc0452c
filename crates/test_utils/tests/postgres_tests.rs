//! PostgreSQL adapter tests
//!
//! Need Docker. Run with `cargo test -p test_utils -- --ignored`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use core_kernel::{
    ConfigKey, ConfigStore, CoverageId, Currency, DateRange, ExchangeRateProvider,
    StoreExchangeRateProvider,
};
use domain_billing::{ExchangeRatePort, ExchangeRateService, NewExchangeRate, PaymentPort};
use domain_policy::{
    CatalogPort, DefaultAdviserResolver, LifecycleSettings, PaymentDecision, PolicyDraft, PolicyError,
    PolicyLifecycleManager, PolicyParties, PolicyPort, PolicyStatus, QuoteEngine, UserDirectory,
};
use infra_db::adapters::{
    PostgresCatalogAdapter, PostgresConfigStore, PostgresExchangeRateAdapter, PostgresPaymentAdapter,
    PostgresPolicyAdapter, PostgresUserDirectory, PostgresVehicleAdapter,
};
use infra_db::DatabasePool;
use test_utils::{
    assert_money_eq, assert_numbers_distinct, assert_status, create_isolated_test_database,
    MoneyFixtures, NewPaymentBuilder, PremiumUpsertBuilder, ScenarioCatalog, SubmitPaymentBuilder,
    TestDatabase,
};

async fn seeded() -> (TestDatabase, ScenarioCatalog) {
    let db = create_isolated_test_database().await.expect("container");
    let scenario = ScenarioCatalog::basic_private();
    db.seed(&scenario).await.expect("seed");
    (db, scenario)
}

fn manager(pool: &DatabasePool, settings: LifecycleSettings) -> PolicyLifecycleManager {
    let store: Arc<dyn ConfigStore> = Arc::new(PostgresConfigStore::new(pool.clone()));
    PolicyLifecycleManager::new(
        QuoteEngine::new(Arc::new(PostgresCatalogAdapter::new(pool.clone())), Currency::USD),
        Arc::new(PostgresVehicleAdapter::new(pool.clone())),
        Arc::new(PostgresPolicyAdapter::new(pool.clone())),
        Arc::new(PostgresPaymentAdapter::new(pool.clone())),
        Arc::new(StoreExchangeRateProvider::new(store.clone())),
        DefaultAdviserResolver::new(store, Arc::new(PostgresUserDirectory::new(pool.clone()))),
    )
    .with_settings(settings)
}

async fn row_count(pool: &DatabasePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT count(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count rows")
}

// ============================================================================
// Catalog
// ============================================================================

mod catalog_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_reference_quote_from_postgres() {
        let (db, s) = seeded().await;
        let engine = QuoteEngine::new(Arc::new(PostgresCatalogAdapter::new(db.pool.clone())), Currency::USD);

        let quote = engine.price(s.plan.id, s.usage.id, None).await.unwrap();

        let codes: Vec<_> = quote.items.iter().map(|i| i.coverage_code.as_str()).collect();
        assert_eq!(codes, ["THEFT", "COLLISION"]);
        assert_money_eq(&quote.total_cost, &MoneyFixtures::scenario_total_cost());
        assert_money_eq(&quote.total_insured_amount, &MoneyFixtures::scenario_total_insured());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_upsert_keeps_one_row_per_key() {
        let (db, s) = seeded().await;
        let catalog = PostgresCatalogAdapter::new(db.pool.clone());

        let stored = catalog
            .upsert_premiums(vec![PremiumUpsertBuilder::new(s.plan.id, s.usage.id, s.theft.id)
                .insured(dec!(1500.00))
                .cost(dec!(75.00))
                .build()])
            .await
            .unwrap();

        let rows = catalog.premiums_for(s.plan.id, s.usage.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        let theft = rows.iter().find(|p| p.coverage_id == s.theft.id).unwrap();
        assert_eq!(theft.id, stored[0].id);
        assert_eq!(theft.cost.unwrap().amount(), dec!(75.00));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_available_plans_for_usage() {
        let (db, s) = seeded().await;
        let engine = QuoteEngine::new(Arc::new(PostgresCatalogAdapter::new(db.pool.clone())), Currency::USD);

        let plans = engine.available_plans(s.usage.id).await.unwrap();

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].id, s.plan.id);
    }
}

// ============================================================================
// Policies and payments
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_issue_pay_accept_against_postgres() {
        let (db, s) = seeded().await;
        let config = PostgresConfigStore::new(db.pool.clone());
        config.set(ConfigKey::ChangeFactor, "36.50".to_string()).await.unwrap();
        let manager = manager(&db.pool, LifecycleSettings::default());

        let policy = manager.issue_policy(s.issue_request()).await.unwrap();
        assert_status(&policy, PolicyStatus::Outstanding);
        assert_eq!(policy.version, 1);
        assert_eq!(policy.change_factor, dec!(36.50));

        let (payment, policy) = manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).bank(s.bank.id).build())
            .await
            .unwrap();
        assert_status(&policy, PolicyStatus::PendingApproval);

        let (_, policy) = manager.review_payment(payment.id, PaymentDecision::Accept).await.unwrap();
        assert_status(&policy, PolicyStatus::Passed);
        assert_eq!(policy.version, 5);

        let stored = PostgresPolicyAdapter::new(db.pool.clone()).get_policy(policy.id).await.unwrap();
        assert_eq!(stored.items.len(), 2);
        assert_money_eq(&stored.total_amount, &MoneyFixtures::scenario_total_cost());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_stale_version_is_conflict() {
        let (db, s) = seeded().await;
        let manager = manager(&db.pool, LifecycleSettings::default());
        let policy = manager.issue_policy(s.issue_request()).await.unwrap();
        let policies = PostgresPolicyAdapter::new(db.pool.clone());

        policies
            .update_status(policy.id, policy.version, PolicyStatus::PendingApproval)
            .await
            .unwrap();
        let err = policies
            .update_status(policy.id, policy.version, PolicyStatus::Passed)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_concurrent_issuance_numbers() {
        let (db, s) = seeded().await;
        let manager = Arc::new(manager(&db.pool, LifecycleSettings::default()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let request = s.issue_request();
                tokio::spawn(async move { manager.issue_policy(request).await })
            })
            .collect();
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().number);
        }

        assert_eq!(numbers.len(), 8);
        assert_numbers_distinct(numbers);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_bad_item_rolls_back_policy() {
        let (db, s) = seeded().await;
        let engine = QuoteEngine::new(Arc::new(PostgresCatalogAdapter::new(db.pool.clone())), Currency::USD);
        let quote = engine.price(s.plan.id, s.usage.id, None).await.unwrap();
        let parties = PolicyParties {
            taker: s.taker.id,
            adviser: s.taker.id,
            created_by: s.taker.id,
        };
        let mut draft = PolicyDraft::from_quote(
            &quote,
            parties,
            s.vehicle.id,
            dec!(36.50),
            Utc::now() + Duration::days(365),
        )
        .unwrap();
        // The first item is written before the second one breaks the foreign key
        draft.items[1].coverage_id = CoverageId::new();

        let result = PostgresPolicyAdapter::new(db.pool.clone()).insert_policy(draft).await;

        assert!(result.is_err());
        assert_eq!(row_count(&db.pool, "policies").await, 0);
        assert_eq!(row_count(&db.pool, "policy_coverages").await, 0);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_failed_issue_writes_nothing() {
        let (db, s) = seeded().await;
        let manager = manager(&db.pool, LifecycleSettings::default());
        let mut request = s.issue_request();
        request.coverage_selection = Some(vec![s.theft.id, CoverageId::new()]);

        let err = manager.issue_policy(request).await.unwrap_err();

        assert!(matches!(err, PolicyError::RateNotFound { .. }));
        assert_eq!(row_count(&db.pool, "policies").await, 0);
        assert_eq!(row_count(&db.pool, "policy_coverages").await, 0);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_payment_report_bumps_version() {
        let (db, s) = seeded().await;
        let manager = manager(&db.pool, LifecycleSettings::default());
        let policy = manager.issue_policy(s.issue_request()).await.unwrap();
        let policies = PostgresPolicyAdapter::new(db.pool.clone());

        let touched = policies.touch(policy.id).await.unwrap();
        let err = policies
            .update_status(policy.id, policy.version, PolicyStatus::PendingApproval)
            .await
            .unwrap_err();

        assert_eq!(touched, policy.version + 1);
        assert!(err.is_conflict());
        assert_status(&policies.get_policy(policy.id).await.unwrap(), PolicyStatus::Outstanding);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_expire_due_policies() {
        let (db, s) = seeded().await;
        let manager = manager(&db.pool, LifecycleSettings::default());
        let policy = manager.issue_policy(s.issue_request()).await.unwrap();
        let payments = PostgresPaymentAdapter::new(db.pool.clone());
        let payment = payments
            .insert_payment(NewPaymentBuilder::new(policy.id, MoneyFixtures::scenario_total_cost()).build())
            .await
            .unwrap();
        manager.review_payment(payment.id, PaymentDecision::Accept).await.unwrap();

        let expired = manager
            .expire_due_policies(Utc::now() + Duration::days(400))
            .await
            .unwrap();

        assert_eq!(expired.len(), 1);
        assert_status(&expired[0], PolicyStatus::Expired);
    }
}

// ============================================================================
// Reference data and configuration
// ============================================================================

mod reference_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_system_user_is_created_once() {
        let (db, _) = seeded().await;
        let users = PostgresUserDirectory::new(db.pool.clone());

        let first = users.get_or_create_system_user("web@example.com", "WEB").await.unwrap();
        let second = users.get_or_create_system_user("WEB@example.com", "WEB").await.unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_rate_sync_publishes_factor() {
        let (db, _) = seeded().await;
        let store: Arc<dyn ConfigStore> = Arc::new(PostgresConfigStore::new(db.pool.clone()));
        let rates = Arc::new(PostgresExchangeRateAdapter::new(db.pool.clone()));
        let today = Utc::now().date_naive();
        rates
            .insert_rate(NewExchangeRate {
                period: DateRange::new(today - Duration::days(1), today + Duration::days(1)).unwrap(),
                rate: dec!(41.10),
            })
            .await
            .unwrap();

        let service = ExchangeRateService::new(rates, store.clone());
        assert_eq!(service.sync_current(today).await.unwrap(), Some(dec!(41.10)));

        let factor = StoreExchangeRateProvider::new(store).current_factor().await.unwrap();
        assert_eq!(factor, dec!(41.10));
    }
}
