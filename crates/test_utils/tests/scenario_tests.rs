//! End-to-end scenarios over the in-memory brokerage
//!
//! Drives quoting, issuance, payment review and expiry through the
//! lifecycle manager with in-memory ports.

use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal_macros::dec;

use core_kernel::{ConfigKey, ConfigStore, Currency, DateRange, PortError};
use domain_billing::{ExchangeRatePort, PaymentPort, PaymentStatus};
use domain_policy::quote::{price_coverages, resolve_coverage_set};
use domain_policy::{
    LifecycleSettings, PaymentDecision, PolicyError, PolicyPort, PolicyStatus, RejectionRule,
    UserDirectory, WEB_USER_EMAIL,
};
use test_utils::{
    assert_money_eq, assert_numbers_distinct, assert_policy_matches_quote, assert_quote_consistent,
    assert_status, catalog_strategy, InMemoryBrokerage, MoneyFixtures, PremiumUpsertBuilder,
    SubmitPaymentBuilder, TemporalFixtures, SCENARIO_FACTOR,
};

// ============================================================================
// Reference scenario
// ============================================================================

mod reference_scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_private_quote() {
        let b = InMemoryBrokerage::new().await;
        let s = &b.scenario;

        let quote = b.manager.quotes().price(s.plan.id, s.usage.id, None).await.unwrap();

        let codes: Vec<_> = quote.items.iter().map(|i| i.coverage_code.as_str()).collect();
        assert_eq!(codes, ["THEFT", "COLLISION"]);
        assert_money_eq(&quote.total_cost, &MoneyFixtures::scenario_total_cost());
        assert_money_eq(&quote.total_insured_amount, &MoneyFixtures::scenario_total_insured());
        assert_quote_consistent(&quote);
    }

    #[tokio::test]
    async fn test_issue_pay_accept() {
        let b = InMemoryBrokerage::new().await;
        let s = &b.scenario;
        let quote = b.manager.quotes().price(s.plan.id, s.usage.id, None).await.unwrap();

        let policy = b.manager.issue_policy(s.issue_request()).await.unwrap();
        assert_status(&policy, PolicyStatus::Outstanding);
        assert_policy_matches_quote(&policy, &quote);
        assert_eq!(policy.change_factor, SCENARIO_FACTOR);

        let (payment, policy) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).bank(s.bank.id).build())
            .await
            .unwrap();
        assert_status(&policy, PolicyStatus::PendingApproval);
        assert_money_eq(&payment.amount, &MoneyFixtures::scenario_total_cost());

        let (payment, policy) = b
            .manager
            .review_payment(payment.id, PaymentDecision::Accept)
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Accepted);
        assert_status(&policy, PolicyStatus::Passed);
    }

    #[tokio::test]
    async fn test_issue_without_adviser_uses_web_user() {
        let b = InMemoryBrokerage::new().await;

        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();

        let web = b.users.get_or_create_system_user(WEB_USER_EMAIL, "WEB").await.unwrap();
        assert_eq!(policy.adviser, web.id);
        assert_eq!(b.users.count().await, 2);
    }

    #[tokio::test]
    async fn test_configured_adviser_wins_over_web_user() {
        let b = InMemoryBrokerage::new().await;
        b.config
            .set(ConfigKey::AdviserDefaultId, b.scenario.taker.id.to_string())
            .await
            .unwrap();

        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();

        assert_eq!(policy.adviser, b.scenario.taker.id);
        assert_eq!(b.users.count().await, 1);
    }

    #[tokio::test]
    async fn test_bolivar_payment_uses_live_factor() {
        let b = InMemoryBrokerage::new().await;
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();

        let (payment, _) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).coin(Currency::VES).build())
            .await
            .unwrap();

        // 170.00 * 36.50
        assert_eq!(payment.amount.amount(), dec!(6205.00));
        assert_eq!(payment.coin(), Currency::VES);
        assert_eq!(payment.change_factor, SCENARIO_FACTOR);
    }
}

// ============================================================================
// Payment gating and idempotence
// ============================================================================

mod payment_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_pending_payment_holds_policy() {
        let b = InMemoryBrokerage::new().await;
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();

        let (first, _) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).amount(dec!(100)).build())
            .await
            .unwrap();
        let (second, _) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).amount(dec!(70)).build())
            .await
            .unwrap();

        let (_, policy) = b.manager.review_payment(first.id, PaymentDecision::Accept).await.unwrap();
        assert_status(&policy, PolicyStatus::PendingApproval);

        let (_, policy) = b.manager.review_payment(second.id, PaymentDecision::Accept).await.unwrap();
        assert_status(&policy, PolicyStatus::Passed);
    }

    #[tokio::test]
    async fn test_redundant_status_report_writes_nothing() {
        let b = InMemoryBrokerage::new().await;
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();
        let (payment, _) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).build())
            .await
            .unwrap();
        let (payment, passed) = b.manager.review_payment(payment.id, PaymentDecision::Accept).await.unwrap();

        let again = b.manager.record_payment_status(&payment).await.unwrap();
        let stored = b.policies.get_policy(policy.id).await.unwrap();

        assert_status(&again, PolicyStatus::Passed);
        assert_eq!(again.version, passed.version);
        assert_eq!(stored.version, passed.version);
    }

    #[tokio::test]
    async fn test_rejection_keeps_status_by_default() {
        let b = InMemoryBrokerage::new().await;
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();
        let (payment, _) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).build())
            .await
            .unwrap();

        let (payment, policy) = b
            .manager
            .review_payment(
                payment.id,
                PaymentDecision::Reject {
                    commentary: Some("reference not found".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Rejected);
        assert_eq!(payment.commentary.as_deref(), Some("reference not found"));
        assert_status(&policy, PolicyStatus::PendingApproval);
    }

    #[tokio::test]
    async fn test_rejection_can_revert_to_outstanding() {
        let b = InMemoryBrokerage::with_settings(LifecycleSettings {
            rejection_rule: RejectionRule::RevertToOutstanding,
            ..LifecycleSettings::default()
        })
        .await;
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();
        let (payment, _) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).build())
            .await
            .unwrap();

        let (_, policy) = b
            .manager
            .review_payment(payment.id, PaymentDecision::Reject { commentary: None })
            .await
            .unwrap();

        assert_status(&policy, PolicyStatus::Outstanding);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let b = InMemoryBrokerage::with_settings(LifecycleSettings {
            max_status_retries: 3,
            ..LifecycleSettings::default()
        })
        .await;
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();
        b.policies.fail_status_updates(10);

        let err = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).build())
            .await
            .unwrap_err();

        assert!(matches!(err, PolicyError::ConcurrencyConflict { attempts: 3, .. }));
        // The payment itself was stored before the status write failed
        assert_eq!(b.payments.list_for_policy(policy.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_conflict_is_retried() {
        let b = InMemoryBrokerage::new().await;
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();
        b.policies.fail_status_updates(2);

        let (_, policy) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).build())
            .await
            .unwrap();

        assert_status(&policy, PolicyStatus::PendingApproval);
    }
}

// ============================================================================
// Snapshots, numbering and expiry
// ============================================================================

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_change_does_not_touch_issued_policy() {
        let b = InMemoryBrokerage::new().await;
        let s = &b.scenario;
        let issued = b.manager.issue_policy(s.issue_request()).await.unwrap();

        b.manager
            .quotes()
            .upsert_premiums(vec![PremiumUpsertBuilder::new(s.plan.id, s.usage.id, s.theft.id)
                .insured(dec!(1000.00))
                .cost(dec!(80.00))
                .build()])
            .await
            .unwrap();

        let stored = b.policies.get_policy(issued.id).await.unwrap();
        assert_money_eq(&stored.total_amount, &MoneyFixtures::scenario_total_cost());
        assert_eq!(stored.items, issued.items);

        let requote = b.manager.quotes().price(s.plan.id, s.usage.id, None).await.unwrap();
        assert_money_eq(&requote.total_cost, &MoneyFixtures::usd(dec!(200.00)));
        assert_eq!(b.catalog.premium_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_issuance_gets_distinct_numbers() {
        let b = InMemoryBrokerage::new().await;
        let request = b.scenario.issue_request();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&b.manager);
                let request = request.clone();
                tokio::spawn(async move { manager.issue_policy(request).await })
            })
            .collect();

        let mut policies = Vec::new();
        for handle in handles {
            policies.push(handle.await.unwrap().unwrap());
        }

        assert_numbers_distinct(policies.iter().map(|p| p.number));
        assert_numbers_distinct(policies.iter().flat_map(|p| p.items.iter().map(|i| i.number)));
        assert_eq!(b.policies.all().await.len(), 16);
    }

    #[tokio::test]
    async fn test_expired_policy_ignores_payments() {
        let b = InMemoryBrokerage::new().await;
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();
        let (payment, _) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).build())
            .await
            .unwrap();
        b.manager.review_payment(payment.id, PaymentDecision::Accept).await.unwrap();

        let expired = b.manager.expire_due_policies(TemporalFixtures::after_term()).await.unwrap();
        assert_eq!(expired.len(), 1);

        let (_, policy) = b
            .manager
            .submit_payment(SubmitPaymentBuilder::new(policy.id).build())
            .await
            .unwrap();
        assert_status(&policy, PolicyStatus::Expired);
    }

    #[tokio::test]
    async fn test_recorded_rate_becomes_live_factor() {
        let b = InMemoryBrokerage::new().await;
        let today = Utc::now().date_naive();

        b.rates
            .record_rate(DateRange::single_day(today), dec!(40.25), today)
            .await
            .unwrap();

        assert_eq!(b.exchange_rates.rate_valid_on(today).await.unwrap().unwrap().rate, dec!(40.25));
        let policy = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap();
        assert_eq!(policy.change_factor, dec!(40.25));
    }
}

// ============================================================================
// Failed issuance
// ============================================================================

mod failed_issue_tests {
    use super::*;

    #[tokio::test]
    async fn test_unpriced_catalog_issues_nothing() {
        let b = InMemoryBrokerage::new().await;
        let s = &b.scenario;
        b.manager
            .quotes()
            .upsert_premiums(
                [s.theft.id, s.collision.id]
                    .into_iter()
                    .map(|coverage| {
                        PremiumUpsertBuilder::new(s.plan.id, s.usage.id, coverage)
                            .unpriced()
                            .build()
                    })
                    .collect(),
            )
            .await
            .unwrap();

        let err = b.manager.issue_policy(s.issue_request()).await.unwrap_err();

        assert!(matches!(err, PolicyError::InvalidCoverageSelection(_)));
        assert!(b.policies.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_selection_with_unpriced_coverage_issues_nothing() {
        let b = InMemoryBrokerage::new().await;
        let s = &b.scenario;
        b.manager
            .quotes()
            .upsert_premiums(vec![PremiumUpsertBuilder::new(s.plan.id, s.usage.id, s.collision.id)
                .unpriced()
                .build()])
            .await
            .unwrap();
        let mut request = s.issue_request();
        request.coverage_selection = Some(vec![s.theft.id, s.collision.id]);

        let err = b.manager.issue_policy(request).await.unwrap_err();

        assert!(matches!(
            err,
            PolicyError::RateNotFound { ref coverages, .. } if coverages == &[s.collision.id]
        ));
        assert!(b.policies.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_negative_factor_blocks_issue() {
        let b = InMemoryBrokerage::new().await;
        b.config.set(ConfigKey::ChangeFactor, "-36.50".to_string()).await.unwrap();

        let err = b.manager.issue_policy(b.scenario.issue_request()).await.unwrap_err();

        assert!(matches!(err, PolicyError::Port(PortError::Validation { .. })));
        assert!(b.policies.all().await.is_empty());
    }
}

// ============================================================================
// Properties over generated catalogs
// ============================================================================

mod property_tests {
    use super::*;

    proptest! {
        #[test]
        fn test_totals_are_exact_sums(catalog in catalog_strategy(8)) {
            let rates = catalog.rate_table();
            let resolved = resolve_coverage_set(&catalog.plan, catalog.usage.id, &catalog.candidates(), &rates);
            let quote = price_coverages(catalog.plan.id, catalog.usage.id, Currency::USD, &resolved, &rates).unwrap();

            let cost: rust_decimal::Decimal = quote.items.iter().map(|i| i.cost.amount()).sum();
            let insured: rust_decimal::Decimal = quote.items.iter().map(|i| i.insured_amount.amount()).sum();
            prop_assert_eq!(quote.total_cost.amount(), cost);
            prop_assert_eq!(quote.total_insured_amount.amount(), insured);
        }

        #[test]
        fn test_resolution_is_idempotent(catalog in catalog_strategy(8)) {
            let rates = catalog.rate_table();
            let once = resolve_coverage_set(&catalog.plan, catalog.usage.id, &catalog.candidates(), &rates);
            let twice = resolve_coverage_set(&catalog.plan, catalog.usage.id, &once, &rates);
            prop_assert_eq!(&once, &twice);

            let mut doubled = catalog.candidates();
            doubled.extend(catalog.candidates());
            let deduped = resolve_coverage_set(&catalog.plan, catalog.usage.id, &doubled, &rates);
            prop_assert_eq!(&once, &deduped);
        }

        #[test]
        fn test_foreign_coverages_never_resolve(catalog in catalog_strategy(8)) {
            let rates = catalog.rate_table();
            let resolved = resolve_coverage_set(&catalog.plan, catalog.usage.id, &catalog.candidates(), &rates);
            for foreign in &catalog.foreign {
                prop_assert!(resolved.iter().all(|c| c.id != foreign.id));
            }
            let mut seen_non_default = false;
            for coverage in &resolved {
                if !coverage.default {
                    seen_non_default = true;
                } else {
                    prop_assert!(!seen_non_default, "default coverage after a linked one");
                }
            }
        }
    }
}
