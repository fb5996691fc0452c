//! Custom Test Assertions
//!
//! Assertion helpers for domain types with messages that name the values
//! involved.

use std::collections::HashSet;

use core_kernel::Money;
use domain_policy::{Policy, PolicyStatus, Quote};

/// Asserts that two Money values are exactly equal, currency included
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "Amount mismatch: actual={actual}, expected={expected}"
    );
}

/// Asserts that money values sum exactly to a total
pub fn assert_money_sum_equals<'a>(parts: impl IntoIterator<Item = &'a Money>, total: &Money) {
    let sum = Money::checked_sum(total.currency(), parts).expect("Currency mismatch in sum");
    assert_eq!(
        sum.amount(),
        total.amount(),
        "Sum of parts ({}) doesn't equal total ({})",
        sum.amount(),
        total.amount()
    );
}

/// Asserts both quote totals equal the sums of the item amounts
pub fn assert_quote_consistent(quote: &Quote) {
    assert_money_sum_equals(quote.items.iter().map(|i| &i.cost), &quote.total_cost);
    assert_money_sum_equals(
        quote.items.iter().map(|i| &i.insured_amount),
        &quote.total_insured_amount,
    );
}

/// Asserts a policy carries the quote's totals and one item per quoted coverage, in order
pub fn assert_policy_matches_quote(policy: &Policy, quote: &Quote) {
    assert_money_eq(&policy.total_amount, &quote.total_cost);
    assert_money_eq(&policy.total_insured_amount, &quote.total_insured_amount);
    let policy_coverages: Vec<_> = policy.items.iter().map(|i| i.coverage_id).collect();
    let quote_coverages: Vec<_> = quote.items.iter().map(|i| i.coverage_id).collect();
    assert_eq!(policy_coverages, quote_coverages, "Policy items differ from quote items");
    for (item, priced) in policy.items.iter().zip(&quote.items) {
        assert_money_eq(&item.cost, &priced.cost);
        assert_money_eq(&item.insured_amount, &priced.insured_amount);
    }
}

pub fn assert_status(policy: &Policy, expected: PolicyStatus) {
    assert_eq!(
        policy.status, expected,
        "Policy {} (number {}) is {}, expected {}",
        policy.id, policy.number, policy.status, expected
    );
}

/// Asserts no number repeats
pub fn assert_numbers_distinct(numbers: impl IntoIterator<Item = i64>) {
    let mut seen = HashSet::new();
    for number in numbers {
        assert!(seen.insert(number), "Number {number} was assigned twice");
    }
}
