//! Tests for the billing domain types

use chrono::Utc;
use rust_decimal_macros::dec;

use core_kernel::{BankId, Currency, Money, PolicyId};

use domain_billing::payment::{Bank, NewPayment, Payment, PaymentMethod, PaymentStatus};
use domain_billing::BillingError;

fn new_payment(method: PaymentMethod) -> NewPayment {
    NewPayment {
        policy_id: PolicyId::new(),
        amount: Money::new(dec!(170.00), Currency::USD),
        method,
        bank_id: None,
        reference: "000123".to_string(),
        change_factor: dec!(36.50),
        status: PaymentStatus::Pending,
        commentary: None,
        user_id: None,
    }
}

// ============================================================================
// Code Tests
// ============================================================================

mod code_tests {
    use super::*;

    #[test]
    fn test_payment_method_codes() {
        assert_eq!(PaymentMethod::Transfer.code(), 0);
        assert_eq!(PaymentMethod::MobilePayment.code(), 1);
        assert_eq!(PaymentMethod::Cash.code(), 2);
        assert_eq!(PaymentMethod::Zelle.code(), 3);
        assert_eq!(PaymentMethod::Other.code(), 4);
    }

    #[test]
    fn test_payment_status_codes() {
        assert_eq!(PaymentStatus::Pending.code(), 0);
        assert_eq!(PaymentStatus::Rejected.code(), 1);
        assert_eq!(PaymentStatus::Accepted.code(), 2);
    }

    #[test]
    fn test_unknown_code_names_the_kind() {
        let err = PaymentMethod::from_code(9).unwrap_err();
        assert!(matches!(err, BillingError::UnknownCode { kind: "payment method", code: 9 }));
        assert!(err.to_string().contains("payment method"));
    }
}

// ============================================================================
// Payment Tests
// ============================================================================

mod payment_tests {
    use super::*;

    #[test]
    fn test_from_new_copies_snapshot() {
        let new = new_payment(PaymentMethod::Cash);
        let payment = Payment::from_new(new.clone(), 7, Utc::now());

        assert_eq!(payment.number, 7);
        assert_eq!(payment.policy_id, new.policy_id);
        assert_eq!(payment.change_factor, dec!(36.50));
        assert_eq!(payment.coin(), Currency::USD);
        assert!(payment.is_pending());
    }

    #[test]
    fn test_accept() {
        let mut payment = Payment::from_new(new_payment(PaymentMethod::Zelle), 1, Utc::now());
        payment.accept();
        assert!(payment.is_accepted());
        assert!(!payment.is_pending());
    }

    #[test]
    fn test_reject_without_commentary_keeps_existing() {
        let mut new = new_payment(PaymentMethod::MobilePayment);
        new.bank_id = Some(BankId::new());
        new.commentary = Some("sent from account ending 4411".to_string());
        let mut payment = Payment::from_new(new, 1, Utc::now());

        payment.reject(None);

        assert_eq!(payment.status, PaymentStatus::Rejected);
        assert_eq!(payment.commentary.as_deref(), Some("sent from account ending 4411"));
    }

    #[test]
    fn test_negative_change_factor_is_invalid() {
        let mut new = new_payment(PaymentMethod::Cash);
        new.change_factor = dec!(-1);
        assert!(matches!(new.validate(), Err(BillingError::InvalidRate(_))));
    }

    #[test]
    fn test_bank_defaults_active() {
        let bank = Bank::new("0105", "Banco Mercantil");
        assert!(bank.is_active);
        assert_eq!(bank.code, "0105");
    }
}

// ============================================================================
// Serialization Tests
// ============================================================================

mod serialization_tests {
    use super::*;

    #[test]
    fn test_payment_json_roundtrip() {
        let payment = Payment::from_new(new_payment(PaymentMethod::Transfer), 3, Utc::now());
        let json = serde_json::to_string(&payment).unwrap();
        let back: Payment = serde_json::from_str(&json).unwrap();
        assert_eq!(payment, back);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    proptest! {
        #[test]
        fn test_only_known_codes_decode(code in any::<i16>()) {
            match PaymentMethod::from_code(code) {
                Ok(method) => prop_assert_eq!(method.code(), code),
                Err(e) => {
                    prop_assert!(!(0..=4).contains(&code));
                    let is_unknown_code = matches!(e, BillingError::UnknownCode { .. });
                    prop_assert!(is_unknown_code);
                }
            }
            match PaymentStatus::from_code(code) {
                Ok(status) => prop_assert_eq!(status.code(), code),
                Err(_) => prop_assert!(!(0..=2).contains(&code)),
            }
        }

        #[test]
        fn test_validate_accepts_exactly_positive_amounts(cents in -1_000_000i64..1_000_000i64) {
            let amount = Decimal::new(cents, 2);
            let payment = NewPayment {
                amount: Money::new(amount, Currency::VES),
                ..new_payment(PaymentMethod::MobilePayment)
            };

            prop_assert_eq!(payment.validate().is_ok(), amount > Decimal::ZERO);
        }

        #[test]
        fn test_negative_factor_never_validates(cents in 1i64..10_000_000i64) {
            let payment = NewPayment {
                change_factor: -Decimal::new(cents, 2),
                ..new_payment(PaymentMethod::Transfer)
            };

            let is_invalid_rate = matches!(payment.validate(), Err(BillingError::InvalidRate(_)));
            prop_assert!(is_invalid_rate);
        }
    }
}
