//! Payment records
//!
//! A payment is reported against a policy and reviewed by staff. Its status
//! moves independently of the policy; the policy lifecycle reads the
//! statuses of all payments of a policy to decide where the policy stands.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{BankId, Currency, Money, PaymentId, PolicyId, UserId};

use crate::error::BillingError;

/// How the taker paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Transfer,
    MobilePayment,
    Cash,
    Zelle,
    Other,
}

impl PaymentMethod {
    /// Persistent numeric code
    pub fn code(&self) -> i16 {
        match self {
            PaymentMethod::Transfer => 0,
            PaymentMethod::MobilePayment => 1,
            PaymentMethod::Cash => 2,
            PaymentMethod::Zelle => 3,
            PaymentMethod::Other => 4,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, BillingError> {
        match code {
            0 => Ok(PaymentMethod::Transfer),
            1 => Ok(PaymentMethod::MobilePayment),
            2 => Ok(PaymentMethod::Cash),
            3 => Ok(PaymentMethod::Zelle),
            4 => Ok(PaymentMethod::Other),
            other => Err(BillingError::UnknownCode {
                kind: "payment method",
                code: other,
            }),
        }
    }
}

/// Review status of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Rejected,
    Accepted,
}

impl PaymentStatus {
    /// Persistent numeric code
    pub fn code(&self) -> i16 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Rejected => 1,
            PaymentStatus::Accepted => 2,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, BillingError> {
        match code {
            0 => Ok(PaymentStatus::Pending),
            1 => Ok(PaymentStatus::Rejected),
            2 => Ok(PaymentStatus::Accepted),
            other => Err(BillingError::UnknownCode {
                kind: "payment status",
                code: other,
            }),
        }
    }
}

/// A bank payments can be made through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub id: BankId,
    /// Unique short code
    pub code: String,
    pub description: String,
    pub is_active: bool,
}

impl Bank {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: BankId::new_v7(),
            code: code.into(),
            description: description.into(),
            is_active: true,
        }
    }
}

/// A payment that has not been stored yet
///
/// The store assigns the sequential `number` on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub policy_id: PolicyId,
    /// Amount paid, in the currency it was paid in
    pub amount: Money,
    pub method: PaymentMethod,
    pub bank_id: Option<BankId>,
    pub reference: String,
    /// Exchange factor in force when the payment was reported
    pub change_factor: Decimal,
    pub status: PaymentStatus,
    pub commentary: Option<String>,
    pub user_id: Option<UserId>,
}

impl NewPayment {
    /// Checks the fields a store cannot check on its own
    pub fn validate(&self) -> Result<(), BillingError> {
        if !self.amount.is_positive() {
            return Err(BillingError::InvalidAmount(self.amount.amount()));
        }
        if self.change_factor.is_sign_negative() {
            return Err(BillingError::InvalidRate(self.change_factor));
        }
        if self.reference.trim().is_empty() {
            return Err(BillingError::InvalidOperation(
                "payment reference must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A stored payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// Sequential, store-assigned number
    pub number: i64,
    pub policy_id: PolicyId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub bank_id: Option<BankId>,
    pub reference: String,
    pub change_factor: Decimal,
    pub status: PaymentStatus,
    pub commentary: Option<String>,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Builds the stored form of `new` once the store has picked a number
    pub fn from_new(new: NewPayment, number: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new_v7(),
            number,
            policy_id: new.policy_id,
            amount: new.amount,
            method: new.method,
            bank_id: new.bank_id,
            reference: new.reference,
            change_factor: new.change_factor,
            status: new.status,
            commentary: new.commentary,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Currency the payment was made in
    pub fn coin(&self) -> Currency {
        self.amount.currency()
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    pub fn is_accepted(&self) -> bool {
        self.status == PaymentStatus::Accepted
    }

    pub fn accept(&mut self) {
        self.set_status(PaymentStatus::Accepted);
    }

    pub fn reject(&mut self, commentary: Option<String>) {
        self.set_status(PaymentStatus::Rejected);
        if commentary.is_some() {
            self.commentary = commentary;
        }
    }

    pub fn set_status(&mut self, status: PaymentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_payment(method: PaymentMethod, bank_id: Option<BankId>) -> NewPayment {
        NewPayment {
            policy_id: PolicyId::new(),
            amount: Money::new(dec!(170.00), Currency::USD),
            method,
            bank_id,
            reference: "REF-001".to_string(),
            change_factor: dec!(36.50),
            status: PaymentStatus::Pending,
            commentary: None,
            user_id: None,
        }
    }

    #[test]
    fn test_codes_round_trip() {
        for code in 0..5 {
            assert_eq!(PaymentMethod::from_code(code).unwrap().code(), code);
        }
        for code in 0..3 {
            assert_eq!(PaymentStatus::from_code(code).unwrap().code(), code);
        }
        assert!(PaymentStatus::from_code(3).is_err());
    }

    #[test]
    fn test_validate_amount_and_reference() {
        assert!(new_payment(PaymentMethod::Transfer, Some(BankId::new())).validate().is_ok());

        let mut zero = new_payment(PaymentMethod::Cash, None);
        zero.amount = Money::zero(Currency::USD);
        assert!(matches!(zero.validate(), Err(BillingError::InvalidAmount(_))));

        let mut blank = new_payment(PaymentMethod::Cash, None);
        blank.reference = "  ".to_string();
        assert!(matches!(blank.validate(), Err(BillingError::InvalidOperation(_))));
    }

    #[test]
    fn test_reject_keeps_commentary() {
        let mut payment = Payment::from_new(new_payment(PaymentMethod::Zelle, None), 1, Utc::now());
        payment.reject(Some("reference not found".to_string()));
        assert_eq!(payment.status, PaymentStatus::Rejected);
        assert_eq!(payment.commentary.as_deref(), Some("reference not found"));
        assert!(!payment.is_pending());
    }
}
