//! Test Data Builders
//!
//! Builders with sensible defaults so tests only spell out the fields they
//! care about. Free-text fields are filled with `fake` data.

use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{BankId, CoverageId, Currency, Money, PlanId, PolicyId, UsageId, UserId};
use domain_billing::{NewPayment, PaymentMethod, PaymentStatus};
use domain_policy::{PremiumUpsert, SubmitPayment, User, Vehicle};

/// Builder for rate-table upserts
pub struct PremiumUpsertBuilder {
    plan_id: PlanId,
    usage_id: UsageId,
    coverage_id: CoverageId,
    insured_amount: Money,
    cost: Option<Money>,
}

impl PremiumUpsertBuilder {
    pub fn new(plan_id: PlanId, usage_id: UsageId, coverage_id: CoverageId) -> Self {
        Self {
            plan_id,
            usage_id,
            coverage_id,
            insured_amount: Money::new(dec!(1000.00), Currency::USD),
            cost: Some(Money::new(dec!(10.00), Currency::USD)),
        }
    }

    pub fn insured(mut self, amount: Decimal) -> Self {
        self.insured_amount = Money::new(amount, self.insured_amount.currency());
        self
    }

    pub fn cost(mut self, amount: Decimal) -> Self {
        self.cost = Some(Money::new(amount, self.insured_amount.currency()));
        self
    }

    /// Row stays in the table but takes no part in pricing
    pub fn unpriced(mut self) -> Self {
        self.cost = None;
        self
    }

    pub fn build(self) -> PremiumUpsert {
        PremiumUpsert {
            plan_id: self.plan_id,
            usage_id: self.usage_id,
            coverage_id: self.coverage_id,
            insured_amount: self.insured_amount,
            cost: self.cost,
        }
    }
}

/// Builder for stored-payment requests
pub struct NewPaymentBuilder {
    payment: NewPayment,
}

impl NewPaymentBuilder {
    pub fn new(policy_id: PolicyId, amount: Money) -> Self {
        Self {
            payment: NewPayment {
                policy_id,
                amount,
                method: PaymentMethod::Transfer,
                bank_id: None,
                reference: random_reference(),
                change_factor: dec!(36.50),
                status: PaymentStatus::Pending,
                commentary: None,
                user_id: None,
            },
        }
    }

    pub fn method(mut self, method: PaymentMethod) -> Self {
        self.payment.method = method;
        self
    }

    pub fn bank(mut self, bank_id: BankId) -> Self {
        self.payment.bank_id = Some(bank_id);
        self
    }

    pub fn status(mut self, status: PaymentStatus) -> Self {
        self.payment.status = status;
        self
    }

    pub fn change_factor(mut self, factor: Decimal) -> Self {
        self.payment.change_factor = factor;
        self
    }

    pub fn build(self) -> NewPayment {
        self.payment
    }
}

/// Builder for payments reported through the lifecycle manager
pub struct SubmitPaymentBuilder {
    request: SubmitPayment,
}

impl SubmitPaymentBuilder {
    pub fn new(policy_id: PolicyId) -> Self {
        Self {
            request: SubmitPayment {
                policy_id,
                method: PaymentMethod::Transfer,
                bank_id: None,
                reference: random_reference(),
                coin: Currency::USD,
                amount: None,
                user_id: None,
                commentary: None,
            },
        }
    }

    pub fn coin(mut self, coin: Currency) -> Self {
        self.request.coin = coin;
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.request.amount = Some(amount);
        self
    }

    pub fn method(mut self, method: PaymentMethod) -> Self {
        self.request.method = method;
        self
    }

    pub fn bank(mut self, bank_id: BankId) -> Self {
        self.request.bank_id = Some(bank_id);
        self
    }

    pub fn reported_by(mut self, user_id: UserId) -> Self {
        self.request.user_id = Some(user_id);
        self
    }

    pub fn build(self) -> SubmitPayment {
        self.request
    }
}

/// A user with a fake name and address
pub fn fake_user() -> User {
    let email: String = SafeEmail().fake();
    let name: String = Name().fake();
    User::new(email, name)
}

/// A vehicle with a fake plate
pub fn fake_vehicle(usage_id: UsageId, taker_id: UserId) -> Vehicle {
    let letters: String = (0..2)
        .map(|_| char::from(b'A' + (0u8..26).fake::<u8>()))
        .collect();
    let digits: u32 = (100..1000).fake();
    Vehicle::new(usage_id, taker_id, format!("{letters}{digits}XY"))
}

fn random_reference() -> String {
    let n: u64 = (100_000..1_000_000_000).fake();
    format!("REF-{n}")
}
