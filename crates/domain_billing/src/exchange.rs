//! Exchange-rate history
//!
//! Operators record the official rate for a range of days. Recording a rate
//! whose range covers today also publishes it as the live `CHANGE_FACTOR`,
//! which is what quotes and payments snapshot. The background worker calls
//! [`ExchangeRateService::sync_current`] so that a rate recorded ahead of time
//! becomes live once its range starts.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use core_kernel::{get_with_timeout, ConfigKey, ConfigStore, DateRange, ExchangeRateId, DEFAULT_READ_TIMEOUT};

use crate::error::BillingError;
use crate::ports::ExchangeRatePort;

/// A rate valid for an inclusive range of days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: ExchangeRateId,
    pub period: DateRange,
    pub rate: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A rate that has not been stored yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExchangeRate {
    pub period: DateRange,
    pub rate: Decimal,
}

/// Records rates and keeps the live factor in the configuration store current
pub struct ExchangeRateService {
    rates: Arc<dyn ExchangeRatePort>,
    config: Arc<dyn ConfigStore>,
}

impl ExchangeRateService {
    pub fn new(rates: Arc<dyn ExchangeRatePort>, config: Arc<dyn ConfigStore>) -> Self {
        Self { rates, config }
    }

    /// Stores a rate and, if `period` contains `today`, publishes it.
    #[instrument(skip(self), fields(from = %period.start, until = %period.end))]
    pub async fn record_rate(
        &self,
        period: DateRange,
        rate: Decimal,
        today: NaiveDate,
    ) -> Result<ExchangeRate, BillingError> {
        if rate <= Decimal::ZERO {
            return Err(BillingError::InvalidRate(rate));
        }

        let stored = self.rates.insert_rate(NewExchangeRate { period, rate }).await?;

        if stored.period.contains(today) {
            self.publish(stored.rate).await?;
        } else {
            debug!(%rate, "rate recorded outside its validity window, not published");
        }
        Ok(stored)
    }

    /// Publishes the rate valid on `today`, if any, and returns it.
    #[instrument(skip(self))]
    pub async fn sync_current(&self, today: NaiveDate) -> Result<Option<Decimal>, BillingError> {
        let Some(current) = self.rates.rate_valid_on(today).await? else {
            debug!("no exchange rate recorded for today");
            return Ok(None);
        };

        let live = get_with_timeout(self.config.as_ref(), ConfigKey::ChangeFactor, DEFAULT_READ_TIMEOUT).await?;
        let already_live = live
            .as_deref()
            .and_then(|v| v.trim().parse::<Decimal>().ok())
            .is_some_and(|v| v == current.rate);

        if !already_live {
            self.publish(current.rate).await?;
        }
        Ok(Some(current.rate))
    }

    async fn publish(&self, rate: Decimal) -> Result<(), BillingError> {
        self.config
            .set(ConfigKey::ChangeFactor, rate.normalize().to_string())
            .await?;
        info!(%rate, "exchange factor published");
        Ok(())
    }
}
