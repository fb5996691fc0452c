//! Periodic jobs
//!
//! Each tick re-publishes the exchange rate valid today into the
//! configuration store and expires paid policies past their due date.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use core_kernel::PolicyId;
use domain_billing::ExchangeRateService;
use domain_policy::PolicyLifecycleManager;

use crate::error::WorkerError;

/// Outcome of one worker tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Rate valid today, when one is recorded
    pub factor: Option<Decimal>,
    pub expired: Vec<PolicyId>,
}

/// Runs the periodic jobs against injected services
pub struct Worker {
    rates: ExchangeRateService,
    lifecycle: Arc<PolicyLifecycleManager>,
}

impl Worker {
    pub fn new(rates: ExchangeRateService, lifecycle: Arc<PolicyLifecycleManager>) -> Self {
        Self { rates, lifecycle }
    }

    /// Runs every job once.
    ///
    /// A failed rate sync is logged and does not block expiry.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, WorkerError> {
        let factor = match self.rates.sync_current(now.date_naive()).await {
            Ok(factor) => factor,
            Err(e) => {
                warn!(error = %e, "Exchange rate sync failed");
                None
            }
        };

        let expired = self
            .lifecycle
            .expire_due_policies(now)
            .await?
            .into_iter()
            .map(|policy| policy.id)
            .collect::<Vec<_>>();

        info!(factor = ?factor, expired = expired.len(), "Worker tick complete");
        Ok(TickReport { factor, expired })
    }

    /// Ticks every `period` until `shutdown` resolves.
    ///
    /// Tick failures are logged; the loop keeps going.
    pub async fn run<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping worker");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "Worker tick failed");
                    }
                }
            }
        }
    }
}
