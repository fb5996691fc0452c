//! Live configuration store
//!
//! A small key-value store that operators edit at runtime. Two keys matter to
//! the core: the current exchange factor and the default adviser. Values are
//! read on every use and never cached, so an edit takes effect on the next
//! quote or issued policy.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ports::{DomainPort, PortError};

/// Default bound on a single configuration-store read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2000);

/// Keys understood by the configuration store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigKey {
    /// Local currency units per unit of the quoting currency
    ChangeFactor,
    /// User id assigned as adviser when a policy is issued without one
    AdviserDefaultId,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::ChangeFactor => "CHANGE_FACTOR",
            ConfigKey::AdviserDefaultId => "ADVISER_DEFAULT_ID",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHANGE_FACTOR" => Ok(ConfigKey::ChangeFactor),
            "ADVISER_DEFAULT_ID" => Ok(ConfigKey::AdviserDefaultId),
            other => Err(PortError::validation_field(
                format!("unknown configuration key: {other}"),
                "key",
            )),
        }
    }
}

/// Port for the runtime key-value configuration store
#[async_trait]
pub trait ConfigStore: DomainPort {
    /// Returns the raw value, or `None` when the key was never set
    async fn get(&self, key: ConfigKey) -> Result<Option<String>, PortError>;

    async fn set(&self, key: ConfigKey, value: String) -> Result<(), PortError>;
}

/// Reads `key` from `store`, failing with `PortError::Timeout` when the
/// store does not answer within `limit`.
pub async fn get_with_timeout(
    store: &dyn ConfigStore,
    key: ConfigKey,
    limit: Duration,
) -> Result<Option<String>, PortError> {
    match tokio::time::timeout(limit, store.get(key)).await {
        Ok(result) => result,
        Err(_) => Err(PortError::timeout(
            format!("config_store.get({key})"),
            limit.as_millis() as u64,
        )),
    }
}

/// Source of the live exchange factor
#[async_trait]
pub trait ExchangeRateProvider: DomainPort {
    /// Current factor; zero when none has been configured
    async fn current_factor(&self) -> Result<Decimal, PortError>;
}

/// Exchange-rate provider reading `CHANGE_FACTOR` from a [`ConfigStore`]
#[derive(Clone)]
pub struct StoreExchangeRateProvider {
    store: Arc<dyn ConfigStore>,
    read_timeout: Duration,
}

impl StoreExchangeRateProvider {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

impl DomainPort for StoreExchangeRateProvider {}

#[async_trait]
impl ExchangeRateProvider for StoreExchangeRateProvider {
    async fn current_factor(&self) -> Result<Decimal, PortError> {
        let raw = get_with_timeout(self.store.as_ref(), ConfigKey::ChangeFactor, self.read_timeout).await?;
        let factor = match raw {
            None => Decimal::ZERO,
            Some(value) => Decimal::from_str(value.trim()).map_err(|e| {
                PortError::validation_field(
                    format!("stored exchange factor {value:?} is not a decimal: {e}"),
                    ConfigKey::ChangeFactor.as_str(),
                )
            })?,
        };
        if factor.is_sign_negative() && !factor.is_zero() {
            return Err(PortError::validation_field(
                format!("stored exchange factor {factor} is negative"),
                ConfigKey::ChangeFactor.as_str(),
            ));
        }
        debug!(%factor, "read exchange factor");
        Ok(factor)
    }
}

/// In-memory configuration store for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    pub struct InMemoryConfigStore {
        values: RwLock<HashMap<ConfigKey, String>>,
        latency: Option<Duration>,
    }

    impl InMemoryConfigStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates the store
        pub fn with_values(values: impl IntoIterator<Item = (ConfigKey, String)>) -> Self {
            Self {
                values: RwLock::new(values.into_iter().collect()),
                latency: None,
            }
        }

        /// Delays every read, for exercising read timeouts
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }
    }

    impl DomainPort for InMemoryConfigStore {}

    #[async_trait]
    impl ConfigStore for InMemoryConfigStore {
        async fn get(&self, key: ConfigKey) -> Result<Option<String>, PortError> {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            Ok(self.values.read().await.get(&key).cloned())
        }

        async fn set(&self, key: ConfigKey, value: String) -> Result<(), PortError> {
            self.values.write().await.insert(key, value);
            Ok(())
        }
    }
}
