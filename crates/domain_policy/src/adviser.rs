//! Adviser resolution
//!
//! Every policy names the adviser who sold it. Callers may name one
//! explicitly; otherwise the configured default is used, and when nothing is
//! configured the policy is attributed to the shared web user.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use core_kernel::{get_with_timeout, ConfigKey, ConfigStore, UserId, DEFAULT_READ_TIMEOUT};

use crate::error::PolicyError;
use crate::ports::UserDirectory;

/// Email of the system user that owns web-originated policies
pub const WEB_USER_EMAIL: &str = "web@example.com";

/// Display name of the web user
pub const WEB_USER_NAME: &str = "WEB";

/// A person known to the brokerage: taker, adviser or staff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub is_active: bool,
}

impl User {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: UserId::new_v7(),
            email: email.into(),
            name: name.into(),
            is_active: true,
        }
    }
}

/// Picks the adviser for a new policy
pub struct DefaultAdviserResolver {
    config: Arc<dyn ConfigStore>,
    users: Arc<dyn UserDirectory>,
    read_timeout: Duration,
}

impl DefaultAdviserResolver {
    pub fn new(config: Arc<dyn ConfigStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            config,
            users,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Resolves the adviser id.
    ///
    /// # Errors
    ///
    /// - `Configuration` when the configured default is not a user id or
    ///   names a user that does not exist
    /// - `Port` when the configuration store or user directory fails
    #[instrument(skip(self))]
    pub async fn resolve(&self, explicit: Option<UserId>) -> Result<UserId, PolicyError> {
        if let Some(id) = explicit {
            return Ok(id);
        }

        let configured = get_with_timeout(
            self.config.as_ref(),
            ConfigKey::AdviserDefaultId,
            self.read_timeout,
        )
        .await?;

        match configured.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let id: UserId = raw.parse().map_err(|_| {
                    PolicyError::Configuration(format!(
                        "{} is not a user id: {raw}",
                        ConfigKey::AdviserDefaultId
                    ))
                })?;
                match self.users.get_user(id).await {
                    Ok(user) => {
                        debug!(adviser = %user.id, "Using configured default adviser");
                        Ok(user.id)
                    }
                    Err(e) if e.is_not_found() => {
                        warn!(adviser = %id, "Configured default adviser does not exist");
                        Err(PolicyError::Configuration(format!(
                            "{} names unknown user {id}",
                            ConfigKey::AdviserDefaultId
                        )))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            _ => {
                let user = self
                    .users
                    .get_or_create_system_user(WEB_USER_EMAIL, WEB_USER_NAME)
                    .await?;
                debug!(adviser = %user.id, "Falling back to web user");
                Ok(user.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::MockUserDirectory;
    use core_kernel::config_store::mock::InMemoryConfigStore;

    #[tokio::test]
    async fn test_explicit_adviser_wins() {
        let explicit = UserId::new();
        let config = InMemoryConfigStore::with_values([(
            ConfigKey::AdviserDefaultId,
            UserId::new().to_string(),
        )]);
        let resolver = DefaultAdviserResolver::new(Arc::new(config), Arc::new(MockUserDirectory::new()));

        assert_eq!(resolver.resolve(Some(explicit)).await.unwrap(), explicit);
    }

    #[tokio::test]
    async fn test_configured_default_is_used() {
        let adviser = User::new("ana@example.com", "Ana");
        let users = MockUserDirectory::with_users(vec![adviser.clone()]).await;
        let config = InMemoryConfigStore::with_values([(ConfigKey::AdviserDefaultId, adviser.id.to_string())]);
        let resolver = DefaultAdviserResolver::new(Arc::new(config), Arc::new(users));

        assert_eq!(resolver.resolve(None).await.unwrap(), adviser.id);
    }

    #[tokio::test]
    async fn test_falls_back_to_single_web_user() {
        let users = Arc::new(MockUserDirectory::new());
        let resolver = DefaultAdviserResolver::new(Arc::new(InMemoryConfigStore::new()), users.clone());

        let first = resolver.resolve(None).await.unwrap();
        let second = resolver.resolve(None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(users.count().await, 1);
    }

    #[tokio::test]
    async fn test_garbage_default_is_configuration_error() {
        let config = InMemoryConfigStore::with_values([(ConfigKey::AdviserDefaultId, "not-an-id".to_string())]);
        let resolver = DefaultAdviserResolver::new(Arc::new(config), Arc::new(MockUserDirectory::new()));

        assert!(matches!(resolver.resolve(None).await, Err(PolicyError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unknown_default_is_configuration_error() {
        let config = InMemoryConfigStore::with_values([(ConfigKey::AdviserDefaultId, UserId::new().to_string())]);
        let resolver = DefaultAdviserResolver::new(Arc::new(config), Arc::new(MockUserDirectory::new()));

        assert!(matches!(resolver.resolve(None).await, Err(PolicyError::Configuration(_))));
    }
}
