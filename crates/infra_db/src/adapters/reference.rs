//! PostgreSQL adapters for users, vehicles and the configuration store

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use core_kernel::{ConfigKey, ConfigStore, DomainPort, PortError, UserId, VehicleId};
use domain_policy::{User, UserDirectory, Vehicle, VehiclePort};

use crate::repositories::ReferenceRepository;

/// PostgreSQL-backed implementation of [`UserDirectory`]
#[derive(Debug, Clone)]
pub struct PostgresUserDirectory {
    repository: ReferenceRepository,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ReferenceRepository::new(pool),
        }
    }

    pub fn repository(&self) -> &ReferenceRepository {
        &self.repository
    }
}

impl DomainPort for PostgresUserDirectory {}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn get_user(&self, id: UserId) -> Result<User, PortError> {
        Ok(self.repository.get_user(id).await?)
    }

    async fn get_or_create_system_user(&self, email: &str, name: &str) -> Result<User, PortError> {
        Ok(self.repository.get_or_create_user(email, name).await?)
    }
}

/// PostgreSQL-backed implementation of [`VehiclePort`]
#[derive(Debug, Clone)]
pub struct PostgresVehicleAdapter {
    repository: ReferenceRepository,
}

impl PostgresVehicleAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ReferenceRepository::new(pool),
        }
    }
}

impl DomainPort for PostgresVehicleAdapter {}

#[async_trait]
impl VehiclePort for PostgresVehicleAdapter {
    async fn get_vehicle(&self, id: VehicleId) -> Result<Vehicle, PortError> {
        Ok(self.repository.get_vehicle(id).await?)
    }
}

/// Key-value configuration backed by the `config_entries` table
#[derive(Debug, Clone)]
pub struct PostgresConfigStore {
    repository: ReferenceRepository,
}

impl PostgresConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ReferenceRepository::new(pool),
        }
    }
}

impl DomainPort for PostgresConfigStore {}

#[async_trait]
impl ConfigStore for PostgresConfigStore {
    async fn get(&self, key: ConfigKey) -> Result<Option<String>, PortError> {
        Ok(self.repository.get_config(key).await?)
    }

    async fn set(&self, key: ConfigKey, value: String) -> Result<(), PortError> {
        self.repository.set_config(key, &value).await?;
        debug!(%key, "Configuration entry written");
        Ok(())
    }
}
