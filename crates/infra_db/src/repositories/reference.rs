//! Users, vehicles and configuration entries

use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use core_kernel::{ConfigKey, UsageId, UserId, VehicleId};
use domain_policy::{User, Vehicle};

use crate::error::DatabaseError;

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_active: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from(row.id),
            email: row.email,
            name: row.name,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VehicleRow {
    pub id: Uuid,
    pub usage_id: Uuid,
    pub taker_id: Uuid,
    pub license_plate: String,
}

impl From<VehicleRow> for Vehicle {
    fn from(row: VehicleRow) -> Self {
        Vehicle {
            id: VehicleId::from(row.id),
            usage_id: UsageId::from(row.usage_id),
            taker_id: UserId::from(row.taker_id),
            license_plate: row.license_plate,
        }
    }
}

/// Repository for users, vehicles and the key-value configuration table
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: PgPool,
}

impl ReferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, UserRow>("SELECT id, email, name, is_active FROM users WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .map(User::from)
            .ok_or_else(|| DatabaseError::not_found("User", id))
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO users (id, email, name, is_active) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::from(user.id))
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.is_active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts the user unless one with the same email exists, then reads
    /// back whichever row won.
    pub async fn get_or_create_user(&self, email: &str, name: &str) -> Result<User, DatabaseError> {
        sqlx::query(
            "INSERT INTO users (id, email, name) VALUES ($1, $2, $3)
             ON CONFLICT ((LOWER(email))) DO NOTHING",
        )
        .bind(Uuid::from(UserId::new_v7()))
        .bind(email)
        .bind(name)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, is_active FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map(User::from)
        .map_err(DatabaseError::from)
    }

    pub async fn get_vehicle(&self, id: VehicleId) -> Result<Vehicle, DatabaseError> {
        sqlx::query_as::<_, VehicleRow>(
            "SELECT id, usage_id, taker_id, license_plate FROM vehicles WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await?
        .map(Vehicle::from)
        .ok_or_else(|| DatabaseError::not_found("Vehicle", id))
    }

    pub async fn insert_vehicle(&self, vehicle: &Vehicle) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO vehicles (id, usage_id, taker_id, license_plate) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::from(vehicle.id))
            .bind(Uuid::from(vehicle.usage_id))
            .bind(Uuid::from(vehicle.taker_id))
            .bind(&vehicle.license_plate)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_config(&self, key: ConfigKey) -> Result<Option<String>, DatabaseError> {
        Ok(sqlx::query_scalar::<_, String>("SELECT value FROM config_entries WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn set_config(&self, key: ConfigKey, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO config_entries (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
