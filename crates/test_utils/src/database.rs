//! Database Test Utilities
//!
//! Starts a throwaway PostgreSQL container, applies the migrations and
//! seeds the reference catalog for adapter tests. Requires Docker.

use std::sync::Arc;

use sqlx::PgPool;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::sync::OnceCell;

use domain_policy::PremiumUpsert;
use infra_db::repositories::{BillingRepository, CatalogRepository, ReferenceRepository};
use infra_db::{create_pool, run_migrations, DatabaseConfig};

use crate::fixtures::ScenarioCatalog;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "brokerage_test";

/// Tables cleared between tests, children first
const DATA_TABLES: &[&str] = &[
    "payments",
    "policy_coverages",
    "policies",
    "premiums",
    "plan_coverages",
    "plan_usages",
    "coverages",
    "plans",
    "vehicles",
    "usages",
    "banks",
    "users",
    "exchange_rates",
    "config_entries",
];

/// Configuration for test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A migrated PostgreSQL test container
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and applies every migration
    pub async fn new() -> Result<Self, BoxError> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let config = TestDatabaseConfig {
            host: container.get_host().await?.to_string(),
            port: container.get_host_port_ipv4(5432).await?,
            ..TestDatabaseConfig::default()
        };

        let pool = create_pool(DatabaseConfig::new(config.connection_url()).max_connections(8)).await?;
        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Empties every data table and leaves the schema in place
    pub async fn clear_data(&self) -> Result<(), BoxError> {
        let sql = format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", DATA_TABLES.join(", "));
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Writes the reference catalog, its taker, vehicle and bank
    pub async fn seed(&self, scenario: &ScenarioCatalog) -> Result<(), BoxError> {
        let catalog = CatalogRepository::new(self.pool.clone());
        let reference = ReferenceRepository::new(self.pool.clone());
        let billing = BillingRepository::new(self.pool.clone());

        catalog.insert_usage(&scenario.usage).await?;
        catalog.insert_plan(&scenario.plan).await?;
        for coverage in scenario.coverages() {
            catalog.insert_coverage(&coverage).await?;
        }
        let rows = scenario
            .premiums
            .iter()
            .map(|p| PremiumUpsert {
                plan_id: p.plan_id,
                usage_id: p.usage_id,
                coverage_id: p.coverage_id,
                insured_amount: p.insured_amount,
                cost: p.cost,
            })
            .collect();
        catalog.upsert_premiums(rows).await?;

        reference.insert_user(&scenario.taker).await?;
        reference.insert_vehicle(&scenario.vehicle).await?;
        billing.insert_bank(&scenario.bank).await?;
        Ok(())
    }
}

static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// A database shared across the tests of one binary
///
/// # Panics
///
/// Panics if the container cannot be started
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// A database owned by a single test
pub async fn create_isolated_test_database() -> Result<TestDatabase, BoxError> {
    TestDatabase::new().await
}
