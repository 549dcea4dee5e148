use crate::{config::DatabaseConfig, errors::Result};
use crate::ops::check::{CheckContext, CheckError, CheckSuccess, HealthCheck};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Create a PostgreSQL connection pool.
///
/// Connections are opened lazily so the process can start, and report
/// itself unready, while the database is down.
pub fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    tracing::info!("Creating database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect_lazy(&config.url)?;

    tracing::info!(
        "Database connection pool created with {} max connections",
        config.max_connections
    );

    Ok(pool)
}

/// Primary datastore check: a trivial round trip through the pool
pub struct PostgresCheck {
    pool: PgPool,
}

impl PostgresCheck {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthCheck for PostgresCheck {
    async fn check(&self, _ctx: CheckContext) -> std::result::Result<CheckSuccess, CheckError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(CheckSuccess::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::probe::{self, ServiceCheckConfig};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lazy_pool_does_not_connect() {
        let config = crate::config::Config::load().unwrap();
        assert!(create_pool(&config.database).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_malformed_url() {
        let mut config = crate::config::Config::load().unwrap().database;
        config.url = "not-a-database-url".to_string();
        assert!(create_pool(&config).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL
    async fn test_postgres_check() {
        let config = crate::config::Config::load().unwrap();
        let pool = create_pool(&config.database).unwrap();
        let probe = ServiceCheckConfig::new(
            "postgres",
            Arc::new(PostgresCheck::new(pool)),
            Duration::from_secs(2),
        );

        let result = probe::run(&probe).await;
        assert!(result.ok, "{:?}", result.error);
    }
}
