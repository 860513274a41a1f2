use super::schema::DatabaseSchema;
use crate::config::DatabaseConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::observability::sanitize_url_for_logging;
use deadpool_postgres::{Config, Object, Pool, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Postgres connection pool shared by the remote food cache, profile store and plan catalog
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    /// Create a new Postgres client with connection pooling
    pub async fn new(config: &DatabaseConfig) -> ServiceResult<Self> {
        info!("Initializing Postgres client with URL: {}", sanitize_url_for_logging(&config.url));

        let url = &config.url;
        if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
            return Err(ServiceError::DatabaseError("Invalid database URL format".to_string()));
        }

        let timeout = Duration::from_secs(config.connection_timeout_secs);
        let mut pool_config = deadpool_postgres::PoolConfig::new(config.max_connections as usize);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);

        let mut pg_config = Config::new();
        pg_config.url = Some(url.clone());
        pg_config.pool = Some(pool_config);

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ServiceError::DatabaseError(format!("Failed to create connection pool: {}", e)))?;

        let client = Self { pool };
        client.health_check().await?;

        info!("Postgres client connected successfully");
        Ok(client)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    pub(crate) async fn connection(&self) -> ServiceResult<Object> {
        get_connection(&self.pool).await
    }

    /// Check database connection health
    pub async fn health_check(&self) -> ServiceResult<()> {
        let start = std::time::Instant::now();
        let client = self.connection().await?;

        let rows = client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| ServiceError::DatabaseError(format!("Health check query failed: {}", e)))?;

        if rows.is_empty() {
            return Err(ServiceError::DatabaseError("Health check returned no results".to_string()));
        }

        debug!("Database health check passed in {:?}", start.elapsed());
        Ok(())
    }

    /// Create tables and indexes if they do not exist
    pub async fn initialize_schema(&self) -> ServiceResult<()> {
        info!("Initializing database schema");
        let client = self.connection().await?;

        let tables = [
            ("food_cache", DatabaseSchema::create_food_cache_table_sql()),
            ("profiles", DatabaseSchema::create_profiles_table_sql()),
            ("plan_templates", DatabaseSchema::create_plan_templates_table_sql()),
        ];
        for (name, sql) in tables {
            client
                .execute(sql, &[])
                .await
                .map_err(|e| ServiceError::DatabaseError(format!("Failed to create {} table: {}", name, e)))?;
        }

        for index_query in DatabaseSchema::create_indexes_sql() {
            client
                .execute(index_query, &[])
                .await
                .map_err(|e| ServiceError::DatabaseError(format!("Failed to create index: {}", e)))?;
        }

        info!("Database schema initialized successfully");
        Ok(())
    }
}

pub(crate) async fn get_connection(pool: &Pool) -> ServiceResult<Object> {
    pool.get()
        .await
        .map_err(|e| ServiceError::DatabaseError(format!("Failed to get connection: {}", e)))
}
