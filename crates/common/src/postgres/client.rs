use crate::domain::{DomainError, DomainResult};
use crate::postgres::{PostgresConfig, classify_pg_error, classify_pool_error};
use anyhow::Result;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// PostgreSQL client wrapper with connection pooling.
///
/// Every pipeline component builds its own client so no two components ever
/// share a connection.
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
}

impl PostgresClient {
    /// Creates a new PostgreSQL client with connection pooling
    ///
    /// # Arguments
    /// * `host` - Database host (e.g., "localhost")
    /// * `port` - Database port (e.g., 5432)
    /// * `database` - Database name
    /// * `username` - Database username
    /// * `password` - Database password
    /// * `max_pool_size` - Maximum number of connections in the pool
    pub fn new(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
        max_pool_size: usize,
    ) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(host.to_string());
        cfg.port = Some(port);
        cfg.dbname = Some(database.to_string());
        cfg.user = Some(username.to_string());
        cfg.password = Some(password.to_string());
        // Verified recycling runs a test query on checkout, which is what
        // surfaces a dropped connection before an insert is attempted.
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Verified,
        });

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        pool.resize(max_pool_size.max(1));

        Ok(Self { pool })
    }

    pub fn from_config(config: &PostgresConfig) -> Result<Self> {
        Self::new(
            &config.host,
            config.port,
            &config.database,
            &config.username,
            &config.password,
            config.max_pool_size,
        )
    }

    /// Pings the database to verify connectivity
    pub async fn ping(&self) -> DomainResult<()> {
        let client = self.get_connection().await?;
        client
            .execute("SELECT 1", &[])
            .await
            .map_err(classify_pg_error)?;
        debug!("PostgreSQL connection successful");
        Ok(())
    }

    /// Gets a connection from the pool
    pub async fn get_connection(&self) -> DomainResult<deadpool_postgres::Client> {
        if self.pool.is_closed() {
            return Err(DomainError::ConnectionLost("connection pool is closed".to_string()));
        }
        self.pool.get().await.map_err(classify_pool_error)
    }

    /// Drops every idle pooled connection and verifies a fresh one can be opened.
    pub async fn reset(&self) -> DomainResult<()> {
        let _ = self.pool.retain(|_, _| false);
        self.ping().await?;
        info!("PostgreSQL connection re-established");
        Ok(())
    }

    pub fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close();
            debug!("PostgreSQL connection pool closed");
        }
    }
}
