//! Database connection handling
//!
//! [`DatabaseConnection`] is the injected handle: it owns the pool and hands
//! out the dialect collaborators as trait objects.

use std::sync::Arc;
use std::time::Duration;

use sqlx::{
    mysql::MySqlPoolOptions, postgres::PgPoolOptions, sqlite::SqlitePoolOptions, MySqlPool,
    PgPool, SqlitePool,
};

use crate::config::DatabaseConfig;
use crate::db::history::{HistoryStore, MySqlHistory, PostgresHistory, SqliteHistory};
use crate::dialect::{MySqlMigrator, PostgresMigrator, SpecificMigrator, SqliteMigrator};
use crate::error::{Error, Result};

/// Enumeration of supported database types
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl DatabaseConnection {
    /// Create a new database connection from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool_size = config.pool_size.unwrap_or(10);
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));

        tracing::debug!(driver = %config.driver, pool_size, "Connecting to database");

        match config.driver.as_str() {
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?;

                Ok(DatabaseConnection::Postgres(pool))
            }
            "mysql" => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?;

                Ok(DatabaseConnection::MySql(pool))
            }
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?;

                Ok(DatabaseConnection::Sqlite(pool))
            }
            _ => Err(Error::DatabaseError(format!(
                "Unsupported database driver: {}",
                config.driver
            ))),
        }
    }

    pub fn driver(&self) -> &'static str {
        match self {
            DatabaseConnection::Postgres(_) => "postgres",
            DatabaseConnection::MySql(_) => "mysql",
            DatabaseConnection::Sqlite(_) => "sqlite",
        }
    }

    /// The dialect collaborator for this connection
    pub fn migrator(&self) -> Arc<dyn SpecificMigrator> {
        match self {
            DatabaseConnection::Postgres(pool) => Arc::new(PostgresMigrator::new(pool.clone())),
            DatabaseConnection::MySql(pool) => Arc::new(MySqlMigrator::new(pool.clone())),
            DatabaseConnection::Sqlite(pool) => Arc::new(SqliteMigrator::new(pool.clone())),
        }
    }

    /// The migration ledger for this connection
    pub fn history(&self) -> Arc<dyn HistoryStore> {
        match self {
            DatabaseConnection::Postgres(pool) => Arc::new(PostgresHistory::new(pool.clone())),
            DatabaseConnection::MySql(pool) => Arc::new(MySqlHistory::new(pool.clone())),
            DatabaseConnection::Sqlite(pool) => Arc::new(SqliteHistory::new(pool.clone())),
        }
    }

    pub async fn close(&self) {
        match self {
            DatabaseConnection::Postgres(pool) => pool.close().await,
            DatabaseConnection::MySql(pool) => pool.close().await,
            DatabaseConnection::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Single-connection in-memory SQLite pool; every handle sees the same database
#[cfg(test)]
pub(crate) async fn sqlite_memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}
