//! Migration history ledger
//!
//! Applied versions are tracked in the `schema_migrate_history` table of the
//! target database. The table is created on first use; its unique constraint
//! on `version` is the only guard against concurrent writers.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, PgPool, SqlitePool};

use crate::error::{Error, Result};
use crate::migration::types::AppliedMigration;
use crate::MIGRATIONS_TABLE_NAME;

/// Durable record of which migrations have been applied
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create the history table if it does not exist yet
    async fn ensure_migration_table(&self) -> Result<()>;

    /// Every applied migration, in the order it was recorded
    async fn get_applied_migrations(&self) -> Result<Vec<AppliedMigration>>;

    async fn record_migration(&self, version: &str, name: &str, checksum: &str) -> Result<()>;

    async fn is_migration_applied(&self, version: &str) -> Result<bool>;

    /// The most recently recorded migration
    async fn get_last_migration(&self) -> Result<Option<AppliedMigration>>;

    async fn remove_migration(&self, version: &str) -> Result<()>;

    /// Forget every applied migration
    async fn clear(&self) -> Result<()>;

    /// Execute `statements` and record `version` in a single transaction.
    ///
    /// A failing statement is reported as [`Error::ApplyError`] and nothing is
    /// committed, subject to the engine's handling of DDL inside transactions.
    async fn apply_and_record(
        &self,
        statements: &[String],
        version: &str,
        name: &str,
        checksum: &str,
    ) -> Result<()>;
}

/// SQL text for one backend, rendered once at construction
struct HistoryQueries {
    create_table: String,
    select_all: String,
    select_last: String,
    insert: String,
    exists: String,
    delete: String,
    clear: String,
}

impl HistoryQueries {
    fn new(create_table: String, placeholder: fn(usize) -> String) -> Self {
        let table = MIGRATIONS_TABLE_NAME;
        let columns = "id, version, name, checksum, applied_at";

        Self {
            create_table,
            select_all: format!("SELECT {} FROM {} ORDER BY id", columns, table),
            select_last: format!("SELECT {} FROM {} ORDER BY id DESC LIMIT 1", columns, table),
            insert: format!(
                "INSERT INTO {} (version, name, checksum, applied_at) VALUES ({}, {}, {}, {})",
                table,
                placeholder(1),
                placeholder(2),
                placeholder(3),
                placeholder(4)
            ),
            exists: format!(
                "SELECT COUNT(*) FROM {} WHERE version = {}",
                table,
                placeholder(1)
            ),
            delete: format!("DELETE FROM {} WHERE version = {}", table, placeholder(1)),
            clear: format!("DELETE FROM {}", table),
        }
    }
}

fn question_mark(_: usize) -> String {
    "?".to_string()
}

fn dollar(n: usize) -> String {
    format!("${}", n)
}

fn history_error(action: &str, error: sqlx::Error) -> Error {
    Error::HistoryError(format!("Failed to {}: {}", action, error))
}

/// Implements [`HistoryStore`] for a backend holding `pool` and `queries`.
/// The bodies are identical across engines; only the pool type differs.
macro_rules! impl_history_store {
    ($backend:ident) => {
        #[async_trait]
        impl HistoryStore for $backend {
            async fn ensure_migration_table(&self) -> Result<()> {
                sqlx::query(&self.queries.create_table)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| history_error("create migration history table", e))?;
                Ok(())
            }

            async fn get_applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
                sqlx::query_as::<_, AppliedMigration>(&self.queries.select_all)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| history_error("read applied migrations", e))
            }

            async fn record_migration(
                &self,
                version: &str,
                name: &str,
                checksum: &str,
            ) -> Result<()> {
                sqlx::query(&self.queries.insert)
                    .bind(version)
                    .bind(name)
                    .bind(checksum)
                    .bind(Utc::now())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| history_error(&format!("record migration {}", version), e))?;
                Ok(())
            }

            async fn is_migration_applied(&self, version: &str) -> Result<bool> {
                let count: i64 = sqlx::query_scalar(&self.queries.exists)
                    .bind(version)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| history_error("check migration status", e))?;
                Ok(count > 0)
            }

            async fn get_last_migration(&self) -> Result<Option<AppliedMigration>> {
                sqlx::query_as::<_, AppliedMigration>(&self.queries.select_last)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| history_error("read last migration", e))
            }

            async fn remove_migration(&self, version: &str) -> Result<()> {
                sqlx::query(&self.queries.delete)
                    .bind(version)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| history_error(&format!("remove migration {}", version), e))?;
                Ok(())
            }

            async fn clear(&self) -> Result<()> {
                sqlx::query(&self.queries.clear)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| history_error("clear migration history", e))?;
                Ok(())
            }

            async fn apply_and_record(
                &self,
                statements: &[String],
                version: &str,
                name: &str,
                checksum: &str,
            ) -> Result<()> {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| history_error("begin transaction", e))?;

                for statement in statements {
                    tracing::debug!("Executing: {}", statement);
                    sqlx::query(statement)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| Error::ApplyError {
                            statement: statement.clone(),
                            message: e.to_string(),
                        })?;
                }

                sqlx::query(&self.queries.insert)
                    .bind(version)
                    .bind(name)
                    .bind(checksum)
                    .bind(Utc::now())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| history_error(&format!("record migration {}", version), e))?;

                tx.commit()
                    .await
                    .map_err(|e| history_error("commit transaction", e))?;

                Ok(())
            }
        }
    };
}

/// History ledger stored in SQLite
pub struct SqliteHistory {
    pool: SqlitePool,
    queries: HistoryQueries,
}

impl SqliteHistory {
    pub fn new(pool: SqlitePool) -> Self {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                checksum VARCHAR(64) NOT NULL
            )",
            MIGRATIONS_TABLE_NAME
        );

        Self {
            pool,
            queries: HistoryQueries::new(create_table, question_mark),
        }
    }
}

/// History ledger stored in PostgreSQL
pub struct PostgresHistory {
    pool: PgPool,
    queries: HistoryQueries,
}

impl PostgresHistory {
    pub fn new(pool: PgPool) -> Self {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                version VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
                checksum VARCHAR(64) NOT NULL
            )",
            MIGRATIONS_TABLE_NAME
        );

        Self {
            pool,
            queries: HistoryQueries::new(create_table, dollar),
        }
    }
}

/// History ledger stored in MySQL
pub struct MySqlHistory {
    pool: MySqlPool,
    queries: HistoryQueries,
}

impl MySqlHistory {
    pub fn new(pool: MySqlPool) -> Self {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                version VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                applied_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                checksum VARCHAR(64) NOT NULL
            )",
            MIGRATIONS_TABLE_NAME
        );

        Self {
            pool,
            queries: HistoryQueries::new(create_table, question_mark),
        }
    }
}

impl_history_store!(SqliteHistory);
impl_history_store!(PostgresHistory);
impl_history_store!(MySqlHistory);
