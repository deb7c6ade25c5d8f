//! File-mode migration runner
//!
//! Applies pending migration files in ascending version order and rolls back
//! the most recently applied one. Statements run one at a time through the
//! dialect; a batch is not wrapped in a transaction.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::db::history::HistoryStore;
use crate::dialect::SpecificMigrator;
use crate::error::{Error, Result, ResultExt};
use crate::migration::file_store::FileStore;
use crate::migration::types::MigrationFile;

/// Split a script into statements.
///
/// A statement ends at a line whose trimmed text ends in `;`. Comment-only
/// lines are dropped, and a trailing statement without a terminator is kept.
pub fn split_sql_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }

        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim().trim_end_matches(';').trim_end();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }

    statements
}

pub struct Runner {
    migrator: Arc<dyn SpecificMigrator>,
    history: Arc<dyn HistoryStore>,
    file_store: FileStore,
}

impl Runner {
    pub fn new(
        migrator: Arc<dyn SpecificMigrator>,
        history: Arc<dyn HistoryStore>,
        file_store: FileStore,
    ) -> Self {
        Self {
            migrator,
            history,
            file_store,
        }
    }

    /// Apply every pending migration; returns the versions applied by this call
    pub async fn run_migrations(&self) -> Result<Vec<String>> {
        self.history
            .ensure_migration_table()
            .await
            .context("Failed to ensure migration table")?;

        let applied: HashSet<String> = self
            .history
            .get_applied_migrations()
            .await
            .context("Failed to get applied migrations")?
            .into_iter()
            .map(|m| m.version)
            .collect();

        let pending = self
            .file_store
            .get_pending_migrations(&applied)
            .context("Failed to get pending migrations")?;

        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(Vec::new());
        }

        info!(count = pending.len(), "Found pending migrations");
        for migration in &pending {
            info!(version = %migration.version, name = %migration.name, "Pending");
        }

        let mut versions = Vec::with_capacity(pending.len());
        for migration in &pending {
            self.apply_migration(migration)
                .await
                .with_context(|| format!("Failed to apply migration {}", migration.version))?;
            versions.push(migration.version.clone());
        }

        info!(count = versions.len(), "Applied migrations");

        Ok(versions)
    }

    /// Roll back the most recently applied migration and return its version
    pub async fn rollback_migration(&self) -> Result<String> {
        self.history
            .ensure_migration_table()
            .await
            .context("Failed to ensure migration table")?;

        let last = self
            .history
            .get_last_migration()
            .await
            .context("Failed to get last migration")?
            .ok_or(Error::NothingToRollback)?;

        let migration = self
            .file_store
            .read_migration(&last.version)
            .context("Failed to read migration file")?;

        info!(version = %migration.version, name = %migration.name, "Rolling back migration");

        self.execute_script(&migration.down_sql)
            .await
            .with_context(|| format!("Failed to roll back migration {}", migration.version))?;

        self.history
            .remove_migration(&migration.version)
            .await
            .context("Failed to remove migration record")?;

        info!(version = %migration.version, "Rollback completed");

        Ok(migration.version)
    }

    async fn apply_migration(&self, migration: &MigrationFile) -> Result<()> {
        info!(version = %migration.version, name = %migration.name, "Applying migration");

        if migration.metadata.checksum.is_empty() {
            return Err(Error::MigrationError(format!(
                "Migration {} has no checksum",
                migration.version
            )));
        }

        self.execute_script(&migration.up_sql).await?;

        self.history
            .record_migration(
                &migration.version,
                &migration.name,
                &migration.metadata.checksum,
            )
            .await
    }

    async fn execute_script(&self, script: &str) -> Result<()> {
        for statement in split_sql_statements(script) {
            debug!("Executing: {}", statement);
            self.migrator
                .apply_migration(&statement)
                .await
                .map_err(|e| Error::ApplyError {
                    statement: statement.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::sqlite_memory_pool;
    use crate::db::history::SqliteHistory;
    use crate::dialect::testing::ScriptedMigrator;
    use crate::migration::types::MigrationMetadata;
    use chrono::Utc;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn migration(version: &str, up_sql: &str) -> MigrationFile {
        MigrationFile {
            version: version.to_string(),
            name: format!("step {}", version),
            up_sql: up_sql.to_string(),
            down_sql: String::new(),
            metadata: MigrationMetadata {
                version: version.to_string(),
                name: format!("step {}", version),
                checksum: "abc".to_string(),
                created_at: Utc::now(),
                description: String::new(),
                changes: Vec::new(),
                schemas: IndexMap::new(),
            },
        }
    }

    async fn runner(
        migrator: Arc<ScriptedMigrator>,
        dir: &TempDir,
    ) -> (Runner, Arc<SqliteHistory>) {
        let history = Arc::new(SqliteHistory::new(sqlite_memory_pool().await));
        let runner = Runner::new(migrator, history.clone(), FileStore::new(dir.path()));
        (runner, history)
    }

    #[tokio::test]
    async fn test_failing_statement_aborts_the_run() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let first = migration("1", "CREATE TABLE a;\nCREATE TABLE b;\nCREATE TABLE c;\n");
        store.write_migration(&first).unwrap();
        store
            .write_migration(&migration("2", "CREATE TABLE d;\n"))
            .unwrap();

        let migrator = Arc::new(ScriptedMigrator::new().with_failing_statement("CREATE TABLE b"));
        let (runner, history) = runner(migrator.clone(), &dir).await;

        let err = runner.run_migrations().await.unwrap_err();
        match err.root_cause() {
            Error::ApplyError { statement, .. } => assert_eq!(statement, "CREATE TABLE b"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("Failed to apply migration 1"));

        assert!(history.get_applied_migrations().await.unwrap().is_empty());
        assert_eq!(migrator.executed(), vec!["CREATE TABLE a"]);
    }

    #[tokio::test]
    async fn test_run_applies_pending_in_order_and_records_them() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store
            .write_migration(&migration("20", "CREATE TABLE later;\n"))
            .unwrap();
        store
            .write_migration(&migration("3", "-- header\nCREATE TABLE first;\n"))
            .unwrap();

        let migrator = Arc::new(ScriptedMigrator::new());
        let (runner, history) = runner(migrator.clone(), &dir).await;

        assert_eq!(runner.run_migrations().await.unwrap(), vec!["3", "20"]);
        assert_eq!(
            migrator.executed(),
            vec!["CREATE TABLE first", "CREATE TABLE later"]
        );

        let applied: Vec<String> = history
            .get_applied_migrations()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(applied, vec!["3", "20"]);

        assert!(runner.run_migrations().await.unwrap().is_empty());
    }

    #[test]
    fn test_split_skips_comments_and_headers() {
        let script = "-- schema_migrate Migration 1\n-- Direction: UP\n\nCREATE TABLE users (\n  id INTEGER\n);\n\n-- Cannot recreate table legacy without stored schema\n\nDROP INDEX idx_a;\n";

        assert_eq!(
            split_sql_statements(script),
            vec!["CREATE TABLE users (\n  id INTEGER\n)", "DROP INDEX idx_a"]
        );
    }

    #[test]
    fn test_split_keeps_unterminated_tail() {
        assert_eq!(
            split_sql_statements("SELECT 1;\nSELECT 2"),
            vec!["SELECT 1", "SELECT 2"]
        );
    }

    #[test]
    fn test_split_ignores_bare_terminators() {
        assert_eq!(split_sql_statements(";\n  ;\n"), Vec::<String>::new());
        assert!(split_sql_statements("-- only a comment\n").is_empty());
    }
}
