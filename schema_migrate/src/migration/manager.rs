//! Migration orchestration
//!
//! [`MigrationManager`] is the entry point callers use. In auto mode it diffs
//! and applies in one transaction; in file mode it generates, runs and rolls
//! back versioned migration files.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::db::connection::DatabaseConnection;
use crate::db::history::HistoryStore;
use crate::dialect::SpecificMigrator;
use crate::error::{Error, Result, ResultExt};
use crate::migration::file_store::FileStore;
use crate::migration::generator::{next_version, Generator};
use crate::migration::runner::{split_sql_statements, Runner};
use crate::migration::types::{
    MigrateOutcome, MigrationFile, MigrationMode, MigrationOptions, MigrationStatus,
};
use crate::models::DeclaredModel;
use crate::schema::diff::{compute_checksum, Differ, SchemaChange};
use crate::MIGRATIONS_TABLE_NAME;

const AUTO_MIGRATION_NAME: &str = "auto-migration";

/// Components that only exist in file mode
struct FileMode {
    file_store: FileStore,
    generator: Generator,
    runner: Runner,
}

pub struct MigrationManager {
    migrator: Arc<dyn SpecificMigrator>,
    history: Arc<dyn HistoryStore>,
    differ: Differ,
    options: MigrationOptions,
    file_mode: Option<FileMode>,
}

impl MigrationManager {
    /// Build a manager over an open connection
    pub fn new(connection: &DatabaseConnection, options: MigrationOptions) -> Self {
        Self::from_parts(connection.migrator(), connection.history(), options)
    }

    /// Build a manager from explicit collaborators
    pub fn from_parts(
        migrator: Arc<dyn SpecificMigrator>,
        history: Arc<dyn HistoryStore>,
        options: MigrationOptions,
    ) -> Self {
        let file_mode = match options.mode {
            MigrationMode::File => {
                let file_store = FileStore::new(&options.migrations_dir);
                Some(FileMode {
                    generator: Generator::new(migrator.clone(), file_store.clone()),
                    runner: Runner::new(migrator.clone(), history.clone(), file_store.clone()),
                    file_store,
                })
            }
            MigrationMode::Auto => None,
        };

        Self {
            differ: Differ::new(migrator.clone()),
            migrator,
            history,
            options,
            file_mode,
        }
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Bring the database up to date in the configured mode.
    ///
    /// Auto mode diffs `models` against the database. File mode ignores
    /// `models` and applies pending migration files.
    pub async fn migrate(
        &self,
        models: &IndexMap<String, DeclaredModel>,
    ) -> Result<MigrateOutcome> {
        match &self.file_mode {
            Some(file_mode) => {
                let versions = file_mode.runner.run_migrations().await?;
                if versions.is_empty() {
                    Ok(MigrateOutcome::UpToDate)
                } else {
                    Ok(MigrateOutcome::Applied { versions })
                }
            }
            None => self.auto_migrate(models).await,
        }
    }

    async fn auto_migrate(
        &self,
        models: &IndexMap<String, DeclaredModel>,
    ) -> Result<MigrateOutcome> {
        info!("Starting auto-migration");

        self.history
            .ensure_migration_table()
            .await
            .context("Failed to ensure migration table")?;

        let changes = self
            .differ
            .compute_diff(models)
            .await
            .context("Failed to compute schema diff")?;

        if changes.is_empty() {
            info!("No schema changes detected");
            return Ok(MigrateOutcome::UpToDate);
        }

        let last = self.history.get_last_migration().await?;
        let version = next_version(last.as_ref().map(|m| m.version.as_str()));
        let checksum = compute_checksum(&changes);

        info!(changes = changes.len(), version = %version, "Generated migration plan");

        if self.options.dry_run {
            log_plan(&changes);
            return Ok(MigrateOutcome::DryRun { version, changes });
        }

        let destructive: Vec<String> = changes
            .iter()
            .filter(|c| c.change_type.is_destructive())
            .map(SchemaChange::summary)
            .collect();

        if !destructive.is_empty() {
            for change in &destructive {
                warn!(change = %change, "Destructive change");
            }
            if !self.options.force {
                return Err(Error::DestructiveChanges {
                    changes: destructive,
                });
            }
        }

        let statements: Vec<String> = changes
            .iter()
            .flat_map(|change| split_sql_statements(&format!("{};", change.sql)))
            .collect();

        self.history
            .apply_and_record(&statements, &version, AUTO_MIGRATION_NAME, &checksum)
            .await
            .context("Migration failed")?;

        info!(version = %version, "Migration completed");

        Ok(MigrateOutcome::Applied {
            versions: vec![version],
        })
    }

    /// Generate a migration file for the difference between `models` and the database
    pub async fn generate_migration(
        &self,
        name: &str,
        models: &IndexMap<String, DeclaredModel>,
    ) -> Result<MigrationFile> {
        let file_mode = self.file_mode()?;

        let migration = file_mode
            .generator
            .generate_migration(name, models)
            .await?;

        let path = file_mode
            .file_store
            .write_migration(&migration)
            .context("Failed to write migration")?;

        info!(
            version = %migration.version,
            name = %migration.name,
            path = %path.display(),
            "Generated migration"
        );

        Ok(migration)
    }

    /// Roll back the most recently applied migration file; returns its version
    pub async fn rollback_migration(&self) -> Result<String> {
        self.file_mode()?.runner.rollback_migration().await
    }

    pub async fn get_migration_status(&self) -> Result<MigrationStatus> {
        self.history
            .ensure_migration_table()
            .await
            .context("Failed to ensure migration table")?;

        let applied_migrations = self.history.get_applied_migrations().await?;
        let last_migration = applied_migrations.last().cloned();

        let mut tables = Vec::new();
        for table in self.migrator.get_tables().await? {
            if table == MIGRATIONS_TABLE_NAME {
                continue;
            }
            tables.push(self.migrator.get_table_info(&table).await?);
        }

        Ok(MigrationStatus {
            applied_migrations,
            last_migration,
            table_count: tables.len(),
            tables,
        })
    }

    /// Drop every table except the history table, then clear the history
    pub async fn reset_migrations(&self) -> Result<()> {
        info!("Resetting all migrations");

        for table in self.migrator.get_tables().await? {
            if table == MIGRATIONS_TABLE_NAME {
                continue;
            }
            let sql = self.migrator.generate_drop_table_sql(&table);
            match self.migrator.apply_migration(&sql).await {
                Ok(()) => info!(table = %table, "Dropped table"),
                Err(e) => warn!(table = %table, error = %e, "Failed to drop table"),
            }
        }

        self.history.ensure_migration_table().await?;
        self.history.clear().await?;

        info!("Migration reset completed");

        Ok(())
    }

    fn file_mode(&self) -> Result<&FileMode> {
        self.file_mode.as_ref().ok_or_else(|| {
            Error::ConfigError(
                "File-based migrations not configured; set migrations.mode = \"file\"".to_string(),
            )
        })
    }
}

fn log_plan(changes: &[SchemaChange]) {
    info!("=== MIGRATION PLAN (DRY RUN) ===");
    for (i, change) in changes.iter().enumerate() {
        info!(
            step = i + 1,
            change = %change.change_type,
            table = %change.table_name,
            column = change.column_name.as_deref().unwrap_or_default(),
            sql = %change.sql,
            "Planned change"
        );
    }
    info!("=== END MIGRATION PLAN ===");
}
