//! Migration file generation
//!
//! Turns a schema diff into a versioned [`MigrationFile`] with forward and
//! reverse scripts.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::dialect::SpecificMigrator;
use crate::error::{Error, Result, ResultExt};
use crate::migration::file_store::FileStore;
use crate::migration::types::{MigrationFile, MigrationMetadata};
use crate::models::DeclaredModel;
use crate::schema::diff::{compute_checksum, ChangeType, Differ, SchemaChange};

/// Current unix time in seconds, bumped past `latest` when the clock lags it
pub(crate) fn next_version(latest: Option<&str>) -> String {
    let now = Utc::now().timestamp().max(0) as u64;
    match latest.and_then(|v| v.parse::<u64>().ok()) {
        Some(latest) if latest >= now => (latest + 1).to_string(),
        _ => now.to_string(),
    }
}

/// Builds migration files from the difference between models and the database
pub struct Generator {
    differ: Differ,
    migrator: Arc<dyn SpecificMigrator>,
    file_store: FileStore,
}

impl Generator {
    pub fn new(migrator: Arc<dyn SpecificMigrator>, file_store: FileStore) -> Self {
        Self {
            differ: Differ::new(migrator.clone()),
            migrator,
            file_store,
        }
    }

    /// Diff `models` against the database and build the migration that closes the gap.
    ///
    /// Fails with [`Error::NoChanges`] when the database already matches. The
    /// returned file is not written to disk.
    pub async fn generate_migration(
        &self,
        name: &str,
        models: &IndexMap<String, DeclaredModel>,
    ) -> Result<MigrationFile> {
        let changes = self
            .differ
            .compute_diff(models)
            .await
            .context("Failed to compute diff")?;

        if changes.is_empty() {
            return Err(Error::NoChanges);
        }

        let version = next_version(self.file_store.latest_version()?.as_deref());
        let (up_sql, down_sql) = self
            .generate_sql(&version, &changes)
            .context("Failed to generate SQL")?;

        let schemas = models
            .iter()
            .map(|(key, model)| (key.clone(), compute_schema_hash(model)))
            .collect();

        let description = describe_changes(&changes);
        info!(version = %version, name, description = %description, "Generated migration");

        Ok(MigrationFile {
            version: version.clone(),
            name: name.to_string(),
            up_sql,
            down_sql,
            metadata: MigrationMetadata {
                version,
                name: name.to_string(),
                checksum: compute_checksum(&changes),
                created_at: Utc::now(),
                description,
                changes,
                schemas,
            },
        })
    }

    /// Build the forward and reverse scripts for `changes`.
    ///
    /// Per table: index drops first, then table and column changes, then index
    /// additions. Every reverse statement is prepended so the reverse script
    /// undoes the forward one back to front.
    pub fn generate_sql(
        &self,
        version: &str,
        changes: &[SchemaChange],
    ) -> Result<(String, String)> {
        let mut up: Vec<String> = Vec::new();
        let mut down: Vec<String> = Vec::new();

        let mut by_table: IndexMap<&str, Vec<&SchemaChange>> = IndexMap::new();
        for change in changes {
            by_table
                .entry(change.table_name.as_str())
                .or_default()
                .push(change);
        }

        for (table, table_changes) in &by_table {
            for change in table_changes
                .iter()
                .filter(|c| c.change_type == ChangeType::DropIndex)
            {
                up.push(change.sql.clone());
                let index_name = change.index_name.as_deref().unwrap_or_default();
                let reverse = match &change.index_def {
                    Some(index) => self.migrator.generate_create_index_sql(table, index),
                    None => format!(
                        "-- Cannot recreate index {} without stored definition",
                        index_name
                    ),
                };
                down.insert(0, reverse);
            }

            for change in table_changes {
                let column = change.column_name.as_deref().unwrap_or_default();
                let reverse = match change.change_type {
                    ChangeType::CreateTable => self.migrator.generate_drop_table_sql(table),
                    ChangeType::DropTable => {
                        format!("-- Cannot recreate table {} without stored schema", table)
                    }
                    ChangeType::AddColumn => self
                        .migrator
                        .generate_drop_column_sql(table, column)?
                        .join(";\n"),
                    ChangeType::DropColumn => format!(
                        "-- Cannot recreate column {}.{} without stored definition",
                        table, column
                    ),
                    ChangeType::AlterColumn => format!(
                        "-- Cannot revert column {}.{} without stored old definition",
                        table, column
                    ),
                    ChangeType::AddIndex | ChangeType::DropIndex => continue,
                };
                up.push(change.sql.clone());
                down.insert(0, reverse);
            }

            for change in table_changes
                .iter()
                .filter(|c| c.change_type == ChangeType::AddIndex)
            {
                up.push(change.sql.clone());
                let index_name = change.index_name.as_deref().unwrap_or_default();
                down.insert(0, self.migrator.generate_drop_index_sql(table, index_name));
            }
        }

        Ok((
            build_script(&up, "UP", version),
            build_script(&down, "DOWN", version),
        ))
    }
}

fn build_script(statements: &[String], direction: &str, version: &str) -> String {
    let mut lines = vec![
        format!("-- schema_migrate Migration {}", version),
        format!("-- Direction: {}", direction),
        format!(
            "-- Generated at: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        String::new(),
    ];

    for statement in statements {
        if statement.starts_with("--") {
            lines.push(statement.clone());
        } else {
            lines.push(format!("{};", statement));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Human-readable summary, e.g. `Create 2 table(s), Add 3 column(s)`
pub fn describe_changes(changes: &[SchemaChange]) -> String {
    let count = |kind: ChangeType| changes.iter().filter(|c| c.change_type == kind).count();

    [
        (ChangeType::CreateTable, "Create", "table(s)"),
        (ChangeType::DropTable, "Drop", "table(s)"),
        (ChangeType::AddColumn, "Add", "column(s)"),
        (ChangeType::DropColumn, "Drop", "column(s)"),
        (ChangeType::AlterColumn, "Alter", "column(s)"),
        (ChangeType::AddIndex, "Add", "index(es)"),
        (ChangeType::DropIndex, "Drop", "index(es)"),
    ]
    .iter()
    .filter_map(|(kind, verb, noun)| match count(*kind) {
        0 => None,
        n => Some(format!("{} {} {}", verb, n, noun)),
    })
    .collect::<Vec<_>>()
    .join(", ")
}

/// Content hash of a declared model
pub fn compute_schema_hash(model: &DeclaredModel) -> String {
    let mut hasher = Sha256::new();

    hasher.update(model.name.as_bytes());
    hasher.update(model.table_name.as_bytes());

    for field in &model.fields {
        hasher.update(field.name.as_bytes());
        hasher.update(field.field_type.as_str().as_bytes());
        hasher.update(field.db_type.as_deref().unwrap_or_default().as_bytes());
        hasher.update(field.primary_key.to_string().as_bytes());
        hasher.update(field.auto_increment.to_string().as_bytes());
        hasher.update(field.nullable.to_string().as_bytes());
        hasher.update(field.unique.to_string().as_bytes());
        if let Some(default) = &field.default {
            hasher.update(default.to_string().as_bytes());
        }
        hasher.update(field.column.as_deref().unwrap_or_default().as_bytes());
    }

    for index in &model.indexes {
        hasher.update(index.name.as_bytes());
        hasher.update(index.fields.join(",").as_bytes());
        hasher.update(index.unique.to_string().as_bytes());
    }

    hex::encode(hasher.finalize())
}
