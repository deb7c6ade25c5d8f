//! Schema difference calculator
//!
//! The [`Differ`] compares declared models with the live database and
//! produces an ordered list of [`SchemaChange`]s, each carrying the SQL the
//! dialect generated for it.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::dialect::SpecificMigrator;
use crate::error::{Error, Result, ResultExt};
use crate::models::DeclaredModel;
use crate::schema::types::IndexInfo;
use crate::MIGRATIONS_TABLE_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    CreateTable,
    DropTable,
    AddColumn,
    DropColumn,
    AlterColumn,
    AddIndex,
    DropIndex,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::CreateTable => "CREATE_TABLE",
            ChangeType::DropTable => "DROP_TABLE",
            ChangeType::AddColumn => "ADD_COLUMN",
            ChangeType::DropColumn => "DROP_COLUMN",
            ChangeType::AlterColumn => "ALTER_COLUMN",
            ChangeType::AddIndex => "ADD_INDEX",
            ChangeType::DropIndex => "DROP_INDEX",
        }
    }

    /// Changes that can lose data
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            ChangeType::DropTable | ChangeType::DropColumn | ChangeType::AlterColumn
        )
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single schema change and the SQL that performs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaChange {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    pub sql: String,
    /// Definition of a dropped index, so the reverse script can recreate it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_def: Option<IndexInfo>,
}

impl SchemaChange {
    pub fn new(change_type: ChangeType, table_name: &str, sql: String) -> Self {
        Self {
            change_type,
            table_name: table_name.to_string(),
            column_name: None,
            index_name: None,
            sql,
            index_def: None,
        }
    }

    pub fn with_column(mut self, column_name: &str) -> Self {
        self.column_name = Some(column_name.to_string());
        self
    }

    pub fn with_index(mut self, index_name: &str) -> Self {
        self.index_name = Some(index_name.to_string());
        self
    }

    /// `TYPE: table[.column]`, used in logs and error messages
    pub fn summary(&self) -> String {
        match (&self.column_name, &self.index_name) {
            (Some(column), _) => format!("{}: {}.{}", self.change_type, self.table_name, column),
            (None, Some(index)) => format!("{}: {} ({})", self.change_type, self.table_name, index),
            (None, None) => format!("{}: {}", self.change_type, self.table_name),
        }
    }
}

/// SHA-256 over each change's type, table and SQL, in order
pub fn compute_checksum(changes: &[SchemaChange]) -> String {
    let mut hasher = Sha256::new();

    for change in changes {
        hasher.update(change.change_type.as_str().as_bytes());
        hasher.update(change.table_name.as_bytes());
        hasher.update(change.sql.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// Computes ordered schema changes through a dialect collaborator
pub struct Differ {
    migrator: Arc<dyn SpecificMigrator>,
}

impl Differ {
    pub fn new(migrator: Arc<dyn SpecificMigrator>) -> Self {
        Self { migrator }
    }

    /// Diff every declared model against the live database.
    ///
    /// Per-model changes come first, in model order, followed by drops of
    /// undeclared live tables in listing order. The history table is never
    /// dropped. Any collaborator failure aborts the whole diff.
    pub async fn compute_diff(
        &self,
        models: &IndexMap<String, DeclaredModel>,
    ) -> Result<Vec<SchemaChange>> {
        let live_tables = self.migrator.get_tables().await?;
        let live_set: IndexSet<&str> = live_tables.iter().map(String::as_str).collect();

        let mut changes = Vec::new();

        for model in models.values() {
            if model.table_name == MIGRATIONS_TABLE_NAME {
                warn!(
                    model = %model.name,
                    "Model uses the reserved migration history table name"
                );
            }

            if live_set.contains(model.table_name.as_str()) {
                changes.extend(self.compute_table_diff(model).await?);
            } else {
                let sql = self
                    .migrator
                    .generate_create_table_sql(model)
                    .with_context(|| format!("Failed to generate table {}", model.table_name))?;
                changes.push(SchemaChange::new(ChangeType::CreateTable, &model.table_name, sql));
            }
        }

        let declared: IndexSet<&str> = models.values().map(|m| m.table_name.as_str()).collect();

        for table in &live_tables {
            if table == MIGRATIONS_TABLE_NAME || declared.contains(table.as_str()) {
                continue;
            }
            changes.push(SchemaChange::new(
                ChangeType::DropTable,
                table,
                self.migrator.generate_drop_table_sql(table),
            ));
        }

        debug!(changes = changes.len(), "Computed schema diff");

        Ok(changes)
    }

    /// Diff one declared model against its existing table
    pub async fn compute_table_diff(&self, model: &DeclaredModel) -> Result<Vec<SchemaChange>> {
        let table_name = &model.table_name;
        let context = || format!("Failed to diff table {}", table_name);

        let live = self
            .migrator
            .get_table_info(table_name)
            .await
            .with_context(context)?;
        let plan = self
            .migrator
            .compare_schema(&live, model)
            .with_context(context)?;

        let mut changes = Vec::new();

        for change in &plan.add_columns {
            let column = change.new_column.as_ref().ok_or_else(|| {
                Error::GenerationError(format!(
                    "Added column {}.{} has no definition",
                    table_name, change.column_name
                ))
            })?;
            let sql = self
                .migrator
                .generate_add_column_sql(table_name, column)
                .with_context(context)?;
            changes.push(
                SchemaChange::new(ChangeType::AddColumn, table_name, sql)
                    .with_column(&change.column_name),
            );
        }

        for change in &plan.modify_columns {
            let sql = self
                .migrator
                .generate_modify_column_sql(change)
                .with_context(context)?
                .join(";\n");
            changes.push(
                SchemaChange::new(ChangeType::AlterColumn, table_name, sql)
                    .with_column(&change.column_name),
            );
        }

        for change in &plan.drop_columns {
            let sql = self
                .migrator
                .generate_drop_column_sql(table_name, &change.column_name)
                .with_context(context)?
                .join(";\n");
            changes.push(
                SchemaChange::new(ChangeType::DropColumn, table_name, sql)
                    .with_column(&change.column_name),
            );
        }

        for change in &plan.add_indexes {
            let index = change.new_index.as_ref().ok_or_else(|| {
                Error::GenerationError(format!(
                    "Added index {} on {} has no definition",
                    change.index_name, table_name
                ))
            })?;
            let sql = self.migrator.generate_create_index_sql(table_name, index);
            changes.push(
                SchemaChange::new(ChangeType::AddIndex, table_name, sql)
                    .with_index(&change.index_name),
            );
        }

        for change in &plan.drop_indexes {
            let sql = self
                .migrator
                .generate_drop_index_sql(table_name, &change.index_name);
            let mut schema_change = SchemaChange::new(ChangeType::DropIndex, table_name, sql)
                .with_index(&change.index_name);
            schema_change.index_def = change.old_index.clone();
            changes.push(schema_change);
        }

        Ok(changes)
    }
}
