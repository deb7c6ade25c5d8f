//! Migration artifacts, options and outcomes

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::diff::SchemaChange;
use crate::schema::types::LiveTable;

/// A versioned, reversible migration as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationFile {
    pub version: String,
    pub name: String,
    pub up_sql: String,
    pub down_sql: String,
    pub metadata: MigrationMetadata,
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationMetadata {
    pub version: String,
    pub name: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub changes: Vec<SchemaChange>,
    /// Model name to content hash
    #[serde(default)]
    pub schemas: IndexMap<String, String>,
}

/// A row of the migration history table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AppliedMigration {
    pub id: i64,
    pub version: String,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    /// Diff and apply directly, in one transaction
    #[default]
    Auto,
    /// Generate, apply and roll back versioned migration files
    File,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOptions {
    pub mode: MigrationMode,
    /// Log the plan without touching the database
    pub dry_run: bool,
    /// Allow drops and alters in auto mode
    pub force: bool,
    pub migrations_dir: PathBuf,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            mode: MigrationMode::Auto,
            dry_run: false,
            force: false,
            migrations_dir: PathBuf::from("./migrations"),
        }
    }
}

/// What a call to `migrate` did
#[derive(Debug, Clone, PartialEq)]
pub enum MigrateOutcome {
    /// Nothing to do
    UpToDate,
    /// Dry run; the plan that would have been applied
    DryRun {
        version: String,
        changes: Vec<SchemaChange>,
    },
    Applied { versions: Vec<String> },
}

/// Snapshot returned by `get_migration_status`
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatus {
    pub applied_migrations: Vec<AppliedMigration>,
    pub last_migration: Option<AppliedMigration>,
    pub table_count: usize,
    pub tables: Vec<LiveTable>,
}
