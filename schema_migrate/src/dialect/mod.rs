//! Dialect-specific introspection and DDL generation
//!
//! Each supported engine implements [`SpecificMigrator`]. The migration core
//! only ever sees `Arc<dyn SpecificMigrator>`; the concrete implementation is
//! chosen once by [`crate::db::DatabaseConnection::migrator`].

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DeclaredModel, Field};
use crate::schema::compare;
use crate::schema::types::{Column, ColumnChange, IndexInfo, LiveTable, MigrationPlan};

pub mod mysql;
pub mod postgres;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use mysql::MySqlMigrator;
pub use postgres::PostgresMigrator;
pub use sqlite::SqliteMigrator;

/// Live-schema introspection plus DDL synthesis for one database engine
#[async_trait]
pub trait SpecificMigrator: Send + Sync {
    /// Short engine name, e.g. `"sqlite"`
    fn database_type(&self) -> &'static str;

    /// Names of every user table, in the engine's listing order
    async fn get_tables(&self) -> Result<Vec<String>>;

    async fn get_table_info(&self, table_name: &str) -> Result<LiveTable>;

    fn generate_create_table_sql(&self, model: &DeclaredModel) -> Result<String>;

    fn generate_drop_table_sql(&self, table_name: &str) -> String;

    fn generate_add_column_sql(&self, table_name: &str, column: &Column) -> Result<String>;

    fn generate_modify_column_sql(&self, change: &ColumnChange) -> Result<Vec<String>>;

    fn generate_drop_column_sql(&self, table_name: &str, column_name: &str)
        -> Result<Vec<String>>;

    fn generate_create_index_sql(&self, table_name: &str, index: &IndexInfo) -> String;

    fn generate_drop_index_sql(&self, table_name: &str, index_name: &str) -> String;

    /// Execute a single statement
    async fn apply_migration(&self, sql: &str) -> Result<()>;

    /// Project a declared field into the column this engine would create for it
    fn convert_field_to_column_info(&self, field: &Field) -> Column;

    /// Compare a live table against its declared model
    fn compare_schema(&self, live: &LiveTable, model: &DeclaredModel) -> Result<MigrationPlan> {
        compare::compare_schema(self, live, model)
    }
}

/// Render a boolean default the way integer-backed engines store it
pub(crate) fn bool_as_int(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Escape single quotes for embedding in a string literal
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// True for defaults written as a call or keyword rather than a literal
pub(crate) fn looks_like_function(value: &str) -> bool {
    value.contains('(') && value.contains(')')
}
