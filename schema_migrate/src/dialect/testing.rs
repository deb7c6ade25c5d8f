//! In-memory dialect used by unit tests

use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::SpecificMigrator;
use crate::error::{Error, Result};
use crate::models::{DeclaredModel, Field, FieldType};
use crate::schema::types::{Column, ColumnChange, IndexInfo, LiveTable};

/// Serves a fixed set of live tables and records executed statements
#[derive(Default)]
pub struct ScriptedMigrator {
    pub tables: IndexMap<String, LiveTable>,
    /// Introspecting this table fails
    pub broken_table: Option<String>,
    /// Executing this statement fails
    pub failing_statement: Option<String>,
    pub executed: Mutex<Vec<String>>,
}

impl ScriptedMigrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: LiveTable) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn with_broken_table(mut self, name: &str) -> Self {
        self.broken_table = Some(name.to_string());
        self
    }

    pub fn with_failing_statement(mut self, sql: &str) -> Self {
        self.failing_statement = Some(sql.to_string());
        self
    }

    /// Statements that executed successfully, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpecificMigrator for ScriptedMigrator {
    fn database_type(&self) -> &'static str {
        "scripted"
    }

    async fn get_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn get_table_info(&self, table_name: &str) -> Result<LiveTable> {
        if self.broken_table.as_deref() == Some(table_name) {
            return Err(Error::IntrospectionError(format!(
                "cannot describe {}",
                table_name
            )));
        }
        self.tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| Error::IntrospectionError(format!("no table {}", table_name)))
    }

    fn generate_create_table_sql(&self, model: &DeclaredModel) -> Result<String> {
        Ok(format!("CREATE TABLE {}", model.table_name))
    }

    fn generate_drop_table_sql(&self, table_name: &str) -> String {
        format!("DROP TABLE {}", table_name)
    }

    fn generate_add_column_sql(&self, table_name: &str, column: &Column) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table_name, column.name, column.data_type
        ))
    }

    fn generate_modify_column_sql(&self, change: &ColumnChange) -> Result<Vec<String>> {
        Ok(vec![
            format!("ALTER TABLE {} ALTER {} STEP 1", change.table_name, change.column_name),
            format!("ALTER TABLE {} ALTER {} STEP 2", change.table_name, change.column_name),
        ])
    }

    fn generate_drop_column_sql(&self, table_name: &str, column_name: &str) -> Result<Vec<String>> {
        Ok(vec![format!("ALTER TABLE {} DROP COLUMN {}", table_name, column_name)])
    }

    fn generate_create_index_sql(&self, table_name: &str, index: &IndexInfo) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            unique,
            index.name,
            table_name,
            index.columns.join(", ")
        )
    }

    fn generate_drop_index_sql(&self, _table_name: &str, index_name: &str) -> String {
        format!("DROP INDEX {}", index_name)
    }

    async fn apply_migration(&self, sql: &str) -> Result<()> {
        if self.failing_statement.as_deref() == Some(sql) {
            return Err(Error::DatabaseError(format!("syntax error near {}", sql)));
        }
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    fn convert_field_to_column_info(&self, field: &Field) -> Column {
        let data_type = match field.field_type {
            FieldType::Int | FieldType::Int64 | FieldType::Bool => "INTEGER",
            _ => "TEXT",
        };
        Column {
            name: field.column_name().to_string(),
            data_type: data_type.to_string(),
            nullable: field.nullable,
            primary_key: field.primary_key,
            auto_increment: field.auto_increment,
            unique: field.unique,
            default: field.default.as_ref().map(|d| d.to_string()),
        }
    }
}
