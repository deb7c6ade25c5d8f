//! MySQL dialect

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{FromRow, MySqlPool};
use tracing::debug;

use super::{bool_as_int, looks_like_function, quote_literal, SpecificMigrator};
use crate::error::{Error, Result};
use crate::models::{DeclaredModel, DefaultValue, Field, FieldType};
use crate::schema::types::{Column, ColumnChange, IndexInfo, LiveTable};

// Older servers report integer display widths, e.g. `int(11)`
static DISPLAY_WIDTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(smallint|mediumint|int|bigint)\(\d+\)").expect("valid regex")
});

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));

#[derive(FromRow)]
struct TableRow {
    table_name: String,
}

#[derive(FromRow)]
struct ColumnRow {
    column_name: String,
    column_type: String,
    is_nullable: String,
    column_default: Option<String>,
    column_key: String,
    extra: String,
}

#[derive(FromRow)]
struct IndexRow {
    index_name: String,
    non_unique: i64,
    column_name: Option<String>,
}

/// MySQL implementation of [`SpecificMigrator`]
pub struct MySqlMigrator {
    pool: MySqlPool,
}

impl MySqlMigrator {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn map_field_type(field: &Field) -> String {
        if let Some(db_type) = &field.db_type {
            return db_type.trim_start_matches("@db.").to_string();
        }

        match field.field_type {
            FieldType::String => "varchar(255)",
            FieldType::Int => "int",
            FieldType::Int64 => "bigint",
            FieldType::Float => "double",
            FieldType::Bool => "tinyint(1)",
            FieldType::DateTime => "datetime",
            FieldType::Json => "json",
            FieldType::Decimal => "decimal(10,2)",
            FieldType::Bytes => "blob",
        }
        .to_string()
    }

    fn format_default_value(value: &DefaultValue) -> String {
        match value {
            DefaultValue::String(s) => quote_literal(s),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::Bool(b) => bool_as_int(*b).to_string(),
            DefaultValue::Expression(expr) => match expr.to_lowercase().as_str() {
                "now()" | "current_timestamp" => "CURRENT_TIMESTAMP".to_string(),
                _ => expr.clone(),
            },
        }
    }

    fn normalize_type(column_type: &str) -> String {
        DISPLAY_WIDTH.replace(column_type, "$1").to_string()
    }

    /// information_schema reports literal defaults unquoted
    fn normalize_default(default: &str, extra: &str) -> String {
        let upper = default.to_uppercase();
        if extra.to_uppercase().contains("DEFAULT_GENERATED")
            || upper == "CURRENT_TIMESTAMP"
            || NUMERIC.is_match(default)
            || looks_like_function(default)
        {
            default.to_string()
        } else {
            quote_literal(default)
        }
    }

    fn column_definition(column: &Column, inline_primary_key: bool, inline_unique: bool) -> String {
        let mut parts = vec![column.name.clone(), column.data_type.clone()];

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.auto_increment {
            parts.push("AUTO_INCREMENT".to_string());
        }

        if column.primary_key && inline_primary_key {
            parts.push("PRIMARY KEY".to_string());
        }

        if column.unique && !column.primary_key && inline_unique {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &column.default {
            if !column.auto_increment {
                parts.push(format!("DEFAULT {}", default));
            }
        }

        parts.join(" ")
    }

    async fn read_table(&self, table_name: &str) -> Result<LiveTable> {
        let mut table = LiveTable::new(table_name);

        let sql = r#"
            SELECT
                CAST(column_name AS CHAR) AS column_name,
                CAST(column_type AS CHAR) AS column_type,
                CAST(is_nullable AS CHAR) AS is_nullable,
                CAST(column_default AS CHAR) AS column_default,
                CAST(column_key AS CHAR) AS column_key,
                CAST(extra AS CHAR) AS extra
            FROM information_schema.columns
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY ordinal_position
        "#;

        let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;

        if column_rows.is_empty() {
            return Err(Error::IntrospectionError(format!(
                "Table {} does not exist",
                table_name
            )));
        }

        for row in column_rows {
            let auto_increment = row.extra.to_lowercase().contains("auto_increment");
            table.add_column(Column {
                name: row.column_name,
                data_type: Self::normalize_type(&row.column_type),
                nullable: row.is_nullable == "YES",
                primary_key: row.column_key == "PRI",
                auto_increment,
                unique: false,
                default: row
                    .column_default
                    .as_deref()
                    .map(|d| Self::normalize_default(d, &row.extra)),
            });
        }

        let sql = r#"
            SELECT
                CAST(index_name AS CHAR) AS index_name,
                CAST(non_unique AS SIGNED) AS non_unique,
                CAST(column_name AS CHAR) AS column_name
            FROM information_schema.statistics
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY index_name, seq_in_index
        "#;

        let index_rows = sqlx::query_as::<_, IndexRow>(sql)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;

        let mut indexes: IndexMap<String, IndexInfo> = IndexMap::new();
        for row in index_rows {
            if row.index_name == "PRIMARY" {
                continue;
            }
            let Some(column_name) = row.column_name else {
                continue;
            };
            indexes
                .entry(row.index_name.clone())
                .or_insert_with(|| IndexInfo::new(&row.index_name, Vec::new(), row.non_unique == 0))
                .columns
                .push(column_name);
        }

        // An inline UNIQUE creates an index named after its column
        for index in indexes.into_values() {
            let inline_unique =
                index.unique && index.columns.len() == 1 && index.columns[0] == index.name;
            if inline_unique {
                if let Some(column) = table.columns.iter_mut().find(|c| c.name == index.name) {
                    column.unique = true;
                    continue;
                }
            }
            table.add_index(index);
        }

        Ok(table)
    }
}

#[async_trait]
impl SpecificMigrator for MySqlMigrator {
    fn database_type(&self) -> &'static str {
        "mysql"
    }

    async fn get_tables(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT CAST(table_name AS CHAR) AS table_name
            FROM information_schema.tables
            WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let rows = sqlx::query_as::<_, TableRow>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::IntrospectionError(format!("Failed to list tables: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.table_name).collect())
    }

    async fn get_table_info(&self, table_name: &str) -> Result<LiveTable> {
        self.read_table(table_name).await.map_err(|e| match e {
            Error::IntrospectionError(_) => e,
            other => Error::IntrospectionError(format!(
                "Failed to read table {}: {}",
                table_name, other
            )),
        })
    }

    fn generate_create_table_sql(&self, model: &DeclaredModel) -> Result<String> {
        if model.fields.is_empty() {
            return Err(Error::GenerationError(format!(
                "Model {} declares no fields",
                model.name
            )));
        }

        let primary_keys = model.primary_key_columns();
        let composite = primary_keys.len() > 1;

        let mut definitions: Vec<String> = model
            .fields
            .iter()
            .map(|f| {
                Self::column_definition(&self.convert_field_to_column_info(f), !composite, true)
            })
            .collect();

        if composite {
            definitions.push(format!("PRIMARY KEY ({})", primary_keys.join(", ")));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            model.table_name,
            definitions.join(",\n  ")
        )];

        for index in &model.indexes {
            let info = IndexInfo::new(
                &index.name,
                model.resolve_columns(&index.fields),
                index.unique,
            );
            statements.push(self.generate_create_index_sql(&model.table_name, &info));
        }

        Ok(statements.join(";\n"))
    }

    fn generate_drop_table_sql(&self, table_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", table_name)
    }

    fn generate_add_column_sql(&self, table_name: &str, column: &Column) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table_name,
            Self::column_definition(column, true, true)
        ))
    }

    fn generate_modify_column_sql(&self, change: &ColumnChange) -> Result<Vec<String>> {
        let new = change.new_column.as_ref().ok_or_else(|| {
            Error::GenerationError("New column info is required for modify operation".to_string())
        })?;
        let was_unique = change.old_column.as_ref().map(|c| c.unique).unwrap_or(false);

        let mut statements = vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            change.table_name,
            Self::column_definition(new, false, !was_unique)
        )];

        if was_unique && !new.unique {
            statements.push(format!(
                "DROP INDEX {} ON {}",
                change.column_name, change.table_name
            ));
        }

        Ok(statements)
    }

    fn generate_drop_column_sql(&self, table_name: &str, column_name: &str) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            table_name, column_name
        )])
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

    fn generate_drop_index_sql(&self, table_name: &str, index_name: &str) -> String {
        format!("DROP INDEX {} ON {}", index_name, table_name)
    }

    async fn apply_migration(&self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    fn convert_field_to_column_info(&self, field: &Field) -> Column {
        Column {
            name: field.column_name().to_string(),
            data_type: Self::map_field_type(field),
            nullable: field.nullable && !field.primary_key,
            primary_key: field.primary_key,
            auto_increment: field.auto_increment,
            unique: field.unique && !field.primary_key,
            default: if field.auto_increment {
                None
            } else {
                field.default.as_ref().map(Self::format_default_value)
            },
        }
    }
}
