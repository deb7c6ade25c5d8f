//! SQLite dialect

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use super::{bool_as_int, quote_literal, SpecificMigrator};
use crate::error::{Error, Result};
use crate::models::{DeclaredModel, DefaultValue, Field, FieldType};
use crate::schema::types::{Column, ColumnChange, IndexInfo, LiveTable};

#[derive(FromRow)]
struct TableRow {
    name: String,
}

#[derive(FromRow)]
struct ColumnRow {
    name: String,
    data_type: String,
    not_null: i64,
    dflt_value: Option<String>,
    pk: i64,
}

#[derive(FromRow)]
struct IndexListRow {
    name: String,
    is_unique: i64,
    origin: String,
}

#[derive(FromRow)]
struct IndexColumnRow {
    name: Option<String>,
}

/// SQLite implementation of [`SpecificMigrator`]
pub struct SqliteMigrator {
    pool: SqlitePool,
}

impl SqliteMigrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_field_type(field: &Field) -> String {
        if let Some(db_type) = &field.db_type {
            return db_type.trim_start_matches("@db.").to_string();
        }

        match field.field_type {
            FieldType::String | FieldType::Json => "TEXT",
            FieldType::Int | FieldType::Int64 | FieldType::Bool => "INTEGER",
            FieldType::Float => "REAL",
            FieldType::DateTime => "DATETIME",
            FieldType::Decimal => "DECIMAL",
            FieldType::Bytes => "BLOB",
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

    fn column_definition(column: &Column, inline_primary_key: bool) -> String {
        let mut parts = vec![column.name.clone(), column.data_type.clone()];

        if column.primary_key && inline_primary_key {
            if column.auto_increment {
                parts.push("PRIMARY KEY AUTOINCREMENT".to_string());
            } else {
                parts.push("PRIMARY KEY".to_string());
            }
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &column.default {
            if !column.auto_increment {
                parts.push(format!("DEFAULT {}", default));
            }
        }

        parts.join(" ")
    }

    async fn table_sql(&self, table_name: &str) -> Result<Option<String>> {
        let sql = sqlx::query_scalar::<_, Option<String>>(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(table_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sql.flatten())
    }

    async fn index_columns(&self, index_name: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, IndexColumnRow>(
            "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
        )
        .bind(index_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|r| r.name).collect())
    }

    async fn read_table(&self, table_name: &str) -> Result<LiveTable> {
        let mut table = LiveTable::new(table_name);

        let autoincrement = self
            .table_sql(table_name)
            .await?
            .map(|sql| sql.to_uppercase().contains("AUTOINCREMENT"))
            .unwrap_or(false);

        let column_rows = sqlx::query_as::<_, ColumnRow>(
            r#"SELECT name, type AS data_type, "notnull" AS not_null, dflt_value, pk
               FROM pragma_table_info(?1) ORDER BY cid"#,
        )
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
            let primary_key = row.pk > 0;
            table.add_column(Column {
                name: row.name,
                data_type: row.data_type,
                nullable: row.not_null == 0 && !primary_key,
                primary_key,
                auto_increment: primary_key && autoincrement,
                unique: false,
                default: row.dflt_value,
            });
        }

        let index_rows = sqlx::query_as::<_, IndexListRow>(
            r#"SELECT name, "unique" AS is_unique, origin FROM pragma_index_list(?1) ORDER BY name"#,
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await?;

        for row in index_rows {
            let columns = self.index_columns(&row.name).await?;

            match row.origin.as_str() {
                // Inline UNIQUE constraint; surfaced on the column itself
                "u" => {
                    if let [column_name] = columns.as_slice() {
                        if let Some(column) =
                            table.columns.iter_mut().find(|c| &c.name == column_name)
                        {
                            column.unique = true;
                        }
                    }
                }
                "pk" => {}
                _ => table.add_index(IndexInfo::new(&row.name, columns, row.is_unique != 0)),
            }
        }

        Ok(table)
    }
}

#[async_trait]
impl SpecificMigrator for SqliteMigrator {
    fn database_type(&self) -> &'static str {
        "sqlite"
    }

    async fn get_tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, TableRow>(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::IntrospectionError(format!("Failed to list tables: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.name).collect())
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
            .map(|f| Self::column_definition(&self.convert_field_to_column_info(f), !composite))
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
        if column.primary_key || column.unique {
            return Err(Error::GenerationError(format!(
                "SQLite cannot add PRIMARY KEY or UNIQUE column {}.{} in place",
                table_name, column.name
            )));
        }

        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table_name,
            Self::column_definition(column, false)
        ))
    }

    fn generate_modify_column_sql(&self, change: &ColumnChange) -> Result<Vec<String>> {
        Err(Error::GenerationError(format!(
            "SQLite does not support altering column definitions directly ({}.{})",
            change.table_name, change.column_name
        )))
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
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            unique,
            index.name,
            table_name,
            index.columns.join(", ")
        )
    }

    fn generate_drop_index_sql(&self, _table_name: &str, index_name: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", index_name)
    }

    async fn apply_migration(&self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    fn convert_field_to_column_info(&self, field: &Field) -> Column {
        let auto_increment = field.primary_key && field.auto_increment;

        Column {
            name: field.column_name().to_string(),
            data_type: Self::map_field_type(field),
            nullable: field.nullable && !field.primary_key,
            primary_key: field.primary_key,
            auto_increment,
            unique: field.unique && !field.primary_key,
            default: if auto_increment {
                None
            } else {
                field.default.as_ref().map(Self::format_default_value)
            },
        }
    }
}
