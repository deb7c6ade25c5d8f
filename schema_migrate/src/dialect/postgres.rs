//! PostgreSQL dialect

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use super::{quote_literal, SpecificMigrator};
use crate::error::{Error, Result};
use crate::models::{DeclaredModel, DefaultValue, Field, FieldType};
use crate::schema::types::{Column, ColumnChange, IndexInfo, LiveTable};

// `'abc'::character varying`, `'{}'::jsonb`, `'-1'::integer`
static TYPE_CAST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"::[a-z_ ]+(\(\d+(,\s*\d+)?\))?(\[\])?$").expect("valid regex"));

static QUOTED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^'(-?\d+(\.\d+)?)'$").expect("valid regex"));

#[derive(FromRow)]
struct TableRow {
    table_name: String,
}

#[derive(FromRow)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    is_nullable: bool,
    column_default: Option<String>,
    is_identity: bool,
    is_primary_key: bool,
    is_unique: bool,
}

#[derive(FromRow)]
struct IndexRow {
    index_name: String,
    is_unique: bool,
    column_name: String,
}

/// PostgreSQL implementation of [`SpecificMigrator`]
pub struct PostgresMigrator {
    pool: PgPool,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Types are spelled the way `format_type()` reports them
    fn map_field_type(field: &Field) -> String {
        if let Some(db_type) = &field.db_type {
            return db_type.trim_start_matches("@db.").to_string();
        }

        match field.field_type {
            FieldType::String => "text",
            FieldType::Int => "integer",
            FieldType::Int64 => "bigint",
            FieldType::Float => "double precision",
            FieldType::Bool => "boolean",
            FieldType::DateTime => "timestamp with time zone",
            FieldType::Json => "jsonb",
            FieldType::Decimal => "numeric(10,2)",
            FieldType::Bytes => "bytea",
        }
        .to_string()
    }

    fn format_default_value(value: &DefaultValue) -> String {
        match value {
            DefaultValue::String(s) => quote_literal(s),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::Bool(b) => b.to_string(),
            DefaultValue::Expression(expr) => match expr.to_lowercase().as_str() {
                "now()" | "current_timestamp" => "CURRENT_TIMESTAMP".to_string(),
                _ => expr.clone(),
            },
        }
    }

    /// Strip the cast PostgreSQL appends to stored defaults
    fn normalize_default(default: &str) -> String {
        let stripped = TYPE_CAST.replace(default.trim(), "").to_string();
        match QUOTED_NUMBER.captures(&stripped) {
            Some(caps) => caps[1].to_string(),
            None => stripped,
        }
    }

    fn column_definition(column: &Column, inline_primary_key: bool) -> String {
        let mut parts = vec![column.name.clone(), column.data_type.clone()];

        if column.auto_increment {
            parts.push("GENERATED BY DEFAULT AS IDENTITY".to_string());
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.primary_key && inline_primary_key {
            parts.push("PRIMARY KEY".to_string());
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

    async fn read_table(&self, table_name: &str) -> Result<LiveTable> {
        let mut table = LiveTable::new(table_name);

        let sql = r#"
            SELECT
                a.attname AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                NOT a.attnotnull AS is_nullable,
                pg_get_expr(d.adbin, d.adrelid) AS column_default,
                a.attidentity IN ('a', 'd') AS is_identity,
                EXISTS (
                    SELECT 1 FROM pg_index i
                    WHERE i.indrelid = a.attrelid AND i.indisprimary
                      AND a.attnum = ANY(i.indkey)
                ) AS is_primary_key,
                EXISTS (
                    SELECT 1 FROM pg_constraint c
                    WHERE c.conrelid = a.attrelid AND c.contype = 'u'
                      AND c.conkey = ARRAY[a.attnum]
                ) AS is_unique
            FROM pg_attribute a
            JOIN pg_class t ON t.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE t.relname = $1
              AND n.nspname = current_schema()
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
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
            let serial = row
                .column_default
                .as_deref()
                .map(|d| d.starts_with("nextval("))
                .unwrap_or(false);
            let auto_increment = row.is_identity || serial;

            table.add_column(Column {
                name: row.column_name,
                data_type: row.data_type,
                nullable: row.is_nullable,
                primary_key: row.is_primary_key,
                auto_increment,
                unique: row.is_unique && !row.is_primary_key,
                default: if auto_increment {
                    None
                } else {
                    row.column_default.as_deref().map(Self::normalize_default)
                },
            });
        }

        // Indexes backing a constraint are reported through the columns above
        let sql = r#"
            SELECT
                i.relname AS index_name,
                ix.indisunique AS is_unique,
                a.attname AS column_name
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) ON true
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            WHERE t.relname = $1
              AND n.nspname = current_schema()
              AND NOT ix.indisprimary
              AND NOT EXISTS (SELECT 1 FROM pg_constraint c WHERE c.conindid = ix.indexrelid)
            ORDER BY i.relname, k.ord
        "#;

        let index_rows = sqlx::query_as::<_, IndexRow>(sql)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;

        let mut indexes: IndexMap<String, IndexInfo> = IndexMap::new();
        for row in index_rows {
            indexes
                .entry(row.index_name.clone())
                .or_insert_with(|| IndexInfo::new(&row.index_name, Vec::new(), row.is_unique))
                .columns
                .push(row.column_name);
        }
        table.indexes = indexes.into_values().collect();

        Ok(table)
    }
}

#[async_trait]
impl SpecificMigrator for PostgresMigrator {
    fn database_type(&self) -> &'static str {
        "postgres"
    }

    async fn get_tables(&self) -> Result<Vec<String>> {
        let sql = r#"
            SELECT tablename AS table_name
            FROM pg_tables
            WHERE schemaname = current_schema()
            ORDER BY tablename
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
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table_name,
            Self::column_definition(column, true)
        ))
    }

    fn generate_modify_column_sql(&self, change: &ColumnChange) -> Result<Vec<String>> {
        let new = change.new_column.as_ref().ok_or_else(|| {
            Error::GenerationError("New column info is required for modify operation".to_string())
        })?;
        let old = change.old_column.as_ref().ok_or_else(|| {
            Error::GenerationError("Old column info is required for modify operation".to_string())
        })?;

        if old.primary_key != new.primary_key {
            return Err(Error::GenerationError(format!(
                "Changing the primary key of {}.{} is not supported",
                change.table_name, change.column_name
            )));
        }

        let table = &change.table_name;
        let column = &change.column_name;
        let mut statements = Vec::new();

        if crate::schema::compare::normalize_type(&old.data_type)
            != crate::schema::compare::normalize_type(&new.data_type)
        {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                table, column, new.data_type, column, new.data_type
            ));
        }

        if old.nullable != new.nullable {
            let action = if new.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
            statements.push(format!("ALTER TABLE {} ALTER COLUMN {} {}", table, column, action));
        }

        if old.auto_increment != new.auto_increment {
            let action = if new.auto_increment {
                "ADD GENERATED BY DEFAULT AS IDENTITY"
            } else {
                "DROP IDENTITY IF EXISTS"
            };
            statements.push(format!("ALTER TABLE {} ALTER COLUMN {} {}", table, column, action));
        }

        if old.default != new.default {
            match &new.default {
                Some(default) => statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    table, column, default
                )),
                None => statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                    table, column
                )),
            }
        }

        if old.unique != new.unique {
            let constraint = format!("{}_{}_key", table, column);
            if new.unique {
                statements.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                    table, constraint, column
                ));
            } else {
                statements.push(format!(
                    "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
                    table, constraint
                ));
            }
        }

        if statements.is_empty() {
            statements.push(format!(
                "-- No changes detected for column {} in table {}",
                column, table
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
        let auto_increment = field.auto_increment
            && matches!(field.field_type, FieldType::Int | FieldType::Int64);

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
