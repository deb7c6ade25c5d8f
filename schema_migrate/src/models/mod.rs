//! Declared data models
//!
//! A [`DeclaredModel`] is the desired shape of one table. Models are built in
//! Rust with the builder methods below, or deserialized from serde data.

use serde::{Deserialize, Serialize};

/// Logical field types understood by every dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int,
    Int64,
    Float,
    Bool,
    DateTime,
    Json,
    Decimal,
    Bytes,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Int => "Int",
            FieldType::Int64 => "Int64",
            FieldType::Float => "Float",
            FieldType::Bool => "Bool",
            FieldType::DateTime => "DateTime",
            FieldType::Json => "Json",
            FieldType::Decimal => "Decimal",
            FieldType::Bytes => "Bytes",
        }
    }
}

/// Default value attached to a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// A string literal, quoted when rendered
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Raw SQL such as `CURRENT_TIMESTAMP`, rendered verbatim
    Expression(String),
}

impl std::fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultValue::String(s) | DefaultValue::Expression(s) => write!(f, "{}", s),
            DefaultValue::Int(i) => write!(f, "{}", i),
            DefaultValue::Float(v) => write!(f, "{}", v),
            DefaultValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A single field of a declared model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// Explicit column mapping; the field name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub field_type: FieldType,
    /// Dialect type override, e.g. `VARCHAR(255)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

impl Field {
    /// Create a new non-nullable field
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            column: None,
            field_type,
            db_type: None,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default: None,
        }
    }

    /// The column this field is stored in
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }

    pub fn map_to(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }

    pub fn db_type(mut self, db_type: &str) -> Self {
        self.db_type = Some(db_type.to_string());
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// An index over one or more fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    /// Field names, resolved to column names when compared or rendered
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    pub fn new(name: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// The desired shape of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredModel {
    pub name: String,
    pub table_name: String,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl DeclaredModel {
    pub fn new(name: &str, table_name: &str) -> Self {
        Self {
            name: name.to_string(),
            table_name: table_name.to_string(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Map field names to column names, keeping unknown names as given
    pub fn resolve_columns(&self, field_names: &[String]) -> Vec<String> {
        field_names
            .iter()
            .map(|name| match self.find_field(name) {
                Some(field) => field.column_name().to_string(),
                None => name.clone(),
            })
            .collect()
    }

    /// Column names of every primary key field, in declaration order
    pub fn primary_key_columns(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.column_name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_name_mapping() {
        let model = DeclaredModel::new("User", "users")
            .field(Field::new("id", FieldType::Int).primary_key())
            .field(Field::new("createdAt", FieldType::DateTime).map_to("created_at"));

        assert_eq!(model.fields[0].column_name(), "id");
        assert_eq!(model.fields[1].column_name(), "created_at");
        assert_eq!(
            model.resolve_columns(&["createdAt".to_string(), "missing".to_string()]),
            vec!["created_at".to_string(), "missing".to_string()]
        );
        assert_eq!(model.primary_key_columns(), vec!["id".to_string()]);
    }

    #[test]
    fn test_model_deserializes_with_defaults() {
        let json = r#"{
            "name": "Post",
            "table_name": "posts",
            "fields": [
                {"name": "id", "field_type": "int", "primary_key": true},
                {"name": "title", "field_type": "string",
                 "default": {"kind": "string", "value": "untitled"}}
            ]
        }"#;

        let model: DeclaredModel = serde_json::from_str(json).unwrap();
        assert!(model.indexes.is_empty());
        assert!(!model.fields[1].nullable);
        assert_eq!(
            model.fields[1].default,
            Some(DefaultValue::String("untitled".to_string()))
        );
    }
}
