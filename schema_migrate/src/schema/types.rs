//! Type definitions for introspected schema objects and migration plans

use serde::{Deserialize, Serialize};

/// A table as it exists in the connected database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<IndexInfo>,
}

impl LiveTable {
    /// Create a new table with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a column to the table
    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Add an index to the table
    pub fn add_index(&mut self, index: IndexInfo) {
        self.indexes.push(index);
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Represents a database column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    /// Default as SQL text
    pub default: Option<String>,
}

impl Column {
    /// Create a new column with the given name and type
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default: None,
        }
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set a default value for the column
    pub fn default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

/// Represents an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexInfo {
    pub fn new(name: &str, columns: Vec<String>, unique: bool) -> Self {
        Self {
            name: name.to_string(),
            columns,
            unique,
        }
    }
}

/// One column-level entry of a [`MigrationPlan`]
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    pub table_name: String,
    pub column_name: String,
    pub old_column: Option<Column>,
    pub new_column: Option<Column>,
}

/// One index-level entry of a [`MigrationPlan`]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexChange {
    pub table_name: String,
    pub index_name: String,
    pub old_index: Option<IndexInfo>,
    pub new_index: Option<IndexInfo>,
}

/// Everything that must change for one existing table to match its model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    pub add_columns: Vec<ColumnChange>,
    pub modify_columns: Vec<ColumnChange>,
    pub drop_columns: Vec<ColumnChange>,
    pub add_indexes: Vec<IndexChange>,
    pub drop_indexes: Vec<IndexChange>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.add_columns.is_empty()
            && self.modify_columns.is_empty()
            && self.drop_columns.is_empty()
            && self.add_indexes.is_empty()
            && self.drop_indexes.is_empty()
    }
}
