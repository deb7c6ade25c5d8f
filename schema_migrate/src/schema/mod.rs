//! Schema comparison and diffing
//!
//! Live-schema types, per-table comparison, and the ordered diff that drives
//! both auto and file migrations.

pub mod compare;
pub mod diff;
pub mod types;

pub use diff::{compute_checksum, ChangeType, Differ, SchemaChange};
pub use types::{Column, ColumnChange, IndexChange, IndexInfo, LiveTable, MigrationPlan};
