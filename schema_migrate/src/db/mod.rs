//! Database module for schema_migrate
//!
//! This module handles database connections and the migration history ledger.

pub mod connection;
pub mod history;

// Re-export key types
pub use connection::DatabaseConnection;
pub use history::HistoryStore;
