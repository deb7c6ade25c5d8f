//! Versioned migrations
//!
//! File storage, generation, file-mode running, and the manager that
//! orchestrates auto and file modes.

pub mod file_store;
pub mod generator;
pub mod manager;
pub mod runner;
pub mod types;

pub use file_store::FileStore;
pub use generator::Generator;
pub use manager::MigrationManager;
pub use runner::Runner;
pub use types::{
    AppliedMigration, MigrateOutcome, MigrationFile, MigrationMetadata, MigrationMode,
    MigrationOptions, MigrationStatus,
};
