//! schema_migrate: versioned, reversible schema migrations for relational databases
//!
//! schema_migrate compares declared models against a live database and either
//! applies the difference directly (auto mode) or writes it out as a
//! versioned migration with forward and reverse scripts (file mode).

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod migration;
pub mod models;
pub mod schema;
pub mod utils;

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::DatabaseConnection;
pub use db::history::HistoryStore;
pub use dialect::SpecificMigrator;
pub use error::{Error, Result, ResultExt};
pub use migration::{
    MigrateOutcome, MigrationFile, MigrationManager, MigrationMode, MigrationOptions,
    MigrationStatus,
};
pub use models::{DeclaredModel, DefaultValue, Field, FieldType, Index};
pub use schema::{ChangeType, SchemaChange};

/// Name of the table that records applied migrations
pub const MIGRATIONS_TABLE_NAME: &str = "schema_migrate_history";

/// Load configuration, set up logging, connect, and return a ready manager
pub async fn init(config_path: &str) -> Result<MigrationManager> {
    let config = config::load_from_file(config_path)?;
    utils::init_logging(&config.logging)?;

    let connection = DatabaseConnection::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        driver = connection.driver(),
        mode = ?config.migrations.mode,
        "schema_migrate initialized"
    );

    Ok(MigrationManager::new(
        &connection,
        config.migrations.options(),
    ))
}
