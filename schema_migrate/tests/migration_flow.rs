//! End-to-end migration flows against an in-memory SQLite database

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use rstest::rstest;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

use schema_migrate::{
    ChangeType, DatabaseConnection, DeclaredModel, Error, Field, FieldType, Index,
    MigrateOutcome, MigrationManager, MigrationMode, MigrationOptions,
};

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}

fn manager(pool: &SqlitePool, options: MigrationOptions) -> MigrationManager {
    MigrationManager::new(&DatabaseConnection::Sqlite(pool.clone()), options)
}

fn file_options(dir: &TempDir) -> MigrationOptions {
    MigrationOptions {
        mode: MigrationMode::File,
        migrations_dir: dir.path().join("migrations"),
        ..MigrationOptions::default()
    }
}

fn user_model() -> DeclaredModel {
    DeclaredModel::new("User", "users")
        .field(Field::new("id", FieldType::Int).primary_key().auto_increment())
        .field(Field::new("email", FieldType::String).unique())
        .field(Field::new("name", FieldType::String).nullable(true))
        .index(Index::new("idx_users_name", &["name"]))
}

fn models(list: Vec<DeclaredModel>) -> IndexMap<String, DeclaredModel> {
    list.into_iter().map(|m| (m.name.clone(), m)).collect()
}

async fn table_names(manager: &MigrationManager) -> Vec<String> {
    manager
        .get_migration_status()
        .await
        .unwrap()
        .tables
        .into_iter()
        .map(|t| t.name)
        .collect()
}

#[tokio::test]
async fn test_generate_run_status_rollback() {
    let pool = memory_pool().await;
    let dir = TempDir::new().unwrap();
    let manager = manager(&pool, file_options(&dir));
    let declared = models(vec![user_model()]);

    let migration = manager
        .generate_migration("create users", &declared)
        .await
        .unwrap();
    assert!(migration.up_sql.contains("CREATE TABLE IF NOT EXISTS users"));
    assert!(migration.down_sql.contains("DROP TABLE IF EXISTS users;"));
    assert!(dir
        .path()
        .join("migrations")
        .join(format!("{}_create_users", migration.version))
        .join("metadata.json")
        .exists());

    let outcome = manager.migrate(&declared).await.unwrap();
    assert_eq!(
        outcome,
        MigrateOutcome::Applied {
            versions: vec![migration.version.clone()]
        }
    );

    let status = manager.get_migration_status().await.unwrap();
    assert_eq!(status.applied_migrations.len(), 1);
    assert_eq!(status.table_count, 1);
    let last = status.last_migration.unwrap();
    assert_eq!(last.version, migration.version);
    assert_eq!(last.name, "create users");
    assert_eq!(last.checksum, migration.metadata.checksum);

    let users = &status.tables[0];
    assert_eq!(users.name, "users");
    assert!(users.find_column("email").unwrap().unique);
    assert_eq!(users.indexes[0].name, "idx_users_name");

    assert_eq!(manager.migrate(&declared).await.unwrap(), MigrateOutcome::UpToDate);

    let err = manager
        .generate_migration("again", &declared)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoChanges));

    let rolled_back = manager.rollback_migration().await.unwrap();
    assert_eq!(rolled_back, migration.version);

    let status = manager.get_migration_status().await.unwrap();
    assert!(status.applied_migrations.is_empty());
    assert_eq!(status.table_count, 0);

    let err = manager.rollback_migration().await.unwrap_err();
    assert!(matches!(err, Error::NothingToRollback));
}

#[tokio::test]
async fn test_rollback_with_nothing_applied() {
    let pool = memory_pool().await;
    let dir = TempDir::new().unwrap();
    let manager = manager(&pool, file_options(&dir));

    sqlx::query("CREATE TABLE keep (id INTEGER)")
        .execute(&pool)
        .await
        .unwrap();

    let err = manager.rollback_migration().await.unwrap_err();
    assert!(matches!(err, Error::NothingToRollback));
    assert_eq!(err.to_string(), "No migrations to rollback");

    assert_eq!(table_names(&manager).await, vec!["keep"]);
}

#[tokio::test]
async fn test_second_migration_applies_on_top_of_first() {
    let pool = memory_pool().await;
    let dir = TempDir::new().unwrap();
    let manager = manager(&pool, file_options(&dir));

    let first = manager
        .generate_migration("users", &models(vec![user_model()]))
        .await
        .unwrap();
    manager.migrate(&IndexMap::new()).await.unwrap();

    let with_age = models(vec![
        user_model().field(Field::new("age", FieldType::Int).nullable(true)),
    ]);
    let second = manager
        .generate_migration("add age", &with_age)
        .await
        .unwrap();
    assert!(second.version > first.version);
    assert_eq!(second.metadata.description, "Add 1 column(s)");
    assert!(second.down_sql.contains("ALTER TABLE users DROP COLUMN age;"));

    assert_eq!(
        manager.migrate(&IndexMap::new()).await.unwrap(),
        MigrateOutcome::Applied {
            versions: vec![second.version.clone()]
        }
    );

    let status = manager.get_migration_status().await.unwrap();
    assert!(status.tables[0].find_column("age").is_some());

    assert_eq!(manager.rollback_migration().await.unwrap(), second.version);
    let status = manager.get_migration_status().await.unwrap();
    assert!(status.tables[0].find_column("age").is_none());
    assert_eq!(status.applied_migrations.len(), 1);
}

#[tokio::test]
async fn test_auto_mode_applies_and_records_history() {
    let pool = memory_pool().await;
    let manager = manager(&pool, MigrationOptions::default());
    let declared = models(vec![user_model()]);

    let outcome = manager.migrate(&declared).await.unwrap();
    let version = match outcome {
        MigrateOutcome::Applied { versions } => versions.into_iter().next().unwrap(),
        other => panic!("unexpected outcome: {:?}", other),
    };

    let status = manager.get_migration_status().await.unwrap();
    assert_eq!(status.applied_migrations.len(), 1);
    assert_eq!(status.applied_migrations[0].version, version);
    assert_eq!(status.applied_migrations[0].name, "auto-migration");
    assert_eq!(table_names(&manager).await, vec!["users"]);

    assert_eq!(manager.migrate(&declared).await.unwrap(), MigrateOutcome::UpToDate);
}

#[tokio::test]
async fn test_auto_mode_failure_rolls_back_batch() {
    let pool = memory_pool().await;
    let manager = manager(&pool, MigrationOptions::default());
    let broken = DeclaredModel::new("Broken", "broken")
        .field(Field::new("x", FieldType::Int).db_type("INTEGER CHECK ("));

    let err = manager
        .migrate(&models(vec![user_model(), broken]))
        .await
        .unwrap_err();

    match err.root_cause() {
        Error::ApplyError { statement, .. } => assert!(statement.contains("broken")),
        other => panic!("unexpected error: {:?}", other),
    }

    let status = manager.get_migration_status().await.unwrap();
    assert!(status.applied_migrations.is_empty());
    assert_eq!(status.table_count, 0);
}

#[tokio::test]
async fn test_destructive_changes_need_force() {
    let pool = memory_pool().await;
    sqlx::query("CREATE TABLE legacy (id INTEGER)")
        .execute(&pool)
        .await
        .unwrap();
    let declared = models(vec![user_model()]);

    let guarded = manager(&pool, MigrationOptions::default());
    let err = guarded.migrate(&declared).await.unwrap_err();
    match &err {
        Error::DestructiveChanges { changes } => {
            assert_eq!(changes, &vec!["DROP_TABLE: legacy".to_string()])
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(table_names(&guarded).await, vec!["legacy"]);

    let forced = manager(
        &pool,
        MigrationOptions {
            force: true,
            ..MigrationOptions::default()
        },
    );
    assert!(matches!(
        forced.migrate(&declared).await.unwrap(),
        MigrateOutcome::Applied { .. }
    ));
    assert_eq!(table_names(&forced).await, vec!["users"]);
}

#[tokio::test]
async fn test_dry_run_leaves_database_untouched() {
    let pool = memory_pool().await;
    let manager = manager(
        &pool,
        MigrationOptions {
            dry_run: true,
            ..MigrationOptions::default()
        },
    );

    let outcome = manager.migrate(&models(vec![user_model()])).await.unwrap();
    match outcome {
        MigrateOutcome::DryRun { changes, .. } => {
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].change_type, ChangeType::CreateTable);
            assert_eq!(changes[0].table_name, "users");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let status = manager.get_migration_status().await.unwrap();
    assert!(status.applied_migrations.is_empty());
    assert_eq!(status.table_count, 0);
}

#[tokio::test]
async fn test_reset_drops_tables_and_clears_history() {
    let pool = memory_pool().await;
    let manager = manager(&pool, MigrationOptions::default());
    manager.migrate(&models(vec![user_model()])).await.unwrap();

    manager.reset_migrations().await.unwrap();

    let status = manager.get_migration_status().await.unwrap();
    assert!(status.applied_migrations.is_empty());
    assert!(status.last_migration.is_none());
    assert_eq!(status.table_count, 0);
}

#[rstest]
#[case(MigrationMode::Auto)]
#[case(MigrationMode::File)]
#[tokio::test]
async fn test_empty_database_is_up_to_date(#[case] mode: MigrationMode) {
    let pool = memory_pool().await;
    let dir = TempDir::new().unwrap();
    let manager = manager(
        &pool,
        MigrationOptions {
            mode,
            ..file_options(&dir)
        },
    );

    assert_eq!(
        manager.migrate(&IndexMap::new()).await.unwrap(),
        MigrateOutcome::UpToDate
    );
}
