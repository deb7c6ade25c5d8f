//! On-disk storage of migration files
//!
//! Each migration lives in its own directory, `<version>_<name>`, holding
//! `up.sql`, `down.sql` and `metadata.json`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result, ResultExt};
use crate::migration::types::{MigrationFile, MigrationMetadata};
use crate::utils::naming::{compare_versions, migration_dir_name, split_migration_dir_name};

const UP_FILE: &str = "up.sql";
const DOWN_FILE: &str = "down.sql";
const METADATA_FILE: &str = "metadata.json";

/// Reads and writes migration directories under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if it is missing
    pub fn ensure_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            Error::IoError(e).context(format!(
                "Failed to create migrations directory {}",
                self.root.display()
            ))
        })
    }

    /// Write a new migration; an existing directory for the same version is never overwritten.
    ///
    /// Files are written into a hidden staging directory that is renamed into
    /// place once complete, so a failed write leaves no migration behind.
    pub fn write_migration(&self, migration: &MigrationFile) -> Result<PathBuf> {
        self.ensure_directory()?;

        if self.find_version_dir(&migration.version)?.is_some() {
            return Err(Error::MigrationError(format!(
                "Migration version {} already exists",
                migration.version
            )));
        }

        let dir_name = migration_dir_name(&migration.version, &migration.name);
        let dir = self.root.join(&dir_name);
        let staging = self.root.join(format!(".{}.partial", dir_name));

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir(&staging)?;

        let written = write_files(&staging, migration)
            .and_then(|()| fs::rename(&staging, &dir).map_err(Error::from));

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "Failed to remove partial migration"
                );
            }
            return Err(e.context(format!("Failed to write migration {}", migration.version)));
        }

        debug!(version = %migration.version, path = %dir.display(), "Wrote migration");

        Ok(dir)
    }

    pub fn read_migration(&self, version: &str) -> Result<MigrationFile> {
        let (dir, name_suffix) = self.find_version_dir(version)?.ok_or_else(|| {
            Error::MigrationError(format!("Migration {} not found", version))
        })?;

        read_dir(&dir, version, &name_suffix)
            .with_context(|| format!("Failed to read migration {}", version))
    }

    /// Every readable migration, ascending by version.
    ///
    /// A missing root yields an empty list; an unreadable migration is logged
    /// and skipped.
    pub fn list_migrations(&self) -> Result<Vec<MigrationFile>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut migrations = Vec::new();

        for (dir, version, name_suffix) in self.migration_dirs()? {
            match read_dir(&dir, &version, &name_suffix) {
                Ok(migration) => migrations.push(migration),
                Err(e) => warn!(
                    path = %dir.display(),
                    error = %e,
                    "Skipping unreadable migration"
                ),
            }
        }

        migrations.sort_by(|a, b| compare_versions(&a.version, &b.version));

        Ok(migrations)
    }

    /// Migrations whose version is not in `applied`, ascending by version
    pub fn get_pending_migrations(&self, applied: &HashSet<String>) -> Result<Vec<MigrationFile>> {
        Ok(self
            .list_migrations()?
            .into_iter()
            .filter(|m| !applied.contains(&m.version))
            .collect())
    }

    /// Highest version present on disk, whether or not it is readable
    pub fn latest_version(&self) -> Result<Option<String>> {
        if !self.root.exists() {
            return Ok(None);
        }

        Ok(self
            .migration_dirs()?
            .into_iter()
            .map(|(_, version, _)| version)
            .max_by(|a, b| compare_versions(a, b)))
    }

    fn migration_dirs(&self) -> Result<Vec<(PathBuf, String, String)>> {
        let mut dirs = Vec::new();

        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable migrations entry");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let dir_name = entry.file_name().to_string_lossy();
            if dir_name.starts_with('.') {
                continue;
            }
            if let Some((version, name)) = split_migration_dir_name(&dir_name) {
                dirs.push((entry.path().to_path_buf(), version.to_string(), name.to_string()));
            }
        }

        Ok(dirs)
    }

    fn find_version_dir(&self, version: &str) -> Result<Option<(PathBuf, String)>> {
        if !self.root.exists() {
            return Ok(None);
        }

        Ok(self
            .migration_dirs()?
            .into_iter()
            .find(|(_, v, _)| v == version)
            .map(|(dir, _, name)| (dir, name)))
    }
}

fn write_files(dir: &Path, migration: &MigrationFile) -> Result<()> {
    fs::write(dir.join(UP_FILE), &migration.up_sql)?;
    fs::write(dir.join(DOWN_FILE), &migration.down_sql)?;
    fs::write(
        dir.join(METADATA_FILE),
        serde_json::to_string_pretty(&migration.metadata)?,
    )?;
    Ok(())
}

fn read_dir(dir: &Path, version: &str, name_suffix: &str) -> Result<MigrationFile> {
    let up_sql = fs::read_to_string(dir.join(UP_FILE))?;
    let down_sql = fs::read_to_string(dir.join(DOWN_FILE))?;
    let metadata: MigrationMetadata =
        serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE))?)?;

    let name = if metadata.name.is_empty() {
        name_suffix.to_string()
    } else {
        metadata.name.clone()
    };

    Ok(MigrationFile {
        version: version.to_string(),
        name,
        up_sql,
        down_sql,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample(version: &str, name: &str) -> MigrationFile {
        MigrationFile {
            version: version.to_string(),
            name: name.to_string(),
            up_sql: format!("-- up {}\nCREATE TABLE t{} (id INTEGER);\n", version, version),
            down_sql: format!("-- down {}\nDROP TABLE t{};\n", version, version),
            metadata: MigrationMetadata {
                version: version.to_string(),
                name: name.to_string(),
                checksum: "abc".to_string(),
                created_at: Utc::now(),
                description: "Create 1 table(s)".to_string(),
                changes: Vec::new(),
                schemas: IndexMap::new(),
            },
        }
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("migrations"));
        let migration = sample("1700000000", "create users table");

        let path = store.write_migration(&migration).unwrap();
        assert!(path.ends_with("1700000000_create_users_table"));

        let read = store.read_migration("1700000000").unwrap();
        assert_eq!(read.version, migration.version);
        assert_eq!(read.name, "create users table");
        assert_eq!(read.up_sql, migration.up_sql);
        assert_eq!(read.down_sql, migration.down_sql);

        let raw = fs::read_to_string(path.join(METADATA_FILE)).unwrap();
        assert!(raw.contains("\n  \"version\": \"1700000000\""));
    }

    #[test]
    fn test_list_is_ascending_by_numeric_version() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        for version in ["10", "9", "100"] {
            store.write_migration(&sample(version, "m")).unwrap();
        }

        let versions: Vec<String> = store
            .list_migrations()
            .unwrap()
            .into_iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(versions, vec!["9", "10", "100"]);
        assert_eq!(store.latest_version().unwrap().as_deref(), Some("100"));
    }

    #[test]
    fn test_pending_excludes_applied() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        for version in ["1", "2", "3"] {
            store.write_migration(&sample(version, "m")).unwrap();
        }

        let applied: HashSet<String> = ["2".to_string()].into_iter().collect();
        let pending: Vec<String> = store
            .get_pending_migrations(&applied)
            .unwrap()
            .into_iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(pending, vec!["1", "3"]);
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("absent"));
        assert!(store.list_migrations().unwrap().is_empty());
        assert!(store.latest_version().unwrap().is_none());
    }

    #[test]
    fn test_unreadable_migration_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write_migration(&sample("1", "good")).unwrap();

        let broken = dir.path().join("2_broken");
        fs::create_dir(&broken).unwrap();
        fs::write(broken.join(UP_FILE), "SELECT 1;").unwrap();
        fs::write(broken.join(METADATA_FILE), "{not json").unwrap();
        fs::write(dir.path().join("README.txt"), "not a migration").unwrap();

        let versions: Vec<String> = store
            .list_migrations()
            .unwrap()
            .into_iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(versions, vec!["1"]);
        assert!(store.read_migration("2").is_err());
    }

    #[test]
    fn test_existing_version_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write_migration(&sample("5", "first")).unwrap();

        let err = store.write_migration(&sample("5", "second")).unwrap_err();
        assert!(matches!(err, Error::MigrationError(_)));
        assert_eq!(store.read_migration("5").unwrap().name, "first");
    }

    #[test]
    fn test_leftover_partial_write_is_ignored_and_replaced() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        let partial = dir.path().join(".7_first.partial");
        fs::create_dir(&partial).unwrap();
        fs::write(partial.join(UP_FILE), "CREATE TABLE half;").unwrap();

        assert!(store.list_migrations().unwrap().is_empty());
        assert!(store.latest_version().unwrap().is_none());

        let path = store.write_migration(&sample("7", "first")).unwrap();
        assert!(path.ends_with("7_first"));
        assert!(!partial.exists());
        assert_eq!(store.read_migration("7").unwrap().name, "first");

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["7_first"]);
    }

    #[test]
    fn test_read_unknown_version() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let err = store.read_migration("42").unwrap_err();
        assert!(err.to_string().contains("Migration 42 not found"));
    }
}
