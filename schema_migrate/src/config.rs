//! Configuration handling for schema_migrate

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::migration::types::{MigrationMode, MigrationOptions};

/// Load configuration from a TOML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let config_str = fs::read_to_string(path.as_ref())
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    config.validate()?;

    Ok(config)
}

/// Represents the complete schema_migrate configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migrations: MigrationsConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    fn validate(&self) -> Result<()> {
        match self.database.driver.as_str() {
            "postgres" | "mysql" | "sqlite" => {}
            other => {
                return Err(Error::ConfigError(format!(
                    "Unsupported database driver: {}",
                    other
                )))
            }
        }

        if self.database.url.trim().is_empty() {
            return Err(Error::ConfigError("database.url must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Database connection configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub driver: String,
    pub url: String,
    pub pool_size: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

/// Migration settings configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MigrationsConfig {
    #[serde(default)]
    pub mode: MigrationMode,
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force: bool,
}

fn default_directory() -> String {
    "./migrations".to_string()
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            mode: MigrationMode::default(),
            directory: default_directory(),
            dry_run: false,
            force: false,
        }
    }
}

impl MigrationsConfig {
    /// Build the manager options this section describes
    pub fn options(&self) -> MigrationOptions {
        MigrationOptions {
            mode: self.mode,
            dry_run: self.dry_run,
            force: self.force,
            migrations_dir: self.directory.clone().into(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_stdout")]
    pub stdout: bool,
}

fn default_format() -> String {
    "text".to_string()
}

fn default_stdout() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
[database]
driver = "sqlite"
url = "sqlite::memory:"
pool_size = 2

[migrations]
mode = "file"
directory = "db/migrations"
force = true

[logging]
level = "debug"
format = "json"
"#,
        );

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.database.driver, "sqlite");
        assert_eq!(config.database.pool_size, Some(2));

        let options = config.migrations.options();
        assert_eq!(options.mode, MigrationMode::File);
        assert!(options.force);
        assert!(!options.dry_run);
        assert_eq!(options.migrations_dir, PathBuf::from("db/migrations"));

        let logging = config.logging.unwrap();
        assert_eq!(logging.format, "json");
        assert!(logging.stdout);
    }

    #[test]
    fn test_migrations_section_defaults() {
        let file = write_config(
            r#"
[database]
driver = "postgres"
url = "postgres://localhost/app"
"#,
        );

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.migrations.mode, MigrationMode::Auto);
        assert_eq!(config.migrations.directory, "./migrations");
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let file = write_config(
            r#"
[database]
driver = "oracle"
url = "oracle://localhost"
"#,
        );

        let err = load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_from_file("/nonexistent/schema_migrate.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
