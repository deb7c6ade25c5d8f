//! Utilities for schema_migrate
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

pub use logging::init_logging;
pub use naming::{compare_versions, migration_dir_name, sanitize_migration_name};
