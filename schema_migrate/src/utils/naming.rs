//! Naming utilities for schema_migrate
//!
//! Helpers for turning free-form migration names into directory names and
//! for splitting those names back apart.

use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-./\\]").expect("valid regex"));
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid regex"));

/// Make a migration name safe for use in a directory name.
///
/// Whitespace, `-`, `.`, `/` and `\` become `_`; any other character outside
/// `[A-Za-z0-9_]` is dropped.
pub fn sanitize_migration_name(name: &str) -> String {
    let replaced = SEPARATORS.replace_all(name, "_");
    DISALLOWED.replace_all(&replaced, "").into_owned()
}

/// Directory name for a migration: `<version>_<sanitized name>`
pub fn migration_dir_name(version: &str, name: &str) -> String {
    format!("{}_{}", version, sanitize_migration_name(name))
}

/// Split a migration directory name into version and name suffix
pub fn split_migration_dir_name(dir_name: &str) -> Option<(&str, &str)> {
    let (version, name) = dir_name.split_once('_')?;
    if version.is_empty() {
        return None;
    }
    Some((version, name))
}

/// Compare two versions, numerically when both are decimal
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cmp::Ordering;

    #[rstest]
    #[case("add users table", "add_users_table")]
    #[case("add-user.email", "add_user_email")]
    #[case("path/to\\thing", "path_to_thing")]
    #[case("drop 'legacy' (v2)!", "drop_legacy_v2")]
    #[case("tab\tseparated", "tab_separated")]
    fn test_sanitize_migration_name(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_migration_name(input), expected);
    }

    #[test]
    fn test_dir_name_round_trip() {
        let dir = migration_dir_name("1700000000", "create users");
        assert_eq!(dir, "1700000000_create_users");
        assert_eq!(
            split_migration_dir_name(&dir),
            Some(("1700000000", "create_users"))
        );
        assert_eq!(split_migration_dir_name("no-separator"), None);
    }

    #[rstest]
    #[case("9", "10", Ordering::Less)]
    #[case("1700000001", "1700000000", Ordering::Greater)]
    #[case("abc", "abd", Ordering::Less)]
    #[case("42", "42", Ordering::Equal)]
    fn test_compare_versions(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected);
    }
}
