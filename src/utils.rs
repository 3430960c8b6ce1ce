// ABOUTME: Utility functions for validation, SQL quoting and temp file handling
// ABOUTME: Provides identifier validation, tool discovery, and managed temp directories

use crate::error::{PanelError, PanelResult};
use anyhow::{bail, Context, Result};
use which::which;

/// Prefix of every managed temporary directory created by this process
const TEMP_DIR_PREFIX: &str = "mysql-panel-";

/// Validate a database name before it is used as an SQL identifier or tool argument
///
/// Two independent guards run in order:
/// 1. the name must be non-empty and must not contain `-`
/// 2. every character must be an ASCII letter, digit or underscore
///
/// The second rule already excludes `-`; the first one is kept separately so
/// that its message stays what dashboard users have always seen.
///
/// # Errors
///
/// Returns [`PanelError::InvalidInput`] describing the first failed guard.
///
/// # Examples
///
/// ```
/// # use mysql_panel::utils::validate_database_name;
/// assert!(validate_database_name("shop_2024").is_ok());
/// assert!(validate_database_name("my-db").is_err());
/// assert!(validate_database_name("db`; DROP DATABASE x; --").is_err());
/// assert!(validate_database_name("").is_err());
/// ```
pub fn validate_database_name(name: &str) -> PanelResult<()> {
    if name.is_empty() || name.contains('-') {
        return Err(PanelError::invalid(
            "Database name cannot be empty or contain ' - ' 😢",
        ));
    }

    if !is_safe_identifier(name) {
        return Err(PanelError::invalid(
            "No special characters or spaces allowed 😢",
        ));
    }

    Ok(())
}

/// Validate a table name taken from a request path
///
/// Same character rule as database names: letters, digits and underscores only.
pub fn validate_table_name(name: &str) -> PanelResult<()> {
    if name.is_empty() {
        return Err(PanelError::invalid("Table name is required"));
    }

    if !is_safe_identifier(name) {
        return Err(PanelError::invalid(format!(
            "Invalid table name '{}': only letters, digits and underscores are allowed",
            sanitize_identifier(name)
        )));
    }

    Ok(())
}

fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Wrap an already validated identifier in backticks
///
/// Embedded backticks are doubled so the result is safe even for names that
/// bypassed validation.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Render a value as a single-quoted SQL string literal
///
/// Escapes backslashes and single quotes, plus the control characters MySQL
/// treats specially inside literals.
///
/// # Examples
///
/// ```
/// # use mysql_panel::utils::quote_string_literal;
/// assert_eq!(quote_string_literal("admin"), "'admin'");
/// assert_eq!(quote_string_literal("it's"), "'it\\'s'");
/// assert_eq!(quote_string_literal("a\\b"), "'a\\\\b'");
/// ```
pub fn quote_string_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("\\'"),
            '\\' => quoted.push_str("\\\\"),
            '\0' => quoted.push_str("\\0"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\x1a' => quoted.push_str("\\Z"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length to prevent log injection.
/// This is for messages only, never for building SQL.
///
/// # Examples
///
/// ```
/// # use mysql_panel::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Check that the MySQL client tools are reachable
///
/// # Arguments
///
/// * `tools` - Executable names or paths (usually `mysqldump` and `mysql`)
///
/// # Errors
///
/// Returns an error listing every missing tool with installation hints.
pub fn check_required_tools(tools: &[&str]) -> Result<()> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| which(tool).is_err())
        .collect();

    if !missing.is_empty() {
        bail!(
            "Missing required MySQL client tools: {}\n\
             \n\
             Please install the MySQL client tools:\n\
             - Ubuntu/Debian: sudo apt-get install mysql-client (or mariadb-client)\n\
             - macOS: brew install mysql-client\n\
             - RHEL/CentOS: sudo yum install mysql",
            missing.join(", ")
        );
    }

    Ok(())
}

/// Create a managed temporary directory with explicit cleanup support
///
/// Directory naming format: `mysql-panel-{unix timestamp}-{random hex}`.
/// Directories left behind by a killed process are removed on the next start
/// by [`cleanup_stale_temp_dirs`].
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn create_managed_temp_dir() -> Result<std::path::PathBuf> {
    use std::time::SystemTime;

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let random: u32 = rand::random();

    let temp_path =
        std::env::temp_dir().join(format!("{}{}-{:08x}", TEMP_DIR_PREFIX, timestamp, random));

    std::fs::create_dir_all(&temp_path)
        .with_context(|| format!("Failed to create temp directory at {}", temp_path.display()))?;

    tracing::debug!("Created managed temp directory: {}", temp_path.display());

    Ok(temp_path)
}

/// Clean up stale temporary directories from previous runs
///
/// Only directories matching `mysql-panel-*` and older than `max_age_secs`
/// are removed. Individual removal failures are logged and skipped.
///
/// # Returns
///
/// Number of directories removed.
pub fn cleanup_stale_temp_dirs(max_age_secs: u64) -> Result<usize> {
    use std::time::SystemTime;

    let system_temp = std::env::temp_dir();
    let now = SystemTime::now();
    let mut cleaned_count = 0;

    let entries = std::fs::read_dir(&system_temp).with_context(|| {
        format!(
            "Failed to read system temp directory: {}",
            system_temp.display()
        )
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(TEMP_DIR_PREFIX));
        if !is_ours || !path.is_dir() {
            continue;
        }

        let age = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => now.duration_since(modified).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    "Failed to get metadata for temp directory {}: {}",
                    path.display(),
                    e
                );
                continue;
            }
        };

        if age.as_secs() <= max_age_secs {
            continue;
        }

        match std::fs::remove_dir_all(&path) {
            Ok(_) => {
                tracing::info!(
                    "Cleaned up stale temp directory: {} (age: {}s)",
                    path.display(),
                    age.as_secs()
                );
                cleaned_count += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to remove stale temp directory {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    Ok(cleaned_count)
}

/// Remove a managed temporary directory
///
/// Refuses to touch anything whose name does not carry the managed prefix.
pub fn remove_managed_temp_dir(path: &std::path::Path) -> Result<()> {
    let is_ours = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(TEMP_DIR_PREFIX));
    if !is_ours {
        bail!(
            "Refusing to remove directory that doesn't match our naming pattern: {}",
            path.display()
        );
    }

    tracing::debug!("Removing managed temp directory: {}", path.display());

    std::fs::remove_dir_all(path)
        .with_context(|| format!("Failed to remove temp directory at {}", path.display()))?;

    Ok(())
}
