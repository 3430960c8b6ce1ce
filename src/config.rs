// ABOUTME: Loads panel configuration from an optional TOML file and the environment
// ABOUTME: Covers MySQL credentials, the shared secret hash, backup and tool settings

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Which GRANT dialect to emit for the privilege flusher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GrantSyntax {
    /// `GRANT ... IDENTIFIED BY ...` (MySQL 5.7, MariaDB)
    #[default]
    Legacy,
    /// `CREATE USER IF NOT EXISTS` followed by a plain `GRANT` (MySQL 8+)
    Modern,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mysqldump: String,
    pub mysql: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mysqldump: "mysqldump".to_string(),
            mysql: "mysql".to_string(),
            timeout_secs: 3600,
            output_limit_bytes: 64 * 1024,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Complete panel configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub bind: String,
    /// bcrypt hash of the shared secret
    pub secret_hash: String,
    pub backup_dir: PathBuf,
    pub rollback_failed_restore: bool,
    pub grant_syntax: GrantSyntax,
    pub database: DatabaseConfig,
    pub tools: ToolsConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            secret_hash: String::new(),
            backup_dir: PathBuf::from("storage/app/backups"),
            rollback_failed_restore: false,
            grant_syntax: GrantSyntax::default(),
            database: DatabaseConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Load configuration: file (when given) first, then process environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        config.apply_env(&env)?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse TOML config at {}", path))
    }

    /// Override fields from environment variables
    ///
    /// Recognised variables: `DB_HOST`, `DB_PORT`, `DB_USERNAME`, `DB_PASSWORD`,
    /// `SECRET_STRING`, `BACKUP_DIR`, `PANEL_BIND`, `MYSQLDUMP_PATH`,
    /// `MYSQL_CLIENT_PATH`, `TOOL_TIMEOUT_SECS` and `ROLLBACK_FAILED_RESTORE`.
    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<()> {
        if let Some(host) = env.get("DB_HOST") {
            self.database.host = host.clone();
        }
        if let Some(port) = env.get("DB_PORT") {
            self.database.port = port
                .parse()
                .with_context(|| format!("Invalid DB_PORT: {}", port))?;
        }
        if let Some(username) = env.get("DB_USERNAME") {
            self.database.username = username.clone();
        }
        if let Some(password) = env.get("DB_PASSWORD") {
            self.database.password = password.clone();
        }
        if let Some(secret) = env.get("SECRET_STRING") {
            self.secret_hash = secret.clone();
        }
        if let Some(dir) = env.get("BACKUP_DIR") {
            self.backup_dir = PathBuf::from(dir);
        }
        if let Some(bind) = env.get("PANEL_BIND") {
            self.bind = bind.clone();
        }
        if let Some(tool) = env.get("MYSQLDUMP_PATH") {
            self.tools.mysqldump = tool.clone();
        }
        if let Some(tool) = env.get("MYSQL_CLIENT_PATH") {
            self.tools.mysql = tool.clone();
        }
        if let Some(secs) = env.get("TOOL_TIMEOUT_SECS") {
            self.tools.timeout_secs = secs
                .parse()
                .with_context(|| format!("Invalid TOOL_TIMEOUT_SECS: {}", secs))?;
        }
        if let Some(flag) = env.get("ROLLBACK_FAILED_RESTORE") {
            self.rollback_failed_restore = parse_flag(flag)
                .with_context(|| format!("Invalid ROLLBACK_FAILED_RESTORE: {}", flag))?;
        }
        Ok(())
    }

    /// Check the settings `serve` cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.database.username.is_empty() {
            bail!("Database username is not configured (set DB_USERNAME)");
        }
        if !self.secret_hash.starts_with("$2") {
            bail!(
                "Shared secret hash is missing or not a bcrypt hash (set SECRET_STRING).\n\
                 Generate one with: mysql-panel hash-secret <secret>"
            );
        }
        if self.tools.timeout_secs == 0 {
            bail!("Tool timeout must be greater than zero");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_sample_config() {
        let mut tmp = NamedTempFile::new().unwrap();
        let contents = r#"
            bind = "127.0.0.1:9000"
            secret_hash = "$2y$10$abcdefghijklmnopqrstuu"
            backup_dir = "/var/backups/mysql"
            rollback_failed_restore = true
            grant_syntax = "modern"

            [database]
            host = "db.internal"
            username = "admin"
            password = "s3cret"

            [tools]
            timeout_secs = 120
        "#;
        write!(tmp, "{}", contents).unwrap();

        let config = PanelConfig::from_file(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.backup_dir, PathBuf::from("/var/backups/mysql"));
        assert!(config.rollback_failed_restore);
        assert_eq!(config.grant_syntax, GrantSyntax::Modern);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 3306);
        assert_eq!(config.tools.mysqldump, "mysqldump");
        assert_eq!(config.tools.timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = PanelConfig::default();
        let env: HashMap<String, String> = [
            ("DB_HOST", "10.1.1.5"),
            ("DB_PORT", "3307"),
            ("DB_USERNAME", "root"),
            ("DB_PASSWORD", "pw"),
            ("SECRET_STRING", "$2y$10$hash"),
            ("ROLLBACK_FAILED_RESTORE", "yes"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_env(&env).unwrap();
        assert_eq!(config.database.host, "10.1.1.5");
        assert_eq!(config.database.port, 3307);
        assert_eq!(config.database.username, "root");
        assert_eq!(config.secret_hash, "$2y$10$hash");
        assert!(config.rollback_failed_restore);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut config = PanelConfig::default();
        let env: HashMap<String, String> =
            [("DB_PORT".to_string(), "not-a-port".to_string())].into();
        assert!(config.apply_env(&env).is_err());
    }

    #[test]
    fn validate_requires_username_and_bcrypt_hash() {
        let mut config = PanelConfig::default();
        assert!(config.validate().is_err());

        config.database.username = "admin".to_string();
        config.secret_hash = "plaintext".to_string();
        assert!(config.validate().is_err());

        config.secret_hash = "$2b$12$something".to_string();
        assert!(config.validate().is_ok());
    }
}
