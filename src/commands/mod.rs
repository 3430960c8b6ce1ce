// ABOUTME: Command implementations behind the CLI subcommands
// ABOUTME: Exports serve, hash-secret and the backup/restore/clone maintenance commands

pub mod backup;
pub mod secret;
pub mod serve;

pub use backup::{backup, clone, list_backups, restore};
pub use secret::hash_secret;
pub use serve::serve;

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::backup::BackupManager;
use crate::config::PanelConfig;
use crate::mysql::{opts_from_config, MySqlEngine};
use crate::tools::ProcessRunner;

/// Connect to the configured MySQL server
async fn connect_engine(config: &PanelConfig) -> Result<MySqlEngine> {
    if config.database.username.is_empty() {
        bail!("Database username is not configured (set DB_USERNAME)");
    }
    MySqlEngine::connect(opts_from_config(&config.database)).await
}

/// Backup manager running the real client tools
fn backup_manager(config: &PanelConfig) -> BackupManager {
    let runner = ProcessRunner::new(config.tools.timeout(), config.tools.output_limit_bytes);
    BackupManager::new(
        config.backup_dir.clone(),
        Arc::new(runner),
        config.database.clone(),
        config.tools.clone(),
    )
    .with_restore_rollback(config.rollback_failed_restore)
}
