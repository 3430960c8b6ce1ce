// ABOUTME: serve command: checks the environment and runs the HTTP API
// ABOUTME: Removes stale temp directories and warns about missing client tools first

use anyhow::Result;
use std::sync::Arc;

use super::{backup_manager, connect_engine};
use crate::auth::Credential;
use crate::config::PanelConfig;
use crate::server::{self, AppState};
use crate::utils::{check_required_tools, cleanup_stale_temp_dirs};

/// Temp directories older than this are leftovers from killed runs
const STALE_TEMP_DIR_SECS: u64 = 24 * 60 * 60;

/// Start the panel
///
/// # Errors
///
/// Fails when the configuration is incomplete, MySQL is unreachable or the
/// bind address is unavailable. Missing client tools only produce a warning
/// because the non-backup endpoints still work without them.
pub async fn serve(config: PanelConfig) -> Result<()> {
    config.validate()?;

    tracing::info!("Checking for MySQL client tools...");
    match check_required_tools(&[config.tools.mysqldump.as_str(), config.tools.mysql.as_str()]) {
        Ok(()) => tracing::info!("✓ MySQL client tools found"),
        Err(e) => tracing::warn!("⚠ {:#}\nBackup, restore and clone will fail until they are installed.", e),
    }

    match cleanup_stale_temp_dirs(STALE_TEMP_DIR_SECS) {
        Ok(0) => {}
        Ok(n) => tracing::info!("Removed {} stale temp directories", n),
        Err(e) => tracing::warn!("Failed to clean stale temp directories: {:#}", e),
    }

    let engine = connect_engine(&config).await?;
    tracing::info!("✓ Connected to MySQL at {}:{}", config.database.host, config.database.port);
    tracing::info!("Backups are stored in {}", config.backup_dir.display());

    let state = AppState {
        engine: Arc::new(engine),
        backups: Arc::new(backup_manager(&config)),
        credential: Credential::new(config.secret_hash.clone()),
        account: config.database.clone(),
        grant_syntax: config.grant_syntax,
    };

    server::serve(state, &config.bind).await
}
