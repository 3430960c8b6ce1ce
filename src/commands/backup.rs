// ABOUTME: Backup maintenance commands for the CLI: backup, list, restore, clone
// ABOUTME: Run the same operations as the HTTP API against the configured server

use anyhow::Result;

use super::{backup_manager, connect_engine};
use crate::backup::{RestoreRequest, RestoreTarget};
use crate::config::PanelConfig;
use crate::mysql::MySqlEngine;

/// Disconnect the engine, then surface the operation's result
async fn finish<T>(engine: MySqlEngine, result: crate::error::PanelResult<T>) -> Result<T> {
    if let Err(e) = engine.disconnect().await {
        tracing::warn!("{:#}", e);
    }
    Ok(result?)
}

/// Dump one database, or every database with `all`
pub async fn backup(config: PanelConfig, database: Option<String>, all: bool) -> Result<()> {
    let manager = backup_manager(&config);

    let created = if all {
        manager.backup_all().await?
    } else {
        let database = database.unwrap_or_default();
        let engine = connect_engine(&config).await?;
        let result = manager.backup_one(&engine, &database).await;
        finish(engine, result).await?
    };

    println!("✓ Backup written: {} ({})", created.path, created.size);
    Ok(())
}

/// Print the backup directory contents, newest first
pub async fn list_backups(config: PanelConfig) -> Result<()> {
    let manager = backup_manager(&config);
    let backups = manager.list()?;

    if backups.is_empty() {
        println!("No backups in {}", manager.dir().display());
        return Ok(());
    }

    println!("{:<60} {:>12}  {}", "FILENAME", "SIZE", "CREATED");
    for backup in &backups {
        println!("{:<60} {:>12}  {}", backup.filename, backup.size, backup.created);
    }
    Ok(())
}

/// Restore a backup into an existing database or, with `new_database`, a new one
pub async fn restore(
    config: PanelConfig,
    filename: String,
    target: Option<String>,
    new_database: Option<String>,
) -> Result<()> {
    let target = match (new_database, target) {
        (Some(name), _) => RestoreTarget::CreateNew(name),
        (None, Some(name)) => RestoreTarget::Existing(name),
        (None, None) => anyhow::bail!("Either --target or --new is required"),
    };

    let manager = backup_manager(&config);
    let engine = connect_engine(&config).await?;
    let result = manager
        .restore(
            &engine,
            &RestoreRequest {
                filename: filename.clone(),
                target,
            },
        )
        .await;
    finish(engine, result).await?;

    println!("✓ Restored {}", filename);
    Ok(())
}

/// Clone `source` into a new database `target`
pub async fn clone(config: PanelConfig, source: String, target: String) -> Result<()> {
    let manager = backup_manager(&config);
    let engine = connect_engine(&config).await?;
    let result = manager.clone_database(&engine, &source, &target).await;
    finish(engine, result).await?;

    println!("✓ Cloned '{}' into '{}'", source, target);
    Ok(())
}
