// ABOUTME: Copies one database into a new one via dump and restore
// ABOUTME: Drops the new database on any failure and always removes the temp dump

use super::dump::{dump_invocation, run_dump, DumpOutcome, DumpTarget};
use super::restore::{drop_quietly, restore_invocation, run_restore};
use super::BackupManager;
use crate::engine::Engine;
use crate::error::{PanelError, PanelResult};
use crate::registry::list_databases;
use crate::utils::{
    create_managed_temp_dir, quote_identifier, remove_managed_temp_dir, validate_database_name,
};

impl BackupManager {
    /// Clone `source` into a new database `target`
    ///
    /// The target is created first. Once it exists, every failure drops it
    /// again before returning. The intermediate dump lives in a managed temp
    /// directory that is removed whether or not the clone succeeded.
    /// Dropping the returned future midway skips that rollback, so callers
    /// that can be cancelled run it on its own task.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when a name is missing or fails validation
    /// - `NotFound` when `source` is not a user database
    /// - `Conflict` when `target` already exists (system schemas included)
    /// - `OperationFailed` carrying the dump or restore output
    pub async fn clone_database(
        &self,
        engine: &dyn Engine,
        source: &str,
        target: &str,
    ) -> PanelResult<Vec<String>> {
        if source.is_empty() || target.is_empty() {
            return Err(PanelError::invalid(
                "Source and target database names are required",
            ));
        }
        validate_database_name(target)?;
        validate_database_name(source)?;

        let schemas = engine.schema_names().await?;
        let databases = list_databases(engine).await?;
        if !databases.iter().any(|db| db == source) {
            return Err(PanelError::not_found(format!(
                "Source database '{}' not found",
                source
            )));
        }
        if schemas.iter().any(|db| db == target) {
            return Err(PanelError::Conflict(format!(
                "Target database '{}' already exists",
                target
            )));
        }

        tracing::info!("Cloning '{}' into '{}'", source, target);
        engine
            .execute(&format!("CREATE DATABASE {}", quote_identifier(target)))
            .await
            .map_err(|e| {
                PanelError::failed(format!(
                    "An error occurred while creating the database 😢: {:#}",
                    e
                ))
            })?;

        if let Err(err) = self.copy_contents(source, target).await {
            tracing::error!("Clone of '{}' into '{}' failed: {}", source, target, err);
            drop_quietly(engine, target).await;
            return Err(err);
        }

        tracing::info!("✓ Cloned '{}' into '{}'", source, target);
        Ok(list_databases(engine).await?)
    }

    async fn copy_contents(&self, source: &str, target: &str) -> PanelResult<()> {
        let temp_dir = create_managed_temp_dir()?;

        let result = self.dump_and_restore(source, target, &temp_dir).await;

        if let Err(e) = remove_managed_temp_dir(&temp_dir) {
            tracing::warn!(
                "Failed to remove temp directory {}: {:#}",
                temp_dir.display(),
                e
            );
        }

        result
    }

    async fn dump_and_restore(
        &self,
        source: &str,
        target: &str,
        temp_dir: &std::path::Path,
    ) -> PanelResult<()> {
        let dump_path = temp_dir.join(format!(
            "{}_clone_{}.sql",
            source,
            chrono::Local::now().format("%Y%m%d%H%M%S%3f")
        ));

        let invocation = dump_invocation(
            &self.tools,
            &self.client,
            DumpTarget::Database(source),
            &dump_path,
        )?;
        match run_dump(self.runner.as_ref(), &invocation, &dump_path).await {
            Ok(DumpOutcome::Written { size }) => {
                tracing::debug!("Clone dump of '{}' is {} bytes", source, size);
            }
            Ok(DumpOutcome::Failed { output }) => {
                return Err(PanelError::failed(format!("Clone failed: {}", output)));
            }
            Err(e) => return Err(PanelError::failed(format!("Clone failed: {:#}", e))),
        }

        let invocation = restore_invocation(&self.tools, &self.client, target, &dump_path)?;
        match run_restore(self.runner.as_ref(), &invocation).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(output)) => Err(PanelError::failed(format!("Clone failed: {}", output))),
            Err(e) => Err(PanelError::failed(format!("Clone failed: {:#}", e))),
        }
    }
}
