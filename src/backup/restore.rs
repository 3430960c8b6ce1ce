// ABOUTME: Replays a backup file into an existing or newly created database
// ABOUTME: The mysql client is silent on success, so any output means failure

use anyhow::Result;
use std::path::Path;

use super::BackupManager;
use crate::config::{DatabaseConfig, ToolsConfig};
use crate::engine::Engine;
use crate::error::{PanelError, PanelResult};
use crate::registry::{database_exists, is_protected, list_databases};
use crate::tools::{ToolInvocation, ToolRunner};
use crate::utils::{quote_identifier, validate_database_name};

/// Where a restore goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreTarget {
    /// A database already in the registry
    Existing(String),
    /// A database to create (if missing) before restoring
    CreateNew(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub filename: String,
    pub target: RestoreTarget,
}

/// Build the mysql client command that reads `input` into `database`
pub fn restore_invocation(
    tools: &ToolsConfig,
    client: &DatabaseConfig,
    database: &str,
    input: &Path,
) -> Result<ToolInvocation> {
    Ok(ToolInvocation::with_credentials(&tools.mysql, client)?
        .arg(database)
        .stdin_file(input))
}

/// Run a restore; `Ok(Err(output))` carries the client's complaint
pub async fn run_restore(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
) -> Result<std::result::Result<(), String>> {
    let result = runner.run(invocation).await?;

    if result.is_blank() {
        if result.exit_code != Some(0) {
            tracing::warn!(
                "{} printed nothing but exited with {:?}",
                invocation.program,
                result.exit_code
            );
        }
        return Ok(Ok(()));
    }

    Ok(Err(result.output))
}

impl BackupManager {
    /// Restore a backup file and return the refreshed registry
    ///
    /// The backup file is resolved before anything is created. A database
    /// created for this restore is only dropped again on failure when restore
    /// rollback is enabled.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a missing filename or an invalid database name
    /// - `Protected` when the target is a system schema
    /// - `NotFound` for an unknown target database or backup file
    /// - `OperationFailed("Restore failed: ...")` carrying the client output
    pub async fn restore(
        &self,
        engine: &dyn Engine,
        request: &RestoreRequest,
    ) -> PanelResult<Vec<String>> {
        if request.filename.trim().is_empty() {
            return Err(PanelError::invalid("Filename is required"));
        }

        let target = match &request.target {
            RestoreTarget::Existing(name) | RestoreTarget::CreateNew(name) => name.as_str(),
        };
        validate_database_name(target)?;
        if is_protected(target) {
            return Err(PanelError::Protected(
                "You can't restore into this database, try another 😢".to_string(),
            ));
        }

        let created_here = match &request.target {
            RestoreTarget::Existing(name) => {
                if !database_exists(engine, name).await? {
                    return Err(PanelError::not_found(format!(
                        "Target database '{}' not found",
                        name
                    )));
                }
                false
            }
            RestoreTarget::CreateNew(name) => !database_exists(engine, name).await?,
        };

        let path = self.resolve(&request.filename)?;

        if let RestoreTarget::CreateNew(name) = &request.target {
            tracing::info!("Creating database '{}' for restore", name);
            engine
                .execute(&format!(
                    "CREATE DATABASE IF NOT EXISTS {}",
                    quote_identifier(name)
                ))
                .await
                .map_err(|e| {
                    PanelError::failed(format!(
                        "An error occurred while creating the database 😢: {:#}",
                        e
                    ))
                })?;
        }

        tracing::info!("Restoring {} into '{}'", request.filename, target);
        let outcome = match restore_invocation(&self.tools, &self.client, target, &path) {
            Ok(invocation) => run_restore(self.runner.as_ref(), &invocation)
                .await
                .unwrap_or_else(|e| Err(format!("{:#}", e))),
            Err(e) => Err(format!("{:#}", e)),
        };

        if let Err(output) = outcome {
            tracing::error!("Restore of {} failed: {}", request.filename, output.trim());
            if created_here && self.rollback_failed_restore {
                drop_quietly(engine, target).await;
            }
            return Err(PanelError::failed(format!("Restore failed: {}", output)));
        }

        tracing::info!("✓ Restored {} into '{}'", request.filename, target);
        Ok(list_databases(engine).await?)
    }
}

/// Best-effort DROP used for rollbacks; failures are only logged
pub(crate) async fn drop_quietly(engine: &dyn Engine, database: &str) {
    tracing::warn!("Rolling back: dropping database '{}'", database);
    if let Err(e) = engine
        .execute(&format!("DROP DATABASE IF EXISTS {}", quote_identifier(database)))
        .await
    {
        tracing::warn!("Rollback of '{}' failed: {:#}", database, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, FakeRunner, FakeStep};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn setup(steps: Vec<FakeStep>, rollback: bool) -> (TempDir, BackupManager, Arc<FakeRunner>) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("shop_backup.sql"), "CREATE TABLE t (id INT);").unwrap();
        let runner = Arc::new(FakeRunner::new(steps));
        let manager = BackupManager::new(
            dir.path(),
            runner.clone(),
            DatabaseConfig::default(),
            ToolsConfig::default(),
        )
        .with_restore_rollback(rollback);
        (dir, manager, runner)
    }

    fn request(filename: &str, target: RestoreTarget) -> RestoreRequest {
        RestoreRequest {
            filename: filename.to_string(),
            target,
        }
    }

    #[tokio::test]
    async fn test_restore_into_existing() {
        let (_dir, manager, runner) = setup(vec![FakeStep::restore_ok()], false);
        let engine = FakeEngine::with_schemas(&["shop"]);

        let databases = manager
            .restore(
                &engine,
                &request("shop_backup.sql", RestoreTarget::Existing("shop".into())),
            )
            .await
            .unwrap();

        assert_eq!(databases, vec!["shop"]);
        let calls = runner.calls();
        assert_eq!(calls[0].program, "mysql");
        assert_eq!(calls[0].args.last().map(String::as_str), Some("shop"));
        assert_eq!(
            calls[0].stdin_content.as_deref(),
            Some("CREATE TABLE t (id INT);")
        );
    }

    #[tokio::test]
    async fn test_whitespace_only_output_is_success() {
        let (_dir, manager, _) = setup(vec![FakeStep::restore_output("  \n\t\n")], false);
        let engine = FakeEngine::with_schemas(&["shop"]);

        let result = manager
            .restore(
                &engine,
                &request("shop_backup.sql", RestoreTarget::Existing("shop".into())),
            )
            .await;

        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_restore_create_new() {
        let (_dir, manager, _) = setup(vec![FakeStep::restore_ok()], false);
        let engine = FakeEngine::with_schemas(&["shop"]);

        let databases = manager
            .restore(
                &engine,
                &request("shop_backup.sql", RestoreTarget::CreateNew("shop_copy".into())),
            )
            .await
            .unwrap();

        assert_eq!(databases, vec!["shop", "shop_copy"]);
        assert_eq!(
            engine.executed(),
            vec!["CREATE DATABASE IF NOT EXISTS `shop_copy`"]
        );
    }

    #[tokio::test]
    async fn test_restore_validation_happens_before_any_mutation() {
        let (_dir, manager, runner) = setup(vec![], false);
        let engine = FakeEngine::with_schemas(&["shop", "mysql"]);

        let cases = [
            request("", RestoreTarget::Existing("shop".into())),
            request("shop_backup.sql", RestoreTarget::Existing("ghost".into())),
            request("shop_backup.sql", RestoreTarget::CreateNew("bad-name".into())),
            request("shop_backup.sql", RestoreTarget::CreateNew("mysql".into())),
            request("missing.sql", RestoreTarget::CreateNew("fresh".into())),
            request("../shop_backup.sql", RestoreTarget::Existing("shop".into())),
        ];
        for case in &cases {
            assert!(manager.restore(&engine, case).await.is_err(), "{:?}", case);
        }

        assert!(engine.executed().is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_error_kinds() {
        let (_dir, manager, _) = setup(vec![], false);
        let engine = FakeEngine::with_schemas(&["shop"]);

        let err = manager
            .restore(&engine, &request("shop_backup.sql", RestoreTarget::Existing("ghost".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::NotFound(_)));

        let err = manager
            .restore(&engine, &request("nope.sql", RestoreTarget::Existing("shop".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_output_is_failure_without_rollback_by_default() {
        let (_dir, manager, _) = setup(
            vec![FakeStep::restore_output("ERROR 1064 (42000) at line 1: syntax error")],
            false,
        );
        let engine = FakeEngine::with_schemas(&[]);

        let err = manager
            .restore(&engine, &request("shop_backup.sql", RestoreTarget::CreateNew("fresh".into())))
            .await
            .unwrap_err();

        assert!(matches!(err, PanelError::OperationFailed(_)));
        assert!(err.to_string().starts_with("Restore failed: ERROR 1064"));
        assert_eq!(engine.schemas(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_restore_rollback_drops_created_database() {
        let (_dir, manager, _) = setup(vec![FakeStep::restore_output("ERROR 1064")], true);
        let engine = FakeEngine::with_schemas(&[]);

        let err = manager
            .restore(&engine, &request("shop_backup.sql", RestoreTarget::CreateNew("fresh".into())))
            .await
            .unwrap_err();

        assert!(matches!(err, PanelError::OperationFailed(_)));
        assert!(engine.schemas().is_empty());
    }

    #[tokio::test]
    async fn test_restore_rollback_keeps_preexisting_database() {
        let (_dir, manager, _) = setup(vec![FakeStep::restore_output("ERROR 1064")], true);
        let engine = FakeEngine::with_schemas(&["fresh"]);

        manager
            .restore(&engine, &request("shop_backup.sql", RestoreTarget::CreateNew("fresh".into())))
            .await
            .unwrap_err();

        assert_eq!(engine.schemas(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_restore_runner_error_is_operation_failed() {
        let (_dir, manager, _) = setup(
            vec![FakeStep::Error("mysql did not finish within 1s".into())],
            false,
        );
        let engine = FakeEngine::with_schemas(&["shop"]);

        let err = manager
            .restore(&engine, &request("shop_backup.sql", RestoreTarget::Existing("shop".into())))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Restore failed: mysql did not finish within 1s");
    }
}
