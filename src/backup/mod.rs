// ABOUTME: Backup directory management: dump, list, resolve and delete .sql files
// ABOUTME: The directory listing is the only index of backups

pub mod clone;
pub mod dump;
pub mod restore;

use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::{DatabaseConfig, ToolsConfig};
use crate::engine::Engine;
use crate::error::{PanelError, PanelResult};
use crate::registry::database_exists;
use crate::tools::ToolRunner;
use crate::utils::validate_database_name;

pub use dump::{DumpOutcome, DumpTarget};
pub use restore::{RestoreRequest, RestoreTarget};

/// One backup file as shown in listings
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackupRecord {
    pub filename: String,
    /// Human-readable size
    pub size: String,
    pub size_bytes: u64,
    /// Modification time, local, `YYYY-MM-DD HH:MM:SS`
    pub created: String,
    pub path: String,
    #[serde(skip)]
    modified: Option<SystemTime>,
}

/// A dump that was just written
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackupCreated {
    pub filename: String,
    pub size: String,
    pub size_bytes: u64,
    pub path: String,
}

/// Owns the backup directory and the tools that fill it
pub struct BackupManager {
    dir: PathBuf,
    runner: Arc<dyn ToolRunner>,
    client: DatabaseConfig,
    tools: ToolsConfig,
    rollback_failed_restore: bool,
}

impl BackupManager {
    pub fn new(
        dir: impl Into<PathBuf>,
        runner: Arc<dyn ToolRunner>,
        client: DatabaseConfig,
        tools: ToolsConfig,
    ) -> Self {
        Self {
            dir: dir.into(),
            runner,
            client,
            tools,
            rollback_failed_restore: false,
        }
    }

    /// Drop a database created for a restore when that restore fails
    pub fn with_restore_rollback(mut self, enabled: bool) -> Self {
        self.rollback_failed_restore = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Dump a single user database into the backup directory
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a name that fails validation
    /// - `NotFound` when the database is not in the registry
    /// - `OperationFailed("Backup failed: ...")` carrying the tool output
    pub async fn backup_one(
        &self,
        engine: &dyn Engine,
        database: &str,
    ) -> PanelResult<BackupCreated> {
        validate_database_name(database)?;
        if !database_exists(engine, database).await? {
            return Err(PanelError::not_found(format!(
                "Database '{}' not found",
                database
            )));
        }

        let filename = format!("{}_backup_{}.sql", database, timestamp());
        self.write_dump(DumpTarget::Database(database), &filename)
            .await
    }

    /// Dump every schema (except `mysql.event`) into one file
    pub async fn backup_all(&self) -> PanelResult<BackupCreated> {
        let filename = format!("all_databases_backup_{}.sql", timestamp());
        self.write_dump(DumpTarget::AllDatabases, &filename).await
    }

    async fn write_dump(
        &self,
        target: DumpTarget<'_>,
        filename: &str,
    ) -> PanelResult<BackupCreated> {
        self.ensure_dir()?;
        let path = self.dir.join(filename);

        tracing::info!("Writing backup {}", path.display());
        let invocation = dump::dump_invocation(&self.tools, &self.client, target, &path)?;

        match dump::run_dump(self.runner.as_ref(), &invocation, &path).await {
            Ok(DumpOutcome::Written { size }) => {
                tracing::info!("✓ Backup {} written ({})", filename, format_bytes(size));
                Ok(BackupCreated {
                    filename: filename.to_string(),
                    size: format_bytes(size),
                    size_bytes: size,
                    path: absolute_display(&path),
                })
            }
            Ok(DumpOutcome::Failed { output }) => {
                tracing::error!("Backup {} failed: {}", filename, output.trim());
                Err(PanelError::failed(format!("Backup failed: {}", output)))
            }
            Err(e) => {
                remove_if_empty(&path);
                tracing::error!("Backup {} failed: {:#}", filename, e);
                Err(PanelError::failed(format!("Backup failed: {:#}", e)))
            }
        }
    }

    /// Create the backup directory (0755 on unix) if it is missing
    ///
    /// An existing directory keeps whatever permissions it has.
    fn ensure_dir(&self) -> PanelResult<()> {
        if self.dir.is_dir() {
            return Ok(());
        }

        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder.create(&self.dir).with_context(|| {
            format!("Failed to create backup directory {}", self.dir.display())
        })?;

        Ok(())
    }

    /// Every `.sql` file in the backup directory, newest first
    ///
    /// A missing directory is an empty list.
    pub fn list(&self) -> PanelResult<Vec<BackupRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read backup directory entry")?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let modified = metadata.modified().ok();
            records.push(BackupRecord {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size: format_bytes(metadata.len()),
                size_bytes: metadata.len(),
                created: modified.map(format_mtime).unwrap_or_default(),
                path: absolute_display(&path),
                modified,
            });
        }

        records.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(records)
    }

    /// Map a client-supplied file name to a backup file on disk
    ///
    /// Only bare names are accepted, and the canonical path must stay inside
    /// the backup directory so symlinks cannot point elsewhere.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty name or one with path components
    /// - `NotFound` when no such regular file is inside the directory
    pub fn resolve(&self, filename: &str) -> PanelResult<PathBuf> {
        if filename.is_empty() {
            return Err(PanelError::invalid("Filename is required"));
        }
        if filename == "."
            || filename == ".."
            || filename.contains(['/', '\\', '\0'])
        {
            return Err(PanelError::invalid("Invalid backup filename"));
        }

        let not_found = || PanelError::not_found("Backup file not found");

        let candidate = self.dir.join(filename);
        let canonical_dir = self.dir.canonicalize().map_err(|_| not_found())?;
        let canonical = candidate.canonicalize().map_err(|_| not_found())?;

        if !canonical.starts_with(&canonical_dir) || !canonical.is_file() {
            tracing::warn!("Rejected backup path outside {}: {}", self.dir.display(), filename);
            return Err(not_found());
        }

        Ok(canonical)
    }

    /// Delete a backup file
    pub fn delete(&self, filename: &str) -> PanelResult<()> {
        let path = self.resolve(filename)?;
        std::fs::remove_file(&path).map_err(|e| {
            tracing::error!("Failed to delete {}: {}", path.display(), e);
            PanelError::failed("Failed to delete backup file")
        })?;
        tracing::info!("✓ Deleted backup {}", filename);
        Ok(())
    }
}

/// Timestamp used in backup file names
fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

fn format_mtime(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn absolute_display(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn remove_if_empty(path: &Path) {
    if std::fs::metadata(path).is_ok_and(|m| m.len() == 0) {
        let _ = std::fs::remove_file(path);
    }
}

/// Human-readable byte size with 1024-based units
///
/// # Examples
///
/// ```
/// # use mysql_panel::backup::format_bytes;
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1024), "1 KB");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// ```
pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if size == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut divisor: u64 = 1;
    while unit < UNITS.len() - 1 && size / divisor >= 1024 {
        divisor *= 1024;
        unit += 1;
    }

    let value = (size as f64 / divisor as f64 * 100.0).round() / 100.0;
    // f64 Display prints 1.0 as "1" and 1.50 as "1.5"
    format!("{} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, FakeRunner, FakeStep};
    use tempfile::tempdir;

    fn manager(dir: &Path, steps: Vec<FakeStep>) -> (BackupManager, Arc<FakeRunner>) {
        let runner = Arc::new(FakeRunner::new(steps));
        let manager = BackupManager::new(
            dir,
            runner.clone(),
            DatabaseConfig {
                username: "admin".to_string(),
                ..DatabaseConfig::default()
            },
            ToolsConfig::default(),
        );
        (manager, runner)
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1), "1 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1 MB");
        assert_eq!(format_bytes(1_572_864), "1.5 MB");
        assert_eq!(format_bytes(1_234_567), "1.18 MB");
        assert_eq!(format_bytes(1u64 << 40), "1 TB");
        assert_eq!(format_bytes(2048u64 << 40), "2048 TB");
    }

    #[tokio::test]
    async fn test_backup_one_writes_named_file() {
        let dir = tempdir().unwrap();
        let backups = dir.path().join("backups");
        let (manager, runner) = manager(&backups, vec![FakeStep::dump("-- dump\n")]);
        let engine = FakeEngine::with_schemas(&["shop"]);

        let created = manager.backup_one(&engine, "shop").await.unwrap();

        assert!(created.filename.starts_with("shop_backup_"));
        assert!(created.filename.ends_with(".sql"));
        assert_eq!(created.size_bytes, 8);
        assert_eq!(created.size, "8 B");
        assert!(backups.join(&created.filename).exists());

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args.last().map(String::as_str), Some("shop"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backup_keeps_existing_directory_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let backups = dir.path().join("backups");
        std::fs::create_dir(&backups).unwrap();
        std::fs::set_permissions(&backups, std::fs::Permissions::from_mode(0o700)).unwrap();
        let (manager, _) = manager(&backups, vec![FakeStep::dump("-- dump\n")]);
        let engine = FakeEngine::with_schemas(&["shop"]);

        manager.backup_one(&engine, "shop").await.unwrap();

        let mode = std::fs::metadata(&backups).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backup_creates_missing_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let backups = dir.path().join("storage").join("backups");
        let (manager, _) = manager(&backups, vec![FakeStep::dump("-- dump\n")]);
        let engine = FakeEngine::with_schemas(&["shop"]);

        manager.backup_one(&engine, "shop").await.unwrap();

        let mode = std::fs::metadata(&backups).unwrap().permissions().mode();
        assert!(backups.is_dir());
        // umask may clear bits but never adds any
        assert_eq!(mode & 0o777 & !0o755, 0);
    }

    #[tokio::test]
    async fn test_backup_one_unknown_database() {
        let dir = tempdir().unwrap();
        let (manager, runner) = manager(dir.path(), vec![]);
        let engine = FakeEngine::with_schemas(&["mysql"]);

        let err = manager.backup_one(&engine, "mysql").await.unwrap_err();
        assert!(matches!(err, PanelError::NotFound(_)));
        let err = manager.backup_one(&engine, "bad name").await.unwrap_err();
        assert!(matches!(err, PanelError::InvalidInput(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_backup_failure_leaves_no_file() {
        let dir = tempdir().unwrap();
        let (manager, _) = manager(
            dir.path(),
            vec![FakeStep::failed_dump("mysqldump: Got error: 1049: Unknown database")],
        );
        let engine = FakeEngine::with_schemas(&["shop"]);

        let err = manager.backup_one(&engine, "shop").await.unwrap_err();
        assert!(matches!(err, PanelError::OperationFailed(_)));
        assert_eq!(
            err.to_string(),
            "Backup failed: mysqldump: Got error: 1049: Unknown database"
        );
        assert!(manager.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backup_all_uses_distinct_name() {
        let dir = tempdir().unwrap();
        let (manager, runner) = manager(dir.path(), vec![FakeStep::dump("-- all\n")]);

        let created = manager.backup_all().await.unwrap();
        assert!(created.filename.starts_with("all_databases_backup_"));
        assert!(runner.calls()[0]
            .args
            .contains(&"--ignore-table=mysql.event".to_string()));
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let (manager, _) = manager(&dir.path().join("nope"), vec![]);
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_only_sql_newest_first() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("a_backup_old.sql");
        let new = dir.path().join("b_backup_new.sql");
        std::fs::write(&old, "old").unwrap();
        std::fs::write(&new, "newer").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("dir.sql")).unwrap();

        let earlier = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(earlier)
            .unwrap();

        let (manager, _) = manager(dir.path(), vec![]);
        let records = manager.list().unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["b_backup_new.sql", "a_backup_old.sql"]);
        assert_eq!(records[0].size_bytes, 5);
        assert_eq!(records[0].created.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempdir().unwrap();
        let backups = dir.path().join("backups");
        std::fs::create_dir(&backups).unwrap();
        std::fs::write(dir.path().join("secret.sql"), "x").unwrap();
        let (manager, _) = manager(&backups, vec![]);

        for name in ["../secret.sql", "..", ".", "sub/x.sql", "..\\secret.sql"] {
            assert!(
                matches!(manager.resolve(name), Err(PanelError::InvalidInput(_))),
                "{}",
                name
            );
        }
        assert!(matches!(
            manager.resolve(""),
            Err(PanelError::InvalidInput(_))
        ));
        assert!(matches!(
            manager.resolve("missing.sql"),
            Err(PanelError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let dir = tempdir().unwrap();
        let backups = dir.path().join("backups");
        std::fs::create_dir(&backups).unwrap();
        let outside = dir.path().join("outside.sql");
        std::fs::write(&outside, "x").unwrap();
        std::os::unix::fs::symlink(&outside, backups.join("link.sql")).unwrap();

        let (manager, _) = manager(&backups, vec![]);
        assert!(matches!(
            manager.resolve("link.sql"),
            Err(PanelError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("shop_backup_1.sql"), "x").unwrap();
        let (manager, _) = manager(dir.path(), vec![]);

        manager.delete("shop_backup_1.sql").unwrap();
        assert!(!dir.path().join("shop_backup_1.sql").exists());
        assert!(matches!(
            manager.delete("shop_backup_1.sql"),
            Err(PanelError::NotFound(_))
        ));
    }
}
