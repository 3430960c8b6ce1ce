// ABOUTME: Builds and runs mysqldump invocations
// ABOUTME: Judges success by the dump file on disk, not by the exit code

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{DatabaseConfig, ToolsConfig};
use crate::tools::{ToolInvocation, ToolRunner};

/// What to dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpTarget<'a> {
    Database(&'a str),
    AllDatabases,
}

/// Result of a dump attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    /// The dump file exists and is not empty
    Written { size: u64 },
    /// No usable file was produced; carries everything the tool printed
    Failed { output: String },
}

/// Build the mysqldump command for `target`
///
/// Every dump uses a consistent snapshot and includes routines and triggers.
/// Full-server dumps skip `mysql.event`.
pub fn dump_invocation(
    tools: &ToolsConfig,
    client: &DatabaseConfig,
    target: DumpTarget<'_>,
    output_path: &Path,
) -> Result<ToolInvocation> {
    let mut invocation = ToolInvocation::with_credentials(&tools.mysqldump, client)?
        .arg("--single-transaction")
        .arg("--routines")
        .arg("--triggers");

    invocation = match target {
        DumpTarget::Database(database) => invocation
            .arg(format!("--result-file={}", output_path.display()))
            .arg(database),
        DumpTarget::AllDatabases => invocation
            .arg("--all-databases")
            .arg("--ignore-table=mysql.event")
            .arg(format!("--result-file={}", output_path.display())),
    };

    Ok(invocation)
}

/// Run a dump and inspect the file it was supposed to write
///
/// mysqldump prints warnings and progress on the same streams it reports
/// errors on, so the only success signal is a non-empty output file. An empty
/// file left behind by a failed run is removed.
pub async fn run_dump(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    output_path: &Path,
) -> Result<DumpOutcome> {
    let output = runner.run(invocation).await?;

    let size = match std::fs::metadata(output_path) {
        Ok(metadata) => metadata.len(),
        Err(_) => 0,
    };

    if size > 0 {
        if output.exit_code != Some(0) {
            tracing::warn!(
                "{} exited with {:?} but wrote {} bytes to {}; keeping the file",
                invocation.program,
                output.exit_code,
                size,
                output_path.display()
            );
        }
        return Ok(DumpOutcome::Written { size });
    }

    if output_path.exists() {
        std::fs::remove_file(output_path).with_context(|| {
            format!("Failed to remove empty dump file {}", output_path.display())
        })?;
    }

    Ok(DumpOutcome::Failed {
        output: output.output,
    })
}
