// ABOUTME: Runs the external MySQL client tools (mysqldump, mysql)
// ABOUTME: Passes credentials through a private option file and caps time and output

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::config::DatabaseConfig;

/// Temporary MySQL option file holding connection credentials
///
/// Handed to the tools with `--defaults-extra-file` so the password never
/// appears in the process list. The file is created with owner-only
/// permissions and removed when dropped.
pub struct OptionsFile {
    file: NamedTempFile,
}

impl OptionsFile {
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("mysql-panel-client-")
            .suffix(".cnf")
            .tempfile()
            .context("Failed to create MySQL option file")?;

        let contents = format!(
            "[client]\nhost={}\nport={}\nuser={}\npassword={}\n",
            option_value(&config.host),
            config.port,
            option_value(&config.username),
            option_value(&config.password),
        );
        file.write_all(contents.as_bytes())
            .context("Failed to write MySQL option file")?;
        file.flush().context("Failed to write MySQL option file")?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Quote an option-file value; backslash and double quote are escaped
fn option_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A fully built external tool command
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// File fed to the tool's standard input
    pub stdin: Option<PathBuf>,
    options_file: Option<OptionsFile>,
}

impl ToolInvocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            stdin: None,
            options_file: None,
        }
    }

    /// Start an invocation authenticated through a fresh option file
    ///
    /// `--defaults-extra-file` must be the first argument for the MySQL tools
    /// to honour it, so it is pushed before anything else.
    pub fn with_credentials(program: &str, config: &DatabaseConfig) -> Result<Self> {
        let options_file = OptionsFile::new(config)?;
        let mut invocation = Self::new(program);
        invocation.args.push(format!(
            "--defaults-extra-file={}",
            options_file.path().display()
        ));
        invocation.options_file = Some(options_file);
        Ok(invocation)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdin_file(mut self, path: &Path) -> Self {
        self.stdin = Some(path.to_path_buf());
        self
    }

    /// Value of a `--name=value` argument, if present
    pub fn arg_value(&self, name: &str) -> Option<&str> {
        let prefix = format!("{}=", name);
        self.args.iter().find_map(|arg| arg.strip_prefix(prefix.as_str()))
    }

    /// Arguments safe to log (option file path elided)
    pub fn display_args(&self) -> String {
        self.args
            .iter()
            .filter(|arg| !arg.starts_with("--defaults-extra-file="))
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a tool run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Standard output followed by standard error
    pub output: String,
}

impl ToolOutput {
    pub fn is_blank(&self) -> bool {
        self.output.trim().is_empty()
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Runs tools as child processes
pub struct ProcessRunner {
    timeout: Duration,
    output_limit: usize,
}

impl ProcessRunner {
    pub fn new(timeout: Duration, output_limit: usize) -> Self {
        Self {
            timeout,
            output_limit,
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        tracing::debug!(
            "Running {} {}",
            invocation.program,
            invocation.display_args()
        );

        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &invocation.stdin {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("Failed to open {} for input", path.display()))?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        let child = cmd.spawn().with_context(|| {
            format!(
                "Failed to execute {}. Is the MySQL client installed?\n\
                 Install with:\n\
                 - Ubuntu/Debian: sudo apt-get install mysql-client\n\
                 - macOS: brew install mysql-client",
                invocation.program
            )
        })?;

        // Dropping the wait future on timeout kills the child (kill_on_drop).
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow!(
                    "{} did not finish within {:?} and was terminated",
                    invocation.program,
                    self.timeout
                )
            })?
            .with_context(|| format!("Failed to wait for {}", invocation.program))?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        Ok(ToolOutput {
            exit_code: output.status.code(),
            output: cap_output(&combined, self.output_limit),
        })
    }
}

/// Decode tool output, keeping at most `limit` bytes
fn cap_output(bytes: &[u8], limit: usize) -> String {
    if bytes.len() <= limit {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..limit]).into_owned();
    text.push_str(&format!(
        "\n... [output truncated, {} more bytes]",
        bytes.len() - limit
    ));
    text
}
