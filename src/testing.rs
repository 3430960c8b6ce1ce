// ABOUTME: In-memory engine and scripted tool runner for unit tests
// ABOUTME: Lets backup, restore and clone logic run without a MySQL server

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use mysql_async::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::engine::{Engine, Record, Scope};
use crate::tools::{ToolInvocation, ToolOutput, ToolRunner};

/// Engine keeping the schema list in memory and interpreting
/// `CREATE DATABASE` / `DROP DATABASE` statements against it
#[derive(Default)]
pub struct FakeEngine {
    schemas: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    failing_statements: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, Vec<Record>)>>,
    failing_queries: Mutex<Vec<String>>,
    fetches: Mutex<Vec<(Scope, String, Vec<Value>)>>,
}

impl FakeEngine {
    pub fn with_schemas(schemas: &[&str]) -> Self {
        let engine = Self::default();
        *engine.schemas.lock().unwrap() = schemas.iter().map(|s| s.to_string()).collect();
        engine
    }

    /// Statements starting with `prefix` fail with a server-style error
    pub fn fail_statements_starting_with(&self, prefix: &str) {
        self.failing_statements
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    /// Queries containing `needle` return `records`
    pub fn respond(&self, needle: &str, records: Vec<Record>) {
        self.responses
            .lock()
            .unwrap()
            .push((needle.to_string(), records));
    }

    /// Queries containing `needle` fail
    pub fn fail_queries_containing(&self, needle: &str) {
        self.failing_queries.lock().unwrap().push(needle.to_string());
    }

    pub fn schemas(&self) -> Vec<String> {
        self.schemas.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<(Scope, String, Vec<Value>)> {
        self.fetches.lock().unwrap().clone()
    }
}

fn backticked_name(statement: &str) -> Option<String> {
    let start = statement.find('`')?;
    let end = statement.rfind('`')?;
    (end > start).then(|| statement[start + 1..end].replace("``", "`"))
}

#[async_trait]
impl Engine for FakeEngine {
    async fn schema_names(&self) -> Result<Vec<String>> {
        Ok(self.schemas())
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        self.executed.lock().unwrap().push(statement.to_string());

        if self
            .failing_statements
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| statement.starts_with(prefix.as_str()))
        {
            bail!("ERROR 1044 (42000): Access denied for user 'admin'@'%'");
        }

        let mut schemas = self.schemas.lock().unwrap();
        if let Some(rest) = statement.strip_prefix("CREATE DATABASE IF NOT EXISTS ") {
            let name = backticked_name(rest).ok_or_else(|| anyhow!("bad statement"))?;
            if !schemas.contains(&name) {
                schemas.push(name);
            }
        } else if let Some(rest) = statement.strip_prefix("CREATE DATABASE ") {
            let name = backticked_name(rest).ok_or_else(|| anyhow!("bad statement"))?;
            if schemas.contains(&name) {
                bail!(
                    "ERROR 1007 (HY000): Can't create database '{}'; database exists",
                    name
                );
            }
            schemas.push(name);
        } else if let Some(rest) = statement.strip_prefix("DROP DATABASE IF EXISTS ") {
            let name = backticked_name(rest).ok_or_else(|| anyhow!("bad statement"))?;
            schemas.retain(|s| s != &name);
        } else if let Some(rest) = statement.strip_prefix("DROP DATABASE ") {
            let name = backticked_name(rest).ok_or_else(|| anyhow!("bad statement"))?;
            if !schemas.contains(&name) {
                bail!(
                    "ERROR 1008 (HY000): Can't drop database '{}'; database doesn't exist",
                    name
                );
            }
            schemas.retain(|s| s != &name);
        }
        Ok(())
    }

    async fn fetch(&self, scope: &Scope, sql: &str, params: Vec<Value>) -> Result<Vec<Record>> {
        self.fetches
            .lock()
            .unwrap()
            .push((scope.clone(), sql.to_string(), params));

        if self
            .failing_queries
            .lock()
            .unwrap()
            .iter()
            .any(|needle| sql.contains(needle.as_str()))
        {
            bail!("ERROR 1146 (42S02): Table doesn't exist");
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, records)| records.clone())
            .unwrap_or_default())
    }
}

/// One scripted tool outcome
pub enum FakeStep {
    /// Write `content` to the `--result-file` target and print `output`
    Dump { content: String, output: String },
    /// Print `output` (blank means success for restores)
    Restore { output: String },
    /// The tool could not be run at all
    Error(String),
    /// Wait before producing the inner step
    Slow(Duration, Box<FakeStep>),
}

impl FakeStep {
    pub fn dump(content: &str) -> Self {
        Self::Dump {
            content: content.to_string(),
            output: String::new(),
        }
    }

    pub fn failed_dump(output: &str) -> Self {
        Self::Dump {
            content: String::new(),
            output: output.to_string(),
        }
    }

    pub fn restore_ok() -> Self {
        Self::Restore {
            output: String::new(),
        }
    }

    pub fn restore_output(output: &str) -> Self {
        Self::Restore {
            output: output.to_string(),
        }
    }

    pub fn slow(delay: Duration, step: FakeStep) -> Self {
        Self::Slow(delay, Box::new(step))
    }
}

/// What the runner was asked to do
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<PathBuf>,
    pub stdin_content: Option<String>,
}

#[derive(Default)]
pub struct FakeRunner {
    steps: Mutex<VecDeque<FakeStep>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeRunner {
    pub fn new(steps: Vec<FakeStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let stdin_content = invocation
            .stdin
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok());
        self.calls.lock().unwrap().push(RecordedCall {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            stdin: invocation.stdin.clone(),
            stdin_content,
        });

        let mut step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected tool invocation: {}", invocation.program))?;
        let step = loop {
            match step {
                FakeStep::Slow(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
                other => break other,
            }
        };

        match step {
            FakeStep::Dump { content, output } => {
                if let Some(path) = invocation.arg_value("--result-file") {
                    std::fs::write(path, content)?;
                }
                let failed = !output.is_empty();
                Ok(ToolOutput {
                    exit_code: Some(if failed { 2 } else { 0 }),
                    output,
                })
            }
            FakeStep::Restore { output } => Ok(ToolOutput {
                exit_code: Some(if output.trim().is_empty() { 0 } else { 1 }),
                output,
            }),
            FakeStep::Error(message) => Err(anyhow!(message)),
            FakeStep::Slow(..) => unreachable!("slow steps are unwrapped above"),
        }
    }
}
