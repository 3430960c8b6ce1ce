// ABOUTME: Database engine abstraction used by every panel operation
// ABOUTME: Separates SQL access from the operations so they can run against fakes

use anyhow::Result;
use async_trait::async_trait;
use mysql_async::Value;
use serde_json::{Map, Value as JsonValue};

/// One result row as a column-name -> value mapping
pub type Record = Map<String, JsonValue>;

/// Which default schema a fetch runs against
///
/// `Schema` queries are executed on a session whose default database is the
/// given schema and which is discarded afterwards. No shared connection ever
/// has its default database changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Server,
    Schema(String),
}

impl Scope {
    pub fn schema(name: &str) -> Self {
        Self::Schema(name.to_string())
    }
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Every schema the server reports, including system schemas
    async fn schema_names(&self) -> Result<Vec<String>>;

    /// Execute a statement that returns no rows
    async fn execute(&self, statement: &str) -> Result<()>;

    /// Run a query and return its rows as JSON records
    ///
    /// With empty `params` the text protocol is used, so statements that cannot
    /// be prepared (`SHOW ...`) still work.
    async fn fetch(&self, scope: &Scope, sql: &str, params: Vec<Value>) -> Result<Vec<Record>>;
}

/// Read an unsigned integer column, accepting numbers or numeric strings
pub fn record_u64(record: &Record, column: &str) -> u64 {
    match record.get(column) {
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(JsonValue::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Read a string column, `None` for SQL NULL
pub fn record_string(record: &Record, column: &str) -> Option<String> {
    match record.get(column) {
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(JsonValue::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}
