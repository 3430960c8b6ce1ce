// ABOUTME: Read-only schema browser and query runner
// ABOUTME: Every per-database query runs on its own scoped session

use mysql_async::Value;
use serde::Serialize;
use std::time::Instant;

use crate::backup::format_bytes;
use crate::engine::{record_string, record_u64, Engine, Record, Scope};
use crate::error::{PanelError, PanelResult};
use crate::registry::database_exists;
use crate::utils::{quote_identifier, validate_database_name, validate_table_name};

/// Statement prefixes the query runner accepts
pub const ALLOWED_QUERY_PREFIXES: [&str; 5] = ["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

/// Keywords rejected anywhere in a query, even inside identifiers
pub const FORBIDDEN_QUERY_KEYWORDS: [&str; 8] = [
    "DELETE", "UPDATE", "INSERT", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE",
];

pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const MIN_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: String,
    pub engine: Option<String>,
    pub rows: u64,
    pub size: String,
    pub size_bytes: u64,
    pub created: Option<String>,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub nullable: bool,
    pub key: String,
    pub default: Option<String>,
    pub extra: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub column: Option<String>,
    pub unique: bool,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub index_type: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableStructure {
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
}

/// Page window over a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Clamp client-supplied values: limit to [10, 100] (default 50), page to
    /// at least 1 (default 1)
    ///
    /// # Examples
    ///
    /// ```
    /// # use mysql_panel::browser::PageRequest;
    /// assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 50 });
    /// assert_eq!(PageRequest::new(Some(0), Some(500)), PageRequest { page: 1, limit: 100 });
    /// assert_eq!(PageRequest::new(Some(3), Some(1)).offset(), 20);
    /// ```
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(MIN_PAGE_SIZE as i64, MAX_PAGE_SIZE as i64) as u64;
        let page = page.unwrap_or(1).max(1) as u64;
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TablePage {
    pub data: Vec<Record>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryOutcome {
    pub results: Vec<Record>,
    pub row_count: usize,
    /// Milliseconds, two decimals
    pub execution_time: f64,
}

async fn require_database(engine: &dyn Engine, database: &str) -> PanelResult<()> {
    validate_database_name(database)?;
    if !database_exists(engine, database).await? {
        return Err(PanelError::not_found(format!(
            "Database '{}' not found",
            database
        )));
    }
    Ok(())
}

async fn require_table(engine: &dyn Engine, database: &str, table: &str) -> PanelResult<()> {
    validate_table_name(table)?;
    require_database(engine, database).await?;

    let rows = engine
        .fetch(
            &Scope::Server,
            "SELECT COUNT(*) AS table_count FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
            vec![Value::from(database), Value::from(table)],
        )
        .await?;

    if rows.first().map(|r| record_u64(r, "table_count")).unwrap_or(0) == 0 {
        return Err(PanelError::not_found(format!(
            "Table '{}' not found in database '{}'",
            table, database
        )));
    }
    Ok(())
}

/// Tables and views of a user database with their size and timestamps
pub async fn list_tables(engine: &dyn Engine, database: &str) -> PanelResult<Vec<TableInfo>> {
    require_database(engine, database).await?;

    let rows = engine
        .fetch(
            &Scope::Server,
            "SELECT TABLE_NAME AS name, TABLE_TYPE AS table_type, ENGINE AS engine, \
             COALESCE(TABLE_ROWS, 0) AS table_rows, \
             COALESCE(DATA_LENGTH, 0) + COALESCE(INDEX_LENGTH, 0) AS size_bytes, \
             CREATE_TIME AS created, UPDATE_TIME AS updated \
             FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME",
            vec![Value::from(database)],
        )
        .await
        .map_err(|e| PanelError::failed(format!("Failed to list tables: {:#}", e)))?;

    Ok(rows
        .iter()
        .map(|row| {
            let size_bytes = record_u64(row, "size_bytes");
            TableInfo {
                name: record_string(row, "name").unwrap_or_default(),
                table_type: record_string(row, "table_type").unwrap_or_default(),
                engine: record_string(row, "engine"),
                rows: record_u64(row, "table_rows"),
                size: format_bytes(size_bytes),
                size_bytes,
                created: record_string(row, "created"),
                updated: record_string(row, "updated"),
            }
        })
        .collect())
}

/// Column and index metadata of one table
pub async fn table_structure(
    engine: &dyn Engine,
    database: &str,
    table: &str,
) -> PanelResult<TableStructure> {
    require_table(engine, database, table).await?;

    let params = || vec![Value::from(database), Value::from(table)];

    let columns = engine
        .fetch(
            &Scope::Server,
            "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS column_type, IS_NULLABLE AS nullable, \
             COLUMN_KEY AS column_key, COLUMN_DEFAULT AS default_value, EXTRA AS extra, \
             COLUMN_COMMENT AS comment \
             FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
            params(),
        )
        .await
        .map_err(|e| PanelError::failed(format!("Failed to read columns: {:#}", e)))?;

    let indexes = engine
        .fetch(
            &Scope::Server,
            "SELECT INDEX_NAME AS name, COLUMN_NAME AS column_name, NON_UNIQUE AS non_unique, \
             SEQ_IN_INDEX AS seq_in_index, INDEX_TYPE AS index_type \
             FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            params(),
        )
        .await
        .map_err(|e| PanelError::failed(format!("Failed to read indexes: {:#}", e)))?;

    Ok(TableStructure {
        columns: columns
            .iter()
            .map(|row| ColumnInfo {
                name: record_string(row, "name").unwrap_or_default(),
                column_type: record_string(row, "column_type").unwrap_or_default(),
                nullable: record_string(row, "nullable").as_deref() == Some("YES"),
                key: record_string(row, "column_key").unwrap_or_default(),
                default: record_string(row, "default_value"),
                extra: record_string(row, "extra").unwrap_or_default(),
                comment: record_string(row, "comment").unwrap_or_default(),
            })
            .collect(),
        indexes: indexes
            .iter()
            .map(|row| IndexInfo {
                name: record_string(row, "name").unwrap_or_default(),
                column: record_string(row, "column_name"),
                unique: record_u64(row, "non_unique") == 0,
                sequence: record_u64(row, "seq_in_index"),
                index_type: record_string(row, "index_type").unwrap_or_default(),
            })
            .collect(),
    })
}

/// One page of rows from a table
///
/// The count and the select both run on a session scoped to `database`.
pub async fn table_data(
    engine: &dyn Engine,
    database: &str,
    table: &str,
    page: PageRequest,
) -> PanelResult<TablePage> {
    require_table(engine, database, table).await?;

    let scope = Scope::schema(database);
    let quoted = quote_identifier(table);

    let counted = engine
        .fetch(
            &scope,
            &format!("SELECT COUNT(*) AS total FROM {}", quoted),
            Vec::new(),
        )
        .await
        .map_err(|e| PanelError::failed(format!("Failed to count rows: {:#}", e)))?;
    let total = counted.first().map(|r| record_u64(r, "total")).unwrap_or(0);

    let data = engine
        .fetch(
            &scope,
            &format!("SELECT * FROM {} LIMIT ? OFFSET ?", quoted),
            vec![Value::from(page.limit), Value::from(page.offset())],
        )
        .await
        .map_err(|e| PanelError::failed(format!("Failed to read rows: {:#}", e)))?;

    Ok(TablePage {
        data,
        pagination: Pagination {
            current_page: page.page,
            per_page: page.limit,
            total,
            total_pages: total.div_ceil(page.limit),
        },
    })
}

/// Reject anything that is not a plain read
///
/// Both checks always apply: the prefix must be one of
/// [`ALLOWED_QUERY_PREFIXES`] and no [`FORBIDDEN_QUERY_KEYWORDS`] may appear
/// anywhere, which also catches statements stacked after a semicolon.
///
/// # Examples
///
/// ```
/// # use mysql_panel::browser::check_read_only;
/// assert!(check_read_only("select * from users").is_ok());
/// assert!(check_read_only("SELECT * FROM t; DROP TABLE t").is_err());
/// assert!(check_read_only("UPDATE t SET a = 1").is_err());
/// ```
pub fn check_read_only(query: &str) -> PanelResult<()> {
    let upper = query.trim().to_ascii_uppercase();

    if !ALLOWED_QUERY_PREFIXES
        .iter()
        .any(|prefix| upper.starts_with(prefix))
    {
        return Err(PanelError::invalid(
            "Only SELECT, SHOW, DESCRIBE and EXPLAIN queries are allowed",
        ));
    }

    if let Some(keyword) = FORBIDDEN_QUERY_KEYWORDS
        .iter()
        .find(|keyword| upper.contains(*keyword))
    {
        return Err(PanelError::invalid(format!(
            "Query contains forbidden keyword: {}",
            keyword
        )));
    }

    Ok(())
}

/// Run a read-only query against `database` and time it
pub async fn execute_query(
    engine: &dyn Engine,
    database: &str,
    query: &str,
) -> PanelResult<QueryOutcome> {
    require_database(engine, database).await?;

    let query = query.trim();
    if query.is_empty() {
        return Err(PanelError::invalid("Query is required"));
    }
    check_read_only(query)?;

    tracing::debug!("Running query on '{}': {}", database, query);
    let started = Instant::now();
    let results = engine
        .fetch(&Scope::schema(database), query, Vec::new())
        .await
        .map_err(|e| PanelError::failed(format!("Query failed: {:#}", e)))?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    Ok(QueryOutcome {
        row_count: results.len(),
        results,
        execution_time: (elapsed_ms * 100.0).round() / 100.0,
    })
}
