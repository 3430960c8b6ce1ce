// ABOUTME: Request handlers for each API endpoint
// ABOUTME: Parse the request, call the core operation, shape the JSON response

use anyhow::Context;
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use super::{parse_body, required, run_detached, AppState};
use crate::auth::ServerInfo;
use crate::backup::{BackupRecord, RestoreRequest, RestoreTarget};
use crate::browser::{self, ColumnInfo, IndexInfo, PageRequest, Pagination, TableInfo};
use crate::engine::Record;
use crate::error::PanelError;
use crate::{lifecycle, privileges, registry};

type ApiResult<T> = Result<Json<T>, PanelError>;

#[derive(Debug, Default, Deserialize)]
pub struct AuthRequest {
    password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    authenticated: bool,
    server_info: Option<ServerInfo>,
}

#[derive(Debug, Serialize)]
pub struct DatabasesResponse {
    databases: Vec<String>,
    server_info: ServerInfo,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    success: String,
    databases: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    success: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DatabaseNameRequest {
    db_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddressRequest {
    address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BackupRequest {
    database: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    success: String,
    filename: String,
    path: String,
    size: String,
    size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct BackupListResponse {
    success: bool,
    backups: Vec<BackupRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilenameRequest {
    filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RestoreBody {
    filename: Option<String>,
    target_database: Option<String>,
    #[serde(default)]
    create_new: bool,
    new_database_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloneRequest {
    source_database: Option<String>,
    target_database: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TablesResponse {
    success: bool,
    database: String,
    tables: Vec<TableInfo>,
}

#[derive(Debug, Serialize)]
pub struct StructureResponse {
    success: bool,
    database: String,
    table: String,
    columns: Vec<ColumnInfo>,
    indexes: Vec<IndexInfo>,
}

/// Paging parameters; unparsable values fall back to the defaults
#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse {
    success: bool,
    data: Vec<Record>,
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    database: Option<String>,
    query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    success: bool,
    results: Vec<Record>,
    row_count: usize,
    execution_time: f64,
}

pub async fn authenticate(State(state): State<AppState>, body: Bytes) -> ApiResult<AuthResponse> {
    let request: AuthRequest = parse_body(&body)?;
    let password = required(request.password, "Password is required")?;

    let authenticated = state.credential.verify(&password).await;
    if !authenticated {
        tracing::warn!("Failed authentication attempt");
    }

    Ok(Json(AuthResponse {
        authenticated,
        server_info: authenticated.then(|| state.server_info()),
    }))
}

pub async fn list_databases(State(state): State<AppState>) -> ApiResult<DatabasesResponse> {
    let databases = registry::list_databases(state.engine.as_ref()).await?;
    Ok(Json(DatabasesResponse {
        databases,
        server_info: state.server_info(),
    }))
}

pub async fn create_database(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<MutationResponse> {
    let request: DatabaseNameRequest = parse_body(&body)?;
    let name = request
        .db_name
        .ok_or_else(|| PanelError::invalid("Database name is required"))?;

    let databases = lifecycle::create_database(state.engine.as_ref(), &name).await?;
    Ok(Json(MutationResponse {
        success: format!(
            "The database {} has been created, but you have to create the tables manually, sorry 😢, let's code 🚀!",
            name
        ),
        databases,
    }))
}

pub async fn drop_database(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<MutationResponse> {
    let request: DatabaseNameRequest = parse_body(&body)?;
    let name = required(request.db_name, "Database name is required")?;

    let databases = lifecycle::drop_database(state.engine.as_ref(), &name).await?;
    Ok(Json(MutationResponse {
        success: format!(
            "The database {} has been deleted, now you can create a new one 😎",
            name
        ),
        databases,
    }))
}

pub async fn grant_privileges(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<MessageResponse> {
    let request: AddressRequest = parse_body(&body)?;
    let address = required(request.address, "Invalid address input")?;

    let address = privileges::grant_access(
        state.engine.as_ref(),
        &state.account,
        state.grant_syntax,
        &address,
    )
    .await?;

    Ok(Json(MessageResponse {
        success: format!(
            "The privileges have been flushed for the address {}, now you can connect to the database 😎",
            address
        ),
    }))
}

pub async fn backup_database(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<BackupResponse> {
    let request: BackupRequest = parse_body(&body)?;
    let database = required(request.database, "Database name is required")?;
    // Quoted names are accepted for compatibility with older dashboards.
    let database = database.trim_matches('"').to_string();

    let task = state.clone();
    let name = database.clone();
    let created = run_detached(async move {
        task.backups.backup_one(task.engine.as_ref(), &name).await
    })
    .await?;

    Ok(Json(BackupResponse {
        success: format!(
            "Database '{}' backed up successfully! File: {} ({})",
            database, created.filename, created.size
        ),
        filename: created.filename,
        path: created.path,
        size: created.size,
        size_bytes: created.size_bytes,
    }))
}

pub async fn backup_all_databases(State(state): State<AppState>) -> ApiResult<BackupResponse> {
    let created = run_detached(async move { state.backups.backup_all().await }).await?;

    Ok(Json(BackupResponse {
        success: format!(
            "All databases backed up successfully! File: {} ({})",
            created.filename, created.size
        ),
        filename: created.filename,
        path: created.path,
        size: created.size,
        size_bytes: created.size_bytes,
    }))
}

pub async fn list_backups(State(state): State<AppState>) -> ApiResult<BackupListResponse> {
    Ok(Json(BackupListResponse {
        success: true,
        backups: state.backups.list()?,
    }))
}

pub async fn download_backup(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, PanelError> {
    let request: FilenameRequest = parse_body(&body)?;
    let filename = required(request.filename, "Filename is required")?;
    let path = state.backups.resolve(&filename)?;

    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let length = file
        .metadata()
        .await
        .with_context(|| format!("Failed to read metadata of {}", path.display()))?
        .len();

    tracing::info!("Streaming backup {} ({} bytes)", filename, length);

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "_"));
    Ok((
        [
            (header::CONTENT_TYPE, "application/sql".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

pub async fn delete_backup(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<MessageResponse> {
    let request: FilenameRequest = parse_body(&body)?;
    let filename = required(request.filename, "Filename is required")?;

    state.backups.delete(&filename)?;
    Ok(Json(MessageResponse {
        success: format!("Backup {} deleted successfully!", filename),
    }))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<MutationResponse> {
    let request: RestoreBody = parse_body(&body)?;
    let filename = required(request.filename, "Filename is required")?;

    let target = if request.create_new {
        RestoreTarget::CreateNew(required(
            request.new_database_name,
            "New database name is required",
        )?)
    } else {
        RestoreTarget::Existing(required(
            request.target_database,
            "Target database is required",
        )?)
    };
    let target_name = match &target {
        RestoreTarget::Existing(name) | RestoreTarget::CreateNew(name) => name.clone(),
    };

    let request = RestoreRequest {
        filename: filename.clone(),
        target,
    };
    let databases = run_detached(async move {
        state
            .backups
            .restore(state.engine.as_ref(), &request)
            .await
    })
    .await?;

    Ok(Json(MutationResponse {
        success: format!(
            "Backup {} restored into '{}' successfully!",
            filename, target_name
        ),
        databases,
    }))
}

pub async fn clone_database(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<MutationResponse> {
    let request: CloneRequest = parse_body(&body)?;
    let missing = "Source and target database names are required";
    let source = required(request.source_database, missing)?;
    let target = required(request.target_database, missing)?;

    let (task_source, task_target) = (source.clone(), target.clone());
    let databases = run_detached(async move {
        state
            .backups
            .clone_database(state.engine.as_ref(), &task_source, &task_target)
            .await
    })
    .await?;

    Ok(Json(MutationResponse {
        success: format!("Database '{}' cloned to '{}' successfully!", source, target),
        databases,
    }))
}

pub async fn list_tables(
    State(state): State<AppState>,
    Path(database): Path<String>,
) -> ApiResult<TablesResponse> {
    let tables = browser::list_tables(state.engine.as_ref(), &database).await?;
    Ok(Json(TablesResponse {
        success: true,
        database,
        tables,
    }))
}

pub async fn table_structure(
    State(state): State<AppState>,
    Path((database, table)): Path<(String, String)>,
) -> ApiResult<StructureResponse> {
    let structure = browser::table_structure(state.engine.as_ref(), &database, &table).await?;
    Ok(Json(StructureResponse {
        success: true,
        database,
        table,
        columns: structure.columns,
        indexes: structure.indexes,
    }))
}

pub async fn table_data(
    State(state): State<AppState>,
    Path((database, table)): Path<(String, String)>,
    Query(query): Query<DataQuery>,
) -> ApiResult<DataResponse> {
    let page = PageRequest::new(
        query.page.and_then(|p| p.trim().parse().ok()),
        query.limit.and_then(|l| l.trim().parse().ok()),
    );

    let result = browser::table_data(state.engine.as_ref(), &database, &table, page).await?;
    Ok(Json(DataResponse {
        success: true,
        data: result.data,
        pagination: result.pagination,
    }))
}

pub async fn execute_query(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<QueryResponse> {
    let request: QueryRequest = parse_body(&body)?;
    let database = required(request.database, "Database name is required")?;
    let query = required(request.query, "Query is required")?;

    let outcome = browser::execute_query(state.engine.as_ref(), &database, &query).await?;
    Ok(Json(QueryResponse {
        success: true,
        results: outcome.results,
        row_count: outcome.row_count,
        execution_time: outcome.execution_time,
    }))
}
