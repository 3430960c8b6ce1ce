// ABOUTME: HTTP API for the panel: router, shared state, auth middleware, error mapping
// ABOUTME: Every /api route except /api/auth requires the shared secret

mod handlers;

use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{Credential, ServerInfo};
use crate::backup::BackupManager;
use crate::config::{DatabaseConfig, GrantSyntax};
use crate::engine::Engine;
use crate::error::{PanelError, PanelResult};

/// Largest request body the API buffers
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Header carrying the shared secret
pub const PASSWORD_HEADER: &str = "x-password";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn Engine>,
    pub backups: Arc<BackupManager>,
    pub credential: Credential,
    /// The panel's own MySQL account, used for grants and shown to clients
    pub account: DatabaseConfig,
    pub grant_syntax: GrantSyntax,
}

impl AppState {
    fn server_info(&self) -> ServerInfo {
        ServerInfo::from(&self.account)
    }
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        let status = match &self {
            PanelError::Unauthorized => StatusCode::UNAUTHORIZED,
            PanelError::InvalidInput(_)
            | PanelError::AlreadyExists(_)
            | PanelError::Protected(_) => StatusCode::BAD_REQUEST,
            PanelError::NotFound(_) => StatusCode::NOT_FOUND,
            PanelError::Conflict(_) => StatusCode::CONFLICT,
            PanelError::OperationFailed(_) | PanelError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", self.kind(), self);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.kind(), self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/databases",
            get(handlers::list_databases)
                .post(handlers::create_database)
                .delete(handlers::drop_database),
        )
        .route("/api/privileges", post(handlers::grant_privileges))
        .route("/api/backup-database", post(handlers::backup_database))
        .route("/api/backup-all-databases", post(handlers::backup_all_databases))
        .route("/api/list-backups", get(handlers::list_backups))
        .route("/api/download-backup", post(handlers::download_backup))
        .route("/api/delete-backup", post(handlers::delete_backup))
        .route("/api/restore-backup", post(handlers::restore_backup))
        .route("/api/clone-database", post(handlers::clone_database))
        .route("/api/database/:database/tables", get(handlers::list_tables))
        .route(
            "/api/database/:database/table/:table/structure",
            get(handlers::table_structure),
        )
        .route(
            "/api/database/:database/table/:table/data",
            get(handlers::table_data),
        )
        .route("/api/query", post(handlers::execute_query))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_secret,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth", post(handlers::authenticate))
        .merge(protected)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Span for one HTTP request; the query string is left out because it may
/// carry the secret
fn request_span(request: &Request) -> tracing::Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!(
        "MySQL panel listening on http://{}",
        listener.local_addr().context("Listener has no local address")?
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down");
            }
        })
        .await
        .context("HTTP server failed")
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
struct PasswordQuery {
    password: Option<String>,
}

/// Secret presented with a request: header first, then query string, then
/// the `password` field of a JSON body
fn presented_secret(request: &Request, body: &[u8]) -> Option<String> {
    if let Some(value) = request.headers().get(PASSWORD_HEADER) {
        return value.to_str().ok().map(str::to_string);
    }

    if let Ok(Query(query)) = Query::<PasswordQuery>::try_from_uri(request.uri()) {
        if query.password.is_some() {
            return query.password;
        }
    }

    serde_json::from_slice::<serde_json::Value>(body)
        .ok()?
        .get("password")?
        .as_str()
        .map(str::to_string)
}

/// Middleware rejecting requests without the shared secret
///
/// The body is buffered so the `password` field can be read, then handed on
/// unchanged.
async fn require_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, PanelError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| PanelError::invalid("Request body is too large"))?;
    let request = Request::from_parts(parts, Body::from(bytes.clone()));

    let secret = presented_secret(&request, &bytes).unwrap_or_default();
    if !state.credential.verify(&secret).await {
        tracing::warn!(
            "Rejected unauthenticated request to {}",
            request.uri().path()
        );
        return Err(PanelError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Parse an optional JSON body; an empty body is all-defaults
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, PanelError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| PanelError::invalid(format!("Invalid JSON body: {}", e)))
}

/// Run a workflow on its own task and wait for it
///
/// Dropping the request (client disconnect) only drops the wait; the
/// workflow still completes, including its cleanup and rollback steps.
async fn run_detached<T, F>(operation: F) -> PanelResult<T>
where
    T: Send + 'static,
    F: Future<Output = PanelResult<T>> + Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| PanelError::Internal(anyhow::anyhow!("Background task failed: {}", e)))?
}

/// A required, non-blank string field
fn required(value: Option<String>, message: &str) -> Result<String, PanelError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PanelError::invalid(message)),
    }
}
