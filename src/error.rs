// ABOUTME: Error taxonomy shared by every panel operation
// ABOUTME: Maps validation, lookup and operational failures to stable kinds

use thiserror::Error;

/// Result alias for panel operations
pub type PanelResult<T> = std::result::Result<T, PanelError>;

/// Failure kinds surfaced by panel operations.
///
/// Validation kinds (`InvalidInput`, `AlreadyExists`, `Conflict`, `Protected`,
/// `NotFound`) are always produced before anything is mutated. Engine and tool
/// diagnostics are carried verbatim inside `OperationFailed`.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Protected(String),

    #[error("{0}")]
    OperationFailed(String),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl PanelError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(message.into())
    }

    /// Short machine-friendly name of the kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Conflict(_) => "conflict",
            Self::Protected(_) => "protected",
            Self::OperationFailed(_) => "operation_failed",
            Self::Internal(_) => "internal",
        }
    }
}
