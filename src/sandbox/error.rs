//! Error types for the sandbox subsystem.
//!
//! Every variant carries owned strings so a single creation outcome can be
//! cloned out to all callers waiting on the same sandbox key.

use std::fmt;

/// Stable category for an error reported by the sandbox database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Unique constraint violated (SQLSTATE 23505)
    DuplicateKey,
    /// Relation does not exist (SQLSTATE 42P01)
    UndefinedTable,
    /// Column does not exist (SQLSTATE 42703)
    UndefinedColumn,
    /// Foreign key constraint violated (SQLSTATE 23503)
    ForeignKeyViolation,
    /// Syntax error (SQLSTATE 42601)
    Syntax,
    /// Anything else; the engine's message is passed through
    Other,
}

impl QueryErrorKind {
    /// Map a PostgreSQL SQLSTATE code to a category.
    pub fn from_sqlstate(code: &str) -> Self {
        match code {
            "23505" => QueryErrorKind::DuplicateKey,
            "42P01" => QueryErrorKind::UndefinedTable,
            "42703" => QueryErrorKind::UndefinedColumn,
            "23503" => QueryErrorKind::ForeignKeyViolation,
            "42601" => QueryErrorKind::Syntax,
            _ => QueryErrorKind::Other,
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::DuplicateKey => write!(f, "duplicate key"),
            QueryErrorKind::UndefinedTable => write!(f, "missing relation"),
            QueryErrorKind::UndefinedColumn => write!(f, "missing column"),
            QueryErrorKind::ForeignKeyViolation => write!(f, "foreign key violation"),
            QueryErrorKind::Syntax => write!(f, "syntax error"),
            QueryErrorKind::Other => write!(f, "query failed"),
        }
    }
}

/// Errors that can occur while provisioning, querying, or reclaiming sandboxes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    /// No port in the configured range is both unreserved and bindable.
    #[error("No free port in range {start}-{end}")]
    PortExhausted { start: u16, end: u16 },

    /// The container runtime failed to create or start an instance.
    #[error("Runtime creation failed: {reason}")]
    RuntimeCreation { reason: String },

    /// Stop, remove, or list against the container runtime failed.
    #[error("Runtime error: {reason}")]
    Runtime { reason: String },

    /// Readiness polling exhausted its retry budget.
    #[error("Sandbox {name} not ready after {attempts} attempts")]
    ContainerNotReady { name: String, attempts: u32 },

    /// No ready sandbox exists for the requested key.
    #[error("No ready sandbox for {key}")]
    ContainerNotFound { key: String },

    /// A statement was rejected by the safety validator.
    #[error("SQL rejected: {reason}")]
    SqlValidation { reason: String },

    /// The sandbox engine rejected a statement.
    #[error("{kind}: {message}")]
    QueryExecution {
        kind: QueryErrorKind,
        message: String,
    },

    /// The exercise catalog could not supply the source database.
    #[error("Catalog error: {reason}")]
    Catalog { reason: String },

    /// Unexpected internal failure (e.g. a creation task panicked).
    #[error("Internal sandbox error: {reason}")]
    Internal { reason: String },
}

impl SandboxError {
    /// Validation and not-found errors are the caller's to fix.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SandboxError::SqlValidation { .. }
                | SandboxError::ContainerNotFound { .. }
                | SandboxError::QueryExecution { .. }
        )
    }

    /// Message safe to show to the caller. Server-side failures are reported
    /// generically; the full error stays in the logs.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "The SQL sandbox is temporarily unavailable. Please try again.".to_string()
        }
    }
}

impl From<sqlx::Error> for SandboxError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let kind = db_err
                    .code()
                    .map(|code| QueryErrorKind::from_sqlstate(&code))
                    .unwrap_or(QueryErrorKind::Other);
                SandboxError::QueryExecution {
                    kind,
                    message: db_err.message().to_string(),
                }
            }
            // Transport and protocol failures are not the student's SQL
            _ => SandboxError::Runtime {
                reason: format!("Sandbox connection failed: {}", err),
            },
        }
    }
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
