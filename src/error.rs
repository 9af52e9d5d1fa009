//! Error types for SQLSandbox

use thiserror::Error;

use crate::sandbox::SandboxError;

/// Result type alias using SQLSandbox's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SQLSandbox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Sandbox subsystem error
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(_) => true,
            Error::Sandbox(e) => matches!(
                e,
                SandboxError::PortExhausted { .. } | SandboxError::ContainerNotReady { .. }
            ),
            Error::Config(_) => false,
        }
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::Sandbox(e) => e.is_client_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(Error::from(SandboxError::SqlValidation {
            reason: "nope".into()
        })
        .is_client_error());
        assert!(!Error::from(SandboxError::Internal {
            reason: "panic".into()
        })
        .is_client_error());
        assert!(!Error::Config("missing".into()).is_client_error());
    }

    #[test]
    fn test_retryable() {
        assert!(Error::from(SandboxError::PortExhausted { start: 1, end: 2 }).is_retryable());
        assert!(!Error::Config("x".into()).is_retryable());
    }

    #[test]
    fn test_sandbox_error_is_transparent() {
        let err = Error::from(SandboxError::ContainerNotFound {
            key: "student 1 / database 2".into(),
        });
        assert_eq!(err.to_string(), "No ready sandbox for student 1 / database 2");
    }
}
