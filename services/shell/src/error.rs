//! services/shell/src/error.rs
//!
//! Defines the primary error type for the shell service.

use crate::config::ConfigError;
use folklore_core::ports::PortError;

/// The primary error type for the `shell` service.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Maps a port failure onto the `(status, message)` pair handlers return.
pub fn port_error_response(e: PortError) -> (axum::http::StatusCode, String) {
    use axum::http::StatusCode;
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::Rejected(_) => StatusCode::BAD_REQUEST,
        PortError::Unauthorized => StatusCode::FORBIDDEN,
        PortError::Unexpected(_) => {
            tracing::error!("Unexpected port failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}
