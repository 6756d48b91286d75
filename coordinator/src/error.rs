//! Coordinator-specific error types

use shared::SharedError;
use std::time::Duration;
use supervisor::SupervisorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Configuration error: {field}: {reason}")]
    ConfigurationError { field: String, reason: String },

    #[error("SwarmUI not ready after {}s", .ceiling.as_secs())]
    StartupTimeout { ceiling: Duration },

    #[error("Backend process exited before becoming ready (exit code {code:?})")]
    BackendExited { code: Option<i32> },

    #[error("Failed to create session: {0}")]
    SessionFailed(#[source] SupervisorError),

    #[error("HTTP server startup failed on {addr}: {message}")]
    ServerStartupFailed { addr: String, message: String },

    #[error("{0}")]
    SharedError(#[from] SharedError),

    #[error("{0}")]
    Supervisor(#[from] SupervisorError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoordinatorError {
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        CoordinatorError::ConfigurationError {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
