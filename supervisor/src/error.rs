//! Supervisor-specific error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn backend process: {message}")]
    SpawnFailed { message: String },

    #[error("Backend process is not running")]
    NotRunning,

    #[error("Backend unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("Request to {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    #[error("Request failed: {message}")]
    Transport { message: String },

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed backend response: {message}")]
    MalformedResponse { message: String },

    #[error("Invalid backend path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::SpawnFailed { message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse { message: message.into() }
    }

    /// Classify a reqwest failure against the URL it targeted
    pub fn from_reqwest(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else if err.is_connect() {
            Self::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Transport { message: err.to_string() }
        }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
