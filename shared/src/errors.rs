//! Shared error types for the worker coordinator

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("No input provided")]
    EmptyInput,

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Unknown action: {action}")]
    UnknownAction { action: String },
}

impl SharedError {
    pub fn missing(field: &str) -> Self {
        Self::MissingField { field: field.to_string() }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
