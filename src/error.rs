//! Error types for rune-gc

use thiserror::Error;

/// Result type for rune-gc operations
pub type Result<T> = std::result::Result<T, GcError>;

/// rune-gc error types
#[derive(Error, Debug)]
pub enum GcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Docker API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed timestamp in {field}: {value:?}")]
    MalformedTimestamp { field: String, value: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),
}

impl GcError {
    /// The runtime refused because the resource is in use
    pub fn is_conflict(&self) -> bool {
        matches!(self, GcError::Conflict(_))
    }

    /// The runtime does not know the resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, GcError::NotFound(_))
    }

    pub(crate) fn malformed_timestamp(field: impl Into<String>, value: impl Into<String>) -> Self {
        GcError::MalformedTimestamp {
            field: field.into(),
            value: value.into(),
        }
    }
}
