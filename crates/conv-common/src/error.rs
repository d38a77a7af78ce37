//! Error types for the convolution client.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using ConvError.
pub type ConvResult<T> = Result<T, ConvError>;

/// Primary error type for request construction and transport.
#[derive(Debug, Error)]
pub enum ConvError {
    // === Configuration Errors ===
    #[error("Missing mandatory field: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid value for '{field}': {message}")]
    ConfigurationInvalid { field: String, message: String },

    // === Request Construction Errors ===
    #[error("Expected response size {expected} exceeds the limit of {limit} bytes")]
    RequestTooLarge { expected: u64, limit: u64 },

    #[error("Matrix '{name}' needs {expected} values, got {actual}")]
    MatrixShape {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Matrix '{name}': '{value}' is not a number")]
    InvalidValue { name: String, value: String },

    #[error("Input closed before matrix '{name}' was complete")]
    InputClosed { name: String },

    #[error("Failed to read values for matrix '{name}': {source}")]
    Input {
        name: String,
        source: std::io::Error,
    },

    // === Transport Errors ===
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("{message}: {details:?}")]
    Remote {
        message: String,
        details: Vec<String>,
    },

    #[error("Response of {size} bytes exceeds the limit of {limit} bytes")]
    ResponseTooLarge { size: u64, limit: u64 },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Coarse classification of errors by how they are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Mandatory field absent; terminates the process.
    ConfigurationMissing,
    /// Bad caller input.
    ConfigurationInvalid,
    /// Predicted response would not fit the transport.
    RequestTooLarge,
    /// Timeout, connection or remote error.
    TransportFailure,
}

impl ConvError {
    /// Get the handling category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvError::ConfigurationMissing(_) => ErrorKind::ConfigurationMissing,

            ConvError::ConfigurationInvalid { .. }
            | ConvError::MatrixShape { .. }
            | ConvError::InvalidValue { .. }
            | ConvError::InputClosed { .. }
            | ConvError::Input { .. } => ErrorKind::ConfigurationInvalid,

            ConvError::RequestTooLarge { .. } => ErrorKind::RequestTooLarge,

            ConvError::Timeout(_)
            | ConvError::Connection(_)
            | ConvError::Remote { .. }
            | ConvError::ResponseTooLarge { .. }
            | ConvError::Decode(_) => ErrorKind::TransportFailure,
        }
    }

    /// Whether the error terminates the whole run rather than one lifecycle.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::ConfigurationMissing
    }
}

impl From<serde_json::Error> for ConvError {
    fn from(err: serde_json::Error) -> Self {
        ConvError::Decode(err.to_string())
    }
}
