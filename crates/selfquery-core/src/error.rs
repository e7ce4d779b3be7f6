use std::fmt;

use thiserror::Error;

/// One document of a batch that the backend refused to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItemFailure {
    /// Position of the document in the caller's input.
    pub index: usize,
    pub id: String,
    pub reason: String,
}

impl fmt::Display for BatchItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}): {}", self.index, self.id, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Could not parse translator output: {reason}")]
    TranslationParse { reason: String, output: String },

    #[error("Filter references undeclared attribute '{attribute}'")]
    UnknownAttribute { attribute: String },

    #[error("Invalid limit {limit}: must be a positive integer")]
    InvalidLimit { limit: i64 },

    #[error("Invalid k {k}: must be a positive integer")]
    InvalidK { k: usize },

    #[error("Invalid filter: {reason}")]
    InvalidFilter { reason: String },

    #[error("Request to {service} failed{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    BackendRequest {
        service: String,
        status: Option<u16>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Index not found: {name}")]
    IndexNotFound { name: String },

    #[error("{} of the batch failed: {}", .failures.len(), join_failures(.failures))]
    PartialBatchFailure { failures: Vec<BatchItemFailure> },

    #[error("Embedding failed: {reason}")]
    Embedding { reason: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

fn join_failures(failures: &[BatchItemFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Transport-level failure with no HTTP status attached.
    pub fn backend<E>(service: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::BackendRequest {
            service: service.into(),
            status: None,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Non-success response from a remote service.
    pub fn backend_status(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::BackendRequest {
            service: service.into(),
            status: Some(status),
            message: message.into(),
            source: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
