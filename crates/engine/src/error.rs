//! Error types for the visual regression engine

use thiserror::Error;

/// Result type alias using the engine error
pub type Result<T> = std::result::Result<T, VisregError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum VisregError {
    #[error("Rendering surface unavailable during {operation}: {reason}")]
    SurfaceUnavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Dimension mismatch{}: baseline is {baseline}, current is {current}", for_name(.name))]
    DimensionMismatch {
        name: Option<String>,
        baseline: Dimensions,
        current: Dimensions,
    },

    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    #[error("Baseline '{name}' is in use by another operation")]
    BaselineWriteConflict { name: String },

    #[error("Invalid test name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("Storage error during {operation} of '{key}': {source}")]
    Storage {
        operation: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image codec error ({context}): {source}")]
    Codec {
        context: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Baseline metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Width and height of a buffer, reported in dimension errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn for_name(name: &Option<String>) -> String {
    name.as_deref()
        .map(|n| format!(" for '{}'", n))
        .unwrap_or_default()
}

/// Coarse classification of [`VisregError`] for callers that branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Capture,
    DimensionMismatch,
    Contract,
    Conflict,
    InvalidInput,
    NotFound,
    Storage,
    Internal,
}

impl VisregError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VisregError::SurfaceUnavailable { .. } | VisregError::ElementNotFound { .. } => {
                ErrorKind::Capture
            }
            VisregError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            VisregError::InvalidBuffer(_) => ErrorKind::Contract,
            VisregError::BaselineWriteConflict { .. } => ErrorKind::Conflict,
            VisregError::InvalidName { .. } | VisregError::InvalidRequest(_) => {
                ErrorKind::InvalidInput
            }
            VisregError::BaselineNotFound(_) => ErrorKind::NotFound,
            VisregError::Storage { .. } | VisregError::Codec { .. } | VisregError::Metadata(_) => {
                ErrorKind::Storage
            }
            VisregError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the whole operation may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Attach the test name to an error raised below the coordinator
    pub(crate) fn for_test(self, test: &str) -> Self {
        match self {
            VisregError::DimensionMismatch { name: None, baseline, current } => {
                VisregError::DimensionMismatch {
                    name: Some(test.to_string()),
                    baseline,
                    current,
                }
            }
            VisregError::Codec { context, source } => VisregError::Codec {
                context: format!("{} of '{}'", context, test),
                source,
            },
            other => other,
        }
    }

    pub(crate) fn storage(operation: &'static str, key: &str, source: std::io::Error) -> Self {
        VisregError::Storage {
            operation,
            key: key.to_string(),
            source,
        }
    }
}
