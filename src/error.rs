use thiserror::Error;

/// Errors escaping the engine surface.
///
/// Domain-content problems never take this path: a document that fails
/// validation is a first-class [`ValidationResult`](crate::ValidationResult),
/// not an error. This enum covers malformed configuration, unknown definition
/// keys, oversized batches and unexpected internal faults.
#[derive(Error, Debug)]
pub enum ValidationEngineError {
    /// Malformed schema or overlay detected at load time. Fatal to the
    /// load/reload operation; never surfaced per-document.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The requested resource type, profile or value set has no definition.
    #[error("Definition not found: {key}")]
    NotFound { key: String },

    /// Batch exceeded the configured maximum item count. No per-item
    /// processing was performed.
    #[error("Batch of {actual} items exceeds the configured maximum of {limit}")]
    BatchLimitExceeded { actual: usize, limit: usize },

    /// Unexpected internal failure with no per-item result to carry it.
    #[error("Internal engine fault: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, ValidationEngineError>;

impl ValidationEngineError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn batch_limit_exceeded(actual: usize, limit: usize) -> Self {
        Self::BatchLimitExceeded { actual, limit }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error indicates a missing definition rather than a
    /// configuration or infrastructure fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
