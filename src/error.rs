//! Error types for the GCS source operator
//!
//! Every variant is retryable: the controller hands the error back to the
//! work queue, which redrives the key.

use std::time::Duration;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur during operator operations
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    /// Remote object absent
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Sink reference could not be turned into a URI
    #[error("Sink resolution failed: {0}")]
    ResolutionFailed(String),

    /// Network, auth or server-side failure talking to an external API
    #[error("Transport error: {0}")]
    Transport(String),

    /// Optimistic-concurrency or already-exists failure
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The reconcile pass exceeded its deadline
    #[error("Reconciliation timed out after {0:?}")]
    Timeout(Duration),

    /// Reconciliation reached a state it cannot act on
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeApi(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Work queue key that does not name a namespaced object
    #[error("Invalid resource key: {0:?}")]
    InvalidKey(String),
}

impl OperatorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperatorError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::Conflict(_))
    }
}

impl From<kube::Error> for OperatorError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => OperatorError::NotFound(ae.message),
            kube::Error::Api(ae) if ae.code == 409 => OperatorError::Conflict(ae.message),
            other => OperatorError::KubeApi(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for OperatorError {
    fn from(err: reqwest::Error) -> Self {
        OperatorError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::Serialization(err.to_string())
    }
}
