//! Controller-specific error types.

use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the pod placement controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Every candidate registry was unavailable; the pod will be retried
    #[error("Registry unavailable for {pod} (attempt {attempt}): {reason}")]
    RegistryTransient { pod: String, attempt: u32, reason: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// HTTP listener error
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
