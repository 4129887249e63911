//! Registry client errors

use thiserror::Error;

/// Errors that can occur while resolving or probing an image
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registry could not be reached, answered with a server error, or refused credentials
    #[error("Registry unreachable at {location}: {reason}")]
    Unreachable { location: String, reason: String },

    /// Registry call exceeded its time budget
    #[error("Registry call to {location} timed out after {seconds}s")]
    Timeout { location: String, seconds: u64 },

    /// Cluster image policy forbids contacting the registry
    #[error("Registry policy denied {image}: {reason}")]
    PolicyDenied { image: String, reason: String },

    /// Manifest (or image config) could not be interpreted
    #[error("Invalid manifest for {image}: {reason}")]
    ManifestInvalid { image: String, reason: String },

    /// Image reference could not be parsed
    #[error("Invalid image reference {0:?}: {1}")]
    InvalidReference(String, String),

    /// Pull secret payload could not be decoded
    #[error("Invalid pull secret: {0}")]
    PullSecret(String),
}

/// Classification used by the prober and the gated pod reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeFailure {
    /// Retry against the next candidate, then against the whole pod
    Unreachable,
    /// Fatal for the image, never retried
    PolicyDenied,
    /// Fatal for the image, contributes an empty architecture set
    ManifestInvalid,
}

impl ProbeFailure {
    /// Label value for metrics and events
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::PolicyDenied => "policy-denied",
            Self::ManifestInvalid => "manifest-invalid",
        }
    }
}

impl RegistryError {
    /// Failure class of this error
    #[must_use]
    pub fn failure(&self) -> ProbeFailure {
        match self {
            Self::Unreachable { .. } | Self::Timeout { .. } => ProbeFailure::Unreachable,
            Self::PolicyDenied { .. } => ProbeFailure::PolicyDenied,
            Self::ManifestInvalid { .. } | Self::InvalidReference(..) | Self::PullSecret(_) => {
                ProbeFailure::ManifestInvalid
            }
        }
    }

    /// Whether another candidate (or a later attempt) may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.failure() == ProbeFailure::Unreachable
    }
}
