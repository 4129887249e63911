//! ManifestSource trait for mocking
//!
//! Abstracts the remote manifest protocol so the prober can be exercised
//! without a registry. The concrete [`crate::OciManifestSource`] implements
//! it over the OCI distribution API; tests use the in-memory mock.

use crate::error::RegistryError;
use crate::resolver::Candidate;
use std::collections::BTreeSet;

/// Architectures advertised by one image at one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArchitectures {
    /// Digest of the manifest (or index) that answered
    pub digest: String,
    /// Values of the `kubernetes.io/arch` vocabulary, e.g. `amd64`
    pub architectures: BTreeSet<String>,
}

/// Fetches architecture information for a single candidate endpoint
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ManifestSource: Send + Sync {
    /// Reads the manifest at `candidate` and extracts its architectures.
    ///
    /// A manifest list/index yields the union of its children's platform
    /// architectures; a single manifest yields the architecture of its
    /// image config.
    async fn fetch_architectures(&self, candidate: &Candidate) -> Result<ImageArchitectures, RegistryError>;
}
