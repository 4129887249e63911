//! Registry Access and Image Architecture Probing
//!
//! Resolves an image reference into the ordered registry endpoints the
//! cluster image policy allows (mirrors, insecure/blocked/allowed lists,
//! trusted CAs, pull secrets) and probes them for the CPU architectures the
//! image supports.
//!
//! # Example
//!
//! ```no_run
//! use registry_client::{ArchitectureProber, OciManifestSource, ProberConfig, PullSecrets, RegistryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = ArchitectureProber::new(OciManifestSource::new(), ProberConfig::default());
//!
//! let policy = RegistryPolicy {
//!     blocked: vec!["untrusted.example.com".to_string()],
//!     ..Default::default()
//! };
//! let secrets = PullSecrets::from_docker_config_json(br#"{"auths":{}}"#)?;
//!
//! let resolved = prober.probe_image("quay.io/openshift/origin-cli:latest", &policy, &secrets).await?;
//! println!("{} via {}: {:?}", resolved.digest, resolved.endpoint, resolved.architectures);
//! # Ok(())
//! # }
//! ```
//!
//! # Failure classes
//!
//! - **Unreachable**: tried against the next candidate, then reported as transient
//! - **PolicyDenied**: fatal for the image, never retried
//! - **ManifestInvalid**: fatal for the image

pub mod cache;
pub mod client;
pub mod credentials;
pub mod error;
pub mod policy;
pub mod prober;
pub mod reference;
pub mod resolver;
#[path = "trait.rs"]
pub mod source_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use cache::{ArchitectureCache, ResolvedArchitectures};
pub use client::OciManifestSource;
pub use credentials::{Credentials, PullSecrets};
pub use error::{ProbeFailure, RegistryError};
pub use policy::{MirrorRule, MirrorSourcePolicy, RegistryPolicy, TlsPolicy};
pub use prober::{ArchitectureProber, ProberConfig};
pub use reference::ImageReference;
pub use resolver::{Candidate, resolve};
pub use source_trait::{ImageArchitectures, ManifestSource};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockManifestSource, MockResponse};
