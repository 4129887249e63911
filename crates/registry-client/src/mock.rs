//! Mock ManifestSource for unit testing
//!
//! Answers per endpoint location from an in-memory table and records every
//! location it was asked about, so tests can assert candidate order.

use crate::error::RegistryError;
use crate::resolver::Candidate;
use crate::source_trait::{ImageArchitectures, ManifestSource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned answer for one location
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Manifest advertising these architectures
    Architectures(Vec<String>),
    /// Network failure
    Unreachable,
    /// Unparseable manifest
    ManifestInvalid,
    /// Never answers within any reasonable timeout
    Hang,
}

/// Mock ManifestSource for testing
#[derive(Debug, Clone, Default)]
pub struct MockManifestSource {
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockManifestSource {
    /// Create a new mock with no configured locations (every call is unreachable)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the answer for `location` (`registry/repository`)
    #[must_use]
    pub fn with_response(self, location: &str, response: MockResponse) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(location.to_string(), response);
        }
        self
    }

    /// Shorthand for [`MockResponse::Architectures`]
    #[must_use]
    pub fn with_architectures(self, location: &str, architectures: &[&str]) -> Self {
        let archs = architectures.iter().map(|a| (*a).to_string()).collect();
        self.with_response(location, MockResponse::Architectures(archs))
    }

    /// Locations fetched so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ManifestSource for MockManifestSource {
    async fn fetch_architectures(&self, candidate: &Candidate) -> Result<ImageArchitectures, RegistryError> {
        let location = candidate.location();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(location.clone());
        }
        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(&location).cloned())
            .unwrap_or(MockResponse::Unreachable);

        match response {
            MockResponse::Architectures(archs) => Ok(ImageArchitectures {
                digest: format!("sha256:mock-{}", location.replace('/', "-")),
                architectures: archs.into_iter().collect(),
            }),
            MockResponse::Unreachable => Err(RegistryError::Unreachable {
                location,
                reason: "connection refused".to_string(),
            }),
            MockResponse::ManifestInvalid => Err(RegistryError::ManifestInvalid {
                image: candidate.reference.to_string(),
                reason: "unsupported media type".to_string(),
            }),
            MockResponse::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RegistryError::Unreachable {
                    location,
                    reason: "hung".to_string(),
                })
            }
        }
    }
}
