//! Pull secret handling
//!
//! Parses `.dockerconfigjson` and legacy `.dockercfg` payloads and selects
//! credentials for a location by longest-prefix match. Pod-level secrets
//! and the cluster-wide pull secret are merged; on identical keys the
//! pod-level entry wins.

use crate::error::RegistryError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Username/password pair for one registry scope
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DockerConfigJson {
    #[serde(default)]
    auths: BTreeMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Merged credentials keyed by normalized registry scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSecrets {
    entries: BTreeMap<String, Credentials>,
}

impl PullSecrets {
    /// Parses a `.dockerconfigjson` payload (`{"auths": {...}}`).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PullSecret`] when the JSON is malformed.
    pub fn from_docker_config_json(raw: &[u8]) -> Result<Self, RegistryError> {
        let config: DockerConfigJson =
            serde_json::from_slice(raw).map_err(|e| RegistryError::PullSecret(e.to_string()))?;
        Ok(Self::from_entries(config.auths))
    }

    /// Parses a legacy `.dockercfg` payload (the `auths` map without its wrapper).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PullSecret`] when the JSON is malformed.
    pub fn from_docker_cfg(raw: &[u8]) -> Result<Self, RegistryError> {
        let auths: BTreeMap<String, DockerAuthEntry> =
            serde_json::from_slice(raw).map_err(|e| RegistryError::PullSecret(e.to_string()))?;
        Ok(Self::from_entries(auths))
    }

    fn from_entries(auths: BTreeMap<String, DockerAuthEntry>) -> Self {
        let entries = auths
            .into_iter()
            .filter_map(|(key, entry)| {
                let credentials = decode_entry(&entry)?;
                Some((normalize_key(&key), credentials))
            })
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { entries }
    }

    /// Adds `other`, keeping existing entries on identical keys.
    pub fn merge_lower_priority(&mut self, other: Self) {
        for (key, credentials) in other.entries {
            self.entries.entry(key).or_insert(credentials);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Credentials whose scope is the longest prefix of `location`
    #[must_use]
    pub fn lookup(&self, location: &str) -> Option<&Credentials> {
        self.entries
            .iter()
            .filter(|(scope, _)| {
                location == scope.as_str() || location.strip_prefix(scope.as_str()).is_some_and(|r| r.starts_with('/'))
            })
            .max_by_key(|(scope, _)| scope.len())
            .map(|(_, credentials)| credentials)
    }
}

fn decode_entry(entry: &DockerAuthEntry) -> Option<Credentials> {
    if let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        let decoded = STANDARD.decode(auth.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        return Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
    }
    match (&entry.username, &entry.password) {
        (Some(username), Some(password)) => Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

/// Strips scheme, trailing slashes and the Docker Hub v1 index path.
fn normalize_key(key: &str) -> String {
    let key = key
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let key = key.strip_suffix("/v1").or_else(|| key.strip_suffix("/v2")).unwrap_or(key);
    match key {
        "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com" => "docker.io".to_string(),
        _ => key
            .strip_prefix("index.docker.io/")
            .map_or_else(|| key.to_string(), |rest| format!("docker.io/{rest}")),
    }
}
