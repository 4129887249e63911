//! Cluster-wide registry policy
//!
//! A plain-data snapshot of the insecure/blocked/allowed registry lists,
//! mirror rules and additional trusted CAs. Built fresh for every resolution;
//! never mutated by this crate.

use std::collections::BTreeMap;

/// Whether the source location may be contacted after its mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MirrorSourcePolicy {
    /// Source is appended as the last fallback
    #[default]
    AllowContactingSource,
    /// Source is never contacted
    NeverContactSource,
}

/// One mirror rule: a source scope and its mirrors, tried in order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MirrorRule {
    pub source: String,
    pub mirrors: Vec<String>,
    pub source_policy: MirrorSourcePolicy,
}

/// TLS handling for one candidate endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TlsPolicy {
    /// System trust roots
    Verify,
    /// Registry listed as insecure: certificates not verified
    Insecure,
    /// System roots plus an extra PEM bundle for this host
    CustomCa(String),
}

/// Snapshot of the cluster image registry policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryPolicy {
    pub insecure: Vec<String>,
    pub blocked: Vec<String>,
    /// Empty means every registry is allowed
    pub allowed: Vec<String>,
    /// Applied to digest references only
    pub digest_mirrors: Vec<MirrorRule>,
    /// Applied to tag references only
    pub tag_mirrors: Vec<MirrorRule>,
    /// Registry host (`host` or `host:port`) to PEM bundle
    pub trusted_cas: BTreeMap<String, String>,
}

impl RegistryPolicy {
    /// Whether `location` falls under a blocked scope
    #[must_use]
    pub fn is_blocked(&self, location: &str) -> bool {
        self.blocked.iter().any(|scope| scope_matches(scope, location))
    }

    /// Whether `location` may be contacted under the allowed list
    #[must_use]
    pub fn is_allowed(&self, location: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|scope| scope_matches(scope, location))
    }

    /// TLS handling for a candidate at `location`
    #[must_use]
    pub fn tls_for(&self, location: &str) -> TlsPolicy {
        if self.insecure.iter().any(|scope| scope_matches(scope, location)) {
            return TlsPolicy::Insecure;
        }
        let host = host_of(location);
        match self.trusted_cas.get(host) {
            Some(pem) => TlsPolicy::CustomCa(pem.clone()),
            None => TlsPolicy::Verify,
        }
    }

    /// Inserts a CA bundle from a trusted-CA ConfigMap entry.
    ///
    /// Keys use `host..port` for registries on a non-default port.
    pub fn add_trusted_ca(&mut self, key: &str, pem: impl Into<String>) {
        self.trusted_cas.insert(key.replacen("..", ":", 1), pem.into());
    }
}

/// Host (with port) part of a `registry/repository` location
#[must_use]
pub fn host_of(location: &str) -> &str {
    location.split_once('/').map_or(location, |(host, _)| host)
}

/// Whether a registry scope covers `location`.
///
/// Scopes are a host, a `host/path` prefix matched on path-component
/// boundaries, or a `*.domain` wildcard matching any subdomain host.
#[must_use]
pub fn scope_matches(scope: &str, location: &str) -> bool {
    let scope = scope.trim_end_matches('/');
    if let Some(domain) = scope.strip_prefix("*.") {
        let host = host_of(location);
        let host = host.split_once(':').map_or(host, |(h, _)| h);
        return host.len() > domain.len() + 1 && host.ends_with(domain) && host[..host.len() - domain.len()].ends_with('.');
    }
    location == scope || location.strip_prefix(scope).is_some_and(|rest| rest.starts_with('/'))
}

/// Length of the scope used to rank competing matches (wildcards rank lowest)
pub(crate) fn scope_specificity(scope: &str) -> usize {
    if scope.starts_with("*.") { 0 } else { scope.trim_end_matches('/').len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_matches_path_boundaries() {
        assert!(scope_matches("quay.io", "quay.io/app/api"));
        assert!(scope_matches("quay.io/app", "quay.io/app/api"));
        assert!(scope_matches("quay.io/app/api", "quay.io/app/api"));
        assert!(!scope_matches("quay.io/ap", "quay.io/app/api"));
        assert!(!scope_matches("quay.io", "quay.iox/app"));
    }

    #[test]
    fn test_wildcard_scope_matches_subdomains_only() {
        assert!(scope_matches("*.example.com", "reg.example.com/team/app"));
        assert!(scope_matches("*.example.com", "a.b.example.com:5000/x"));
        assert!(!scope_matches("*.example.com", "example.com/team/app"));
        assert!(!scope_matches("*.example.com", "badexample.com/app"));
    }

    #[test]
    fn test_allowed_list_empty_allows_everything() {
        let mut policy = RegistryPolicy::default();
        assert!(policy.is_allowed("docker.io/library/nginx"));
        policy.allowed = vec!["quay.io".to_string()];
        assert!(policy.is_allowed("quay.io/app"));
        assert!(!policy.is_allowed("docker.io/library/nginx"));
    }

    #[test]
    fn test_tls_for_insecure_and_custom_ca() {
        let mut policy = RegistryPolicy {
            insecure: vec!["registry.local:5000".to_string()],
            ..Default::default()
        };
        policy.add_trusted_ca("internal.example.com..8443", "PEM");

        assert_eq!(policy.tls_for("registry.local:5000/app"), TlsPolicy::Insecure);
        assert_eq!(
            policy.tls_for("internal.example.com:8443/app"),
            TlsPolicy::CustomCa("PEM".to_string())
        );
        assert_eq!(policy.tls_for("quay.io/app"), TlsPolicy::Verify);
    }
}
