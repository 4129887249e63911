//! Process configuration
//!
//! Read once at startup from environment variables. Runtime configuration
//! lives in the placement CRDs.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settings of the running controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Admission webhook listener
    pub webhook_bind_addr: SocketAddr,
    /// Directory holding `tls.crt` / `tls.key` for the webhook listener
    pub webhook_cert_dir: PathBuf,
    /// Probes and metrics listener
    pub metrics_bind_addr: SocketAddr,
    /// Namespace the controller runs in; never subject to placement
    pub operator_namespace: String,
    /// `namespace/name` of the cluster-wide pull secret
    pub global_pull_secret: (String, String),
    /// Namespace of the additional trusted CA ConfigMap
    pub trusted_ca_namespace: String,
    /// Budget for a single registry call
    pub registry_timeout: Duration,
    /// Registry endpoints tried per image
    pub max_candidates_per_image: usize,
    /// Transient failures tolerated per pod before giving up
    pub max_resolution_attempts: u32,
    /// Age after which a gated pod is released unconditionally
    pub max_gated: Duration,
    /// Concurrent gated pod reconciliations
    pub reconcile_concurrency: u16,
    /// Lifetime of architecture cache entries
    pub arch_cache_ttl: Duration,
}

impl ControllerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// [`ControllerError::InvalidConfig`] when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// [`ControllerError::InvalidConfig`] when a value is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let global_pull_secret = lookup("GLOBAL_PULL_SECRET").unwrap_or_else(|| "openshift-config/pull-secret".to_string());
        let global_pull_secret = global_pull_secret
            .split_once('/')
            .filter(|(ns, name)| !ns.is_empty() && !name.is_empty())
            .map(|(ns, name)| (ns.to_string(), name.to_string()))
            .ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "GLOBAL_PULL_SECRET must be <namespace>/<name>, got {global_pull_secret:?}"
                ))
            })?;

        let config = Self {
            webhook_bind_addr: parse(&lookup, "WEBHOOK_BIND_ADDR", "0.0.0.0:9443")?,
            webhook_cert_dir: lookup("WEBHOOK_CERT_DIR")
                .unwrap_or_else(|| "/var/run/manager/tls".to_string())
                .into(),
            metrics_bind_addr: parse(&lookup, "METRICS_BIND_ADDR", "0.0.0.0:8080")?,
            operator_namespace: lookup("OPERATOR_NAMESPACE")
                .unwrap_or_else(|| "openshift-multiarch-tuning-operator".to_string()),
            global_pull_secret,
            trusted_ca_namespace: lookup("TRUSTED_CA_NAMESPACE").unwrap_or_else(|| "openshift-config".to_string()),
            registry_timeout: Duration::from_secs(parse(&lookup, "REGISTRY_TIMEOUT_SECONDS", "10")?),
            max_candidates_per_image: parse(&lookup, "MAX_CANDIDATES_PER_IMAGE", "8")?,
            max_resolution_attempts: parse(&lookup, "MAX_RESOLUTION_ATTEMPTS", "6")?,
            max_gated: Duration::from_secs(parse(&lookup, "MAX_GATED_SECONDS", "600")?),
            reconcile_concurrency: parse(&lookup, "RECONCILE_CONCURRENCY", "8")?,
            arch_cache_ttl: Duration::from_secs(parse(&lookup, "ARCH_CACHE_TTL_SECONDS", "300")?),
        };

        if config.max_resolution_attempts == 0 || config.reconcile_concurrency == 0 || config.max_candidates_per_image == 0 {
            return Err(ControllerError::InvalidConfig(
                "MAX_RESOLUTION_ATTEMPTS, RECONCILE_CONCURRENCY and MAX_CANDIDATES_PER_IMAGE must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.webhook_bind_addr.port(), 9443);
        assert_eq!(config.metrics_bind_addr.port(), 8080);
        assert_eq!(config.global_pull_secret, ("openshift-config".to_string(), "pull-secret".to_string()));
        assert_eq!(config.max_resolution_attempts, 6);
        assert_eq!(config.max_gated, Duration::from_secs(600));
        assert_eq!(config.registry_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("OPERATOR_NAMESPACE", "placement"),
            ("GLOBAL_PULL_SECRET", "kube-system/global"),
            ("MAX_RESOLUTION_ATTEMPTS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.operator_namespace, "placement");
        assert_eq!(config.global_pull_secret.1, "global");
        assert_eq!(config.max_resolution_attempts, 3);
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(ControllerConfig::from_lookup(lookup(&[("REGISTRY_TIMEOUT_SECONDS", "ten")])).is_err());
        assert!(ControllerConfig::from_lookup(lookup(&[("GLOBAL_PULL_SECRET", "no-slash")])).is_err());
        assert!(ControllerConfig::from_lookup(lookup(&[("RECONCILE_CONCURRENCY", "0")])).is_err());
    }
}
