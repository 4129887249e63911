//! Registry Access Resolver
//!
//! Turns one image reference into the ordered list of endpoints worth
//! asking for its manifest. Pure: no network calls happen here.

use crate::credentials::{Credentials, PullSecrets};
use crate::error::RegistryError;
use crate::policy::{MirrorRule, MirrorSourcePolicy, RegistryPolicy, TlsPolicy, scope_matches, scope_specificity};
use crate::reference::ImageReference;
use tracing::trace;

/// One endpoint to try, in resolver order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    /// Reference rewritten to this endpoint's location
    pub reference: ImageReference,
    pub credentials: Option<Credentials>,
    pub tls: TlsPolicy,
    /// False for mirrors
    pub is_source: bool,
}

impl Candidate {
    /// `registry/repository` of the endpoint
    #[must_use]
    pub fn location(&self) -> String {
        self.reference.location()
    }
}

/// Resolves `image` into an ordered candidate list.
///
/// Mirrors of the most specific matching source scope come first, in
/// declaration order; the source follows unless a matching rule says
/// `NeverContactSource`. Digest references use digest mirrors, tag
/// references tag mirrors.
///
/// # Errors
///
/// [`RegistryError::PolicyDenied`] when a candidate is blocked, when the
/// allowed list leaves no candidate, or when the source may not be
/// contacted and no mirror is configured.
pub fn resolve(
    image: &ImageReference,
    policy: &RegistryPolicy,
    secrets: &PullSecrets,
) -> Result<Vec<Candidate>, RegistryError> {
    let location = image.location();
    let rules = if image.is_digest() { &policy.digest_mirrors } else { &policy.tag_mirrors };
    let (mirror_locations, contact_source) = mirror_locations(&location, rules);

    let mut locations: Vec<(String, bool)> = mirror_locations.into_iter().map(|l| (l, false)).collect();
    if contact_source {
        locations.push((location.clone(), true));
    }
    if locations.is_empty() {
        return Err(RegistryError::PolicyDenied {
            image: image.to_string(),
            reason: "source may not be contacted and no mirror is configured".to_string(),
        });
    }

    if let Some((blocked, _)) = locations.iter().find(|(l, _)| policy.is_blocked(l)) {
        return Err(RegistryError::PolicyDenied {
            image: image.to_string(),
            reason: format!("registry {blocked} is blocked"),
        });
    }

    let mut candidates = Vec::with_capacity(locations.len());
    for (candidate_location, is_source) in locations {
        if !policy.is_allowed(&candidate_location) {
            trace!("Skipping {} for {}: not in the allowed registries", candidate_location, image);
            continue;
        }
        candidates.push(Candidate {
            reference: image.with_location(&candidate_location)?,
            credentials: secrets.lookup(&candidate_location).cloned(),
            tls: policy.tls_for(&candidate_location),
            is_source,
        });
    }

    if candidates.is_empty() {
        return Err(RegistryError::PolicyDenied {
            image: image.to_string(),
            reason: "no candidate registry is in the allowed registries".to_string(),
        });
    }
    Ok(candidates)
}

/// Mirror locations for `location` and whether the source may be contacted.
fn mirror_locations(location: &str, rules: &[MirrorRule]) -> (Vec<String>, bool) {
    let matching: Vec<&MirrorRule> = rules
        .iter()
        .filter(|r| !r.source.starts_with("*.") && scope_matches(&r.source, location))
        .collect();
    let Some(best) = matching.iter().map(|r| scope_specificity(&r.source)).max() else {
        return (Vec::new(), true);
    };

    let mut mirrors = Vec::new();
    let mut contact_source = true;
    for rule in matching.into_iter().filter(|r| scope_specificity(&r.source) == best) {
        let suffix = &location[rule.source.trim_end_matches('/').len()..];
        for mirror in &rule.mirrors {
            let rewritten = format!("{}{}", mirror.trim_end_matches('/'), suffix);
            if !mirrors.contains(&rewritten) {
                mirrors.push(rewritten);
            }
        }
        if rule.source_policy == MirrorSourcePolicy::NeverContactSource {
            contact_source = false;
        }
    }
    (mirrors, contact_source)
}
