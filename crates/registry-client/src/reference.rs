//! Image references
//!
//! A parsed `registry/repository[:tag][@digest]` reference. Mirror and
//! policy scopes match against its *location*, `registry/repository`.

use crate::error::RegistryError;
use oci_distribution::Reference;
use std::fmt;

const DEFAULT_TAG: &str = "latest";

/// A fully-qualified image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host (with optional port), e.g. `quay.io` or `registry.local:5000`
    pub registry: String,
    /// Repository path inside the registry, e.g. `library/nginx`
    pub repository: String,
    /// Tag, absent for digest-only references
    pub tag: Option<String>,
    /// Content digest, e.g. `sha256:...`
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parses a pod container image string.
    ///
    /// Short names are qualified the way the container runtime does
    /// (`nginx` → `docker.io/library/nginx:latest`).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] for malformed input.
    pub fn parse(image: &str) -> Result<Self, RegistryError> {
        let parsed: Reference = image
            .parse()
            .map_err(|e| RegistryError::InvalidReference(image.to_string(), format!("{e}")))?;

        let digest = parsed.digest().map(str::to_string);
        let tag = match (parsed.tag(), &digest) {
            (Some(tag), _) => Some(tag.to_string()),
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (None, Some(_)) => None,
        };

        Ok(Self {
            registry: parsed.registry().to_string(),
            repository: parsed.repository().to_string(),
            tag,
            digest,
        })
    }

    /// `registry/repository`
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Whether the reference pins a digest (digest mirrors apply, tag mirrors don't)
    #[must_use]
    pub fn is_digest(&self) -> bool {
        self.digest.is_some()
    }

    /// Same tag/digest at another `registry/repository` location.
    ///
    /// # Errors
    ///
    /// Fails when `location` has no repository component.
    pub fn with_location(&self, location: &str) -> Result<Self, RegistryError> {
        let (registry, repository) = location
            .trim_end_matches('/')
            .split_once('/')
            .filter(|(r, p)| !r.is_empty() && !p.is_empty())
            .ok_or_else(|| {
                RegistryError::InvalidReference(location.to_string(), "missing repository component".to_string())
            })?;

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: self.tag.clone(),
            digest: self.digest.clone(),
        })
    }

    /// Reference in the form the distribution client pulls by (digest wins over tag)
    #[must_use]
    pub fn to_oci(&self) -> Reference {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => Reference::with_digest(self.registry.clone(), self.repository.clone(), digest.clone()),
            (None, Some(tag)) => Reference::with_tag(self.registry.clone(), self.repository.clone(), tag.clone()),
            (None, None) => {
                Reference::with_tag(self.registry.clone(), self.repository.clone(), DEFAULT_TAG.to_string())
            }
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_short_name_is_qualified() {
        let image = ImageReference::parse("nginx").unwrap();
        assert_eq!(image.registry, "docker.io");
        assert_eq!(image.repository, "library/nginx");
        assert_eq!(image.tag.as_deref(), Some("latest"));
        assert!(!image.is_digest());
    }

    #[test]
    fn test_digest_reference() {
        let image = ImageReference::parse(&format!("quay.io/app/api@{DIGEST}")).unwrap();
        assert_eq!(image.location(), "quay.io/app/api");
        assert!(image.is_digest());
        assert_eq!(image.to_string(), format!("quay.io/app/api@{DIGEST}"));
    }

    #[test]
    fn test_with_location_keeps_tag() {
        let image = ImageReference::parse("registry.local:5000/team/tool:v2").unwrap();
        let mirrored = image.with_location("mirror.example.com/cache/team/tool").unwrap();
        assert_eq!(mirrored.registry, "mirror.example.com");
        assert_eq!(mirrored.repository, "cache/team/tool");
        assert_eq!(mirrored.tag.as_deref(), Some("v2"));
        assert!(image.with_location("hostonly").is_err());
    }

    #[test]
    fn test_invalid_reference() {
        assert!(matches!(
            ImageReference::parse("UPPER/Case::bad"),
            Err(RegistryError::InvalidReference(..))
        ));
    }
}
