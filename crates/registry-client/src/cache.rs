//! Per-image architecture cache
//!
//! Keyed by the image reference as written in the pod. Every entry records
//! the candidate list it was resolved through; a lookup made under a
//! different candidate list (mirror, trust or credential change) misses and
//! the stale entry is dropped. Entries also expire after a fixed TTL; every
//! insert sweeps the expired ones, so images that are never asked for again
//! do not pile up.

use crate::resolver::Candidate;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: u64,
    endpoint: String,
    digest: String,
    architectures: BTreeSet<String>,
    inserted_at: Instant,
}

/// Architectures of one image and the endpoint that reported them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArchitectures {
    /// Location that answered
    pub endpoint: String,
    pub digest: String,
    pub architectures: BTreeSet<String>,
}

/// Concurrent architecture cache shared by all reconcile workers
#[derive(Debug)]
pub struct ArchitectureCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ArchitectureCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fingerprint of a candidate list (order, locations, TLS and credentials)
    #[must_use]
    pub fn fingerprint(candidates: &[Candidate]) -> u64 {
        let mut hasher = DefaultHasher::new();
        candidates.hash(&mut hasher);
        hasher.finish()
    }

    /// Cached result for `image`, if fresh and resolved through the same candidates
    pub fn get(&self, image: &str, fingerprint: u64) -> Option<ResolvedArchitectures> {
        {
            let entries = self.entries.read();
            match entries.get(image) {
                None => return None,
                Some(entry) if entry.fingerprint == fingerprint && entry.inserted_at.elapsed() < self.ttl => {
                    return Some(ResolvedArchitectures {
                        endpoint: entry.endpoint.clone(),
                        digest: entry.digest.clone(),
                        architectures: entry.architectures.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write();
        if entries
            .get(image)
            .is_some_and(|e| e.fingerprint != fingerprint || e.inserted_at.elapsed() >= self.ttl)
        {
            entries.remove(image);
        }
        None
    }

    pub fn insert(&self, image: &str, fingerprint: u64, value: ResolvedArchitectures) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        entries.insert(
            image.to_string(),
            CacheEntry {
                fingerprint,
                endpoint: value.endpoint,
                digest: value.digest,
                architectures: value.architectures,
                inserted_at: Instant::now(),
            },
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
