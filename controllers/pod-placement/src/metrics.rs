//! Prometheus metrics
//!
//! One registry per process, exposed as text on `/metrics`.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Terminal outcome of a gated pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodOutcome {
    /// Affinity added and gate removed
    Mutated,
    /// Gate removed without touching the affinity
    Unmutated,
    /// Namespace or pod left scope while gated
    OutOfScope,
    /// Pod deleted while resolution was in flight
    Abandoned,
}

impl PodOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mutated => "mutated",
            Self::Unmutated => "unmutated",
            Self::OutOfScope => "out-of-scope",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Controller metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    pub pods_gated: IntCounter,
    pub pods_resolved: IntCounterVec,
    pub image_probes: IntCounterVec,
    pub resolution_seconds: Histogram,
    pub admission_reviews: IntCounterVec,
}

impl Metrics {
    /// Creates and registers all collectors.
    ///
    /// # Errors
    ///
    /// Fails when a collector cannot be registered (duplicate name).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let pods_gated = IntCounter::with_opts(Opts::new(
            "pod_placement_pods_gated_total",
            "Pods that received the scheduling gate at admission",
        ))?;
        let pods_resolved = IntCounterVec::new(
            Opts::new("pod_placement_pods_resolved_total", "Gated pods by terminal outcome"),
            &["outcome"],
        )?;
        let image_probes = IntCounterVec::new(
            Opts::new("pod_placement_image_probes_total", "Image architecture probes by outcome"),
            &["outcome"],
        )?;
        let resolution_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "pod_placement_resolution_seconds",
                "Time from reconcile start to gate removal for one pod",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        let admission_reviews = IntCounterVec::new(
            Opts::new("pod_placement_admission_reviews_total", "Admission reviews by webhook and verdict"),
            &["webhook", "allowed"],
        )?;

        registry.register(Box::new(pods_gated.clone()))?;
        registry.register(Box::new(pods_resolved.clone()))?;
        registry.register(Box::new(image_probes.clone()))?;
        registry.register(Box::new(resolution_seconds.clone()))?;
        registry.register(Box::new(admission_reviews.clone()))?;

        Ok(Self {
            registry,
            pods_gated,
            pods_resolved,
            image_probes,
            resolution_seconds,
            admission_reviews,
        })
    }

    pub fn pod_resolved(&self, outcome: PodOutcome) {
        self.pods_resolved.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn image_probed(&self, outcome: &str) {
        self.image_probes.with_label_values(&[outcome]).inc();
    }

    pub fn admission_review(&self, webhook: &str, allowed: bool) {
        let allowed = if allowed { "true" } else { "false" };
        self.admission_reviews.with_label_values(&[webhook, allowed]).inc();
    }

    /// Text exposition of every registered collector
    ///
    /// # Errors
    ///
    /// Fails when encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.pods_gated.inc();
        metrics.pod_resolved(PodOutcome::Mutated);
        metrics.image_probed("success");

        let text = metrics.render().unwrap();
        assert!(text.contains("pod_placement_pods_gated_total 1"));
        assert!(text.contains(r#"pod_placement_pods_resolved_total{outcome="mutated"} 1"#));
        assert!(text.contains(r#"pod_placement_image_probes_total{outcome="success"} 1"#));
    }
}
