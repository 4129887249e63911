//! Gated pod reconciler
//!
//! Second phase of the gate-then-patch protocol. For every pod carrying the
//! placement gate: re-check scope, resolve the architectures of all images,
//! merge them into the pod's node affinity and remove the gate in one
//! update. Transient registry failures are retried with Fibonacci backoff
//! up to a bounded attempt count; nothing leaves a pod gated for good.

use crate::affinity::{MergeOutcome, MergedAffinity, SkipReason, merge};
use crate::backoff::fibonacci_delay;
use crate::config::ControllerConfig;
use crate::config_resolver::PlacementScope;
use crate::error::ControllerError;
use crate::image_policy::PolicySource;
use crate::metrics::{Metrics, PodOutcome};
use crate::pod::{display_name, has_gate, images, owner, placement_directive, pull_secret_names, remove_gate};
use crate::resolution::{PodResolution, resolve_pod};
use crate::stores::Stores;
use crds::{
    LABEL_VALUE_NOT_SET, LABEL_VALUE_SET, NODE_AFFINITY_LABEL, PREFERRED_NODE_AFFINITY_LABEL, SCHEDULING_GATE_LABEL,
    SCHEDULING_GATE_LABEL_VALUE_REMOVED,
};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::events::{Event, EventType, Recorder};
use kube_runtime::reflector::{ObjectRef, Store};
use parking_lot::Mutex;
use registry_client::ArchitectureProber;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often an in-flight resolution checks whether its pod still exists
const DELETION_POLL: Duration = Duration::from_millis(500);

/// Backoff bounds for pods whose registries were unreachable
const RETRY_MIN_SECONDS: u64 = 5;
const RETRY_MAX_SECONDS: u64 = 60;

/// Shared state of the gated pod reconciler
pub struct Context {
    pub client: Client,
    pub stores: Stores,
    /// Gated pods, as seen by the controller's own watch
    pub pods: Store<Pod>,
    pub policy_source: PolicySource,
    pub prober: ArchitectureProber,
    pub metrics: Metrics,
    pub recorder: Recorder,
    pub config: ControllerConfig,
    attempts: Attempts,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("stores", &self.stores)
            .field("prober", &self.prober)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    #[allow(clippy::too_many_arguments, reason = "one field per shared dependency")]
    #[must_use]
    pub fn new(
        client: Client,
        stores: Stores,
        pods: Store<Pod>,
        policy_source: PolicySource,
        prober: ArchitectureProber,
        metrics: Metrics,
        recorder: Recorder,
        config: ControllerConfig,
    ) -> Self {
        Self {
            client,
            stores,
            pods,
            policy_source,
            prober,
            metrics,
            recorder,
            config,
            attempts: Attempts::default(),
        }
    }
}

/// Transient failures per pod UID
#[derive(Debug, Default)]
struct Attempts(Mutex<HashMap<String, u32>>);

impl Attempts {
    fn record(&self, uid: &str) -> u32 {
        let mut attempts = self.0.lock();
        let count = attempts.entry(uid.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn forget(&self, uid: &str) {
        self.0.lock().remove(uid);
    }

    /// Drops pods that left the gated pod store while waiting for a retry.
    ///
    /// A requeue whose pod is gone never reaches `reconcile`, so its count
    /// would otherwise stay forever.
    fn retain_gated(&self, pods: &Store<Pod>) {
        let mut attempts = self.0.lock();
        if attempts.is_empty() {
            return;
        }
        let gated: HashSet<String> = pods.state().iter().filter_map(|p| p.metadata.uid.clone()).collect();
        attempts.retain(|uid, _| gated.contains(uid));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// Terminal decision for one gated pod
#[derive(Debug, Clone)]
struct Decision {
    affinity: Option<MergedAffinity>,
    /// The pod's own affinity already limits it to the resolved architectures
    affinity_satisfied: bool,
    outcome: PodOutcome,
    event_type: EventType,
    reason: &'static str,
    note: String,
}

impl Decision {
    fn unmutated(outcome: PodOutcome, event_type: EventType, reason: &'static str, note: String) -> Self {
        Self {
            affinity: None,
            affinity_satisfied: false,
            outcome,
            event_type,
            reason,
            note,
        }
    }
}

/// Result of the final pod update
enum Write {
    Done,
    /// Pod gone, replaced or already ungated
    Gone,
    /// Pod changed since it was read; try again
    Stale,
}

/// Reconciles one gated pod.
///
/// # Errors
///
/// - [`ControllerError::RegistryTransient`] when a registry was unreachable
///   and attempts remain; the error policy requeues with backoff.
/// - Kubernetes API errors while reading policy or writing the pod.
pub async fn reconcile(pod: Arc<Pod>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    ctx.attempts.retain_gated(&ctx.pods);
    let uid = pod.uid().unwrap_or_default();
    if !has_gate(&pod) || pod.metadata.deletion_timestamp.is_some() {
        ctx.attempts.forget(&uid);
        return Ok(Action::await_change());
    }
    let Some(spec) = pod.spec.as_ref() else {
        return Ok(Action::await_change());
    };
    let name = display_name(&pod);
    let namespace = pod.namespace().unwrap_or_default();
    let owner = owner(&pod).unwrap_or_else(|| "-".to_string());
    info!("Reconciling gated pod {} (owner {})", name, owner);
    let started = Instant::now();

    let scope = ctx.stores.scope(&namespace, &ctx.config.operator_namespace);
    let decision = match release_unresolved(spec, &scope, gated_for(&pod), ctx.config.max_gated) {
        Some(decision) => decision,
        None => {
            let Some(resolution) = resolve_until_deleted(&pod, &namespace, &ctx).await? else {
                info!("Gated pod {} deleted during resolution, abandoning", name);
                ctx.attempts.forget(&uid);
                ctx.metrics.pod_resolved(PodOutcome::Abandoned);
                return Ok(Action::await_change());
            };
            match decide(resolution, spec, &scope) {
                Ok(decision) => decision,
                Err((image, reason)) => {
                    let attempt = ctx.attempts.record(&uid);
                    match give_up(&image, &reason, attempt, ctx.config.max_resolution_attempts) {
                        Some(decision) => decision,
                        None => {
                            return Err(ControllerError::RegistryTransient {
                                pod: name,
                                attempt,
                                reason: format!("{image}: {reason}"),
                            });
                        }
                    }
                }
            }
        }
    };

    match write(&pod, &decision, &ctx.client).await? {
        Write::Stale => {
            debug!("Pod {} changed while reconciling, retrying", name);
            return Ok(Action::requeue(Duration::from_secs(1)));
        }
        Write::Gone => {
            debug!("Pod {} no longer gated", name);
            ctx.attempts.forget(&uid);
            return Ok(Action::await_change());
        }
        Write::Done => {}
    }

    ctx.attempts.forget(&uid);
    ctx.metrics.pod_resolved(decision.outcome);
    ctx.metrics.resolution_seconds.observe(started.elapsed().as_secs_f64());
    info!(
        "Released pod {} (owner {}): {} - {}",
        name,
        owner,
        decision.outcome.as_str(),
        decision.note
    );
    publish(&ctx, &pod, &decision).await;
    Ok(Action::await_change())
}

/// Requeue policy for failed reconciliations
pub fn error_policy(pod: Arc<Pod>, error: &ControllerError, _ctx: Arc<Context>) -> Action {
    match error {
        ControllerError::RegistryTransient { attempt, .. } => {
            let delay = fibonacci_delay(*attempt, RETRY_MIN_SECONDS, RETRY_MAX_SECONDS);
            warn!("{}; retrying in {}s", error, delay.as_secs());
            Action::requeue(delay)
        }
        _ => {
            error!("Reconciliation failed for pod {}: {}", display_name(&pod), error);
            Action::requeue(Duration::from_secs(15))
        }
    }
}

/// Releases the pod before resolving its images when placement no longer
/// applies, the pod pins its placement, or it has been gated for longer than
/// `max_gated`.
fn release_unresolved(
    spec: &PodSpec,
    scope: &PlacementScope,
    gated_for: Option<Duration>,
    max_gated: Duration,
) -> Option<Decision> {
    if let PlacementScope::Disabled(reason) = scope {
        return Some(Decision::unmutated(
            PodOutcome::OutOfScope,
            EventType::Normal,
            "SchedulingGateRemoved",
            format!("Pod placement no longer applies: {reason:?}"),
        ));
    }
    if let Some(directive) = placement_directive(spec) {
        return Some(Decision::unmutated(
            PodOutcome::OutOfScope,
            EventType::Normal,
            "SchedulingGateRemoved",
            format!("Pod sets {}", directive.as_str()),
        ));
    }
    if gated_for.is_some_and(|age| age > max_gated) {
        return Some(Decision::unmutated(
            PodOutcome::Unmutated,
            EventType::Warning,
            "SchedulingGateTimeout",
            format!("Pod gated for more than {}s", max_gated.as_secs()),
        ));
    }
    None
}

/// Releases the pod unmutated once `attempt` transient failures used up the
/// budget; `None` while retries remain.
fn give_up(image: &str, reason: &str, attempt: u32, max_attempts: u32) -> Option<Decision> {
    (attempt >= max_attempts).then(|| {
        Decision::unmutated(
            PodOutcome::Unmutated,
            EventType::Warning,
            "RegistryRetriesExhausted",
            format!("Gave up after {attempt} attempts, {image} unavailable: {reason}"),
        )
    })
}

/// Maps a resolution onto a terminal decision, or the transient failure to retry
fn decide(
    resolution: PodResolution,
    spec: &PodSpec,
    scope: &PlacementScope,
) -> Result<Decision, (String, String)> {
    let architectures = match resolution {
        PodResolution::Architectures(architectures) => architectures,
        PodResolution::Fatal { image, failure, reason } => {
            return Ok(Decision::unmutated(
                PodOutcome::Unmutated,
                EventType::Warning,
                "ImageArchitectureInspectionError",
                format!("{image} ({}): {reason}", failure.as_str()),
            ));
        }
        PodResolution::Transient { image, reason } => return Err((image, reason)),
    };

    let decision = match merge(&architectures, spec, scope.scoring()) {
        MergeOutcome::Mutated(merged) => Decision {
            note: format!("Node affinity set for architectures {architectures:?}"),
            affinity: Some(merged),
            affinity_satisfied: false,
            outcome: PodOutcome::Mutated,
            event_type: EventType::Normal,
            reason: "ArchitectureAwareNodeAffinitySet",
        },
        MergeOutcome::Unchanged => Decision {
            affinity_satisfied: true,
            ..Decision::unmutated(
                PodOutcome::Unmutated,
                EventType::Normal,
                "NodeAffinityAlreadySatisfied",
                format!("Existing affinity already limited to {architectures:?}"),
            )
        },
        MergeOutcome::Skipped(SkipReason::NoCommonArchitecture) => Decision::unmutated(
            PodOutcome::Unmutated,
            EventType::Warning,
            "NoSupportedArchitecturesFound",
            "The container images share no architecture".to_string(),
        ),
        MergeOutcome::Skipped(SkipReason::Conflict(why)) => Decision::unmutated(
            PodOutcome::Unmutated,
            EventType::Warning,
            "MergeConflict",
            format!("Existing node affinity conflicts with {architectures:?}: {why}"),
        ),
        MergeOutcome::Skipped(SkipReason::Directive(directive)) => Decision::unmutated(
            PodOutcome::OutOfScope,
            EventType::Normal,
            "SchedulingGateRemoved",
            format!("Pod sets {}", directive.as_str()),
        ),
    };
    Ok(decision)
}

/// Reads policy and secrets, then probes every image; `None` when the pod
/// disappeared before all probes finished.
async fn resolve_until_deleted(
    pod: &Pod,
    namespace: &str,
    ctx: &Context,
) -> Result<Option<PodResolution>, ControllerError> {
    let Some(spec) = pod.spec.as_ref() else {
        return Ok(None);
    };
    let policy = ctx.policy_source.registry_policy().await?;
    let secrets = ctx
        .policy_source
        .pull_secrets(namespace, &pull_secret_names(spec))
        .await?;
    let images = images(spec);

    let key = ObjectRef::from_obj(pod);
    let uid = pod.metadata.uid.clone();
    tokio::select! {
        resolution = resolve_pod(&ctx.prober, &images, &policy, &secrets, &ctx.metrics) => Ok(Some(resolution)),
        () = wait_for_deletion(&ctx.pods, &key, uid.as_deref()) => Ok(None),
    }
}

/// Completes once the pod left the gated pod store or was marked for deletion
async fn wait_for_deletion(pods: &Store<Pod>, key: &ObjectRef<Pod>, uid: Option<&str>) {
    loop {
        tokio::time::sleep(DELETION_POLL).await;
        match pods.get(key) {
            Some(current) if current.metadata.uid.as_deref() == uid && current.metadata.deletion_timestamp.is_none() => {}
            _ => return,
        }
    }
}

/// Time since the pod was created
fn gated_for(pod: &Pod) -> Option<Duration> {
    let created = pod.metadata.creation_timestamp.as_ref()?;
    (chrono::Utc::now() - created.0).to_std().ok()
}

/// Applies `decision` to the latest version of the pod in one update.
///
/// The affinity and the gate removal land together, so the scheduler never
/// sees the pod ungated without its affinity.
fn apply_decision(latest: &mut Pod, decision: &Decision) {
    if let Some(spec) = latest.spec.as_mut() {
        if let Some(merged) = &decision.affinity {
            spec.affinity = Some(merged.affinity.clone());
        }
        remove_gate(spec);
    }
    let required = decision.affinity_satisfied || decision.affinity.as_ref().is_some_and(|m| m.required_set);
    let preferred = decision.affinity.as_ref().is_some_and(|m| m.preferred_set);

    let labels = latest.labels_mut();
    labels.insert(
        SCHEDULING_GATE_LABEL.to_string(),
        SCHEDULING_GATE_LABEL_VALUE_REMOVED.to_string(),
    );
    labels.insert(
        NODE_AFFINITY_LABEL.to_string(),
        if required { LABEL_VALUE_SET } else { LABEL_VALUE_NOT_SET }.to_string(),
    );
    if preferred {
        labels.insert(PREFERRED_NODE_AFFINITY_LABEL.to_string(), LABEL_VALUE_SET.to_string());
    }
}

async fn write(pod: &Pod, decision: &Decision, client: &Client) -> Result<Write, ControllerError> {
    let namespace = pod.namespace().unwrap_or_default();
    let name = pod.name_any();
    let api: Api<Pod> = Api::namespaced(client.clone(), &namespace);

    let Some(mut latest) = api.get_opt(&name).await? else {
        return Ok(Write::Gone);
    };
    if latest.metadata.uid != pod.metadata.uid || !has_gate(&latest) || latest.metadata.deletion_timestamp.is_some() {
        return Ok(Write::Gone);
    }
    if decision.affinity.is_some() && latest.spec.as_ref().map(|s| &s.affinity) != pod.spec.as_ref().map(|s| &s.affinity) {
        return Ok(Write::Stale);
    }

    apply_decision(&mut latest, decision);
    match api.replace(&name, &PostParams::default(), &latest).await {
        Ok(_) => Ok(Write::Done),
        Err(kube::Error::Api(response)) if response.code == 409 => Ok(Write::Stale),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(Write::Gone),
        Err(e) => Err(e.into()),
    }
}

async fn publish(ctx: &Context, pod: &Pod, decision: &Decision) {
    let event = Event {
        type_: decision.event_type,
        reason: decision.reason.to_string(),
        note: Some(decision.note.clone()),
        action: "ReleaseSchedulingGate".to_string(),
        secondary: None,
    };
    if let Err(e) = ctx.recorder.publish(&event, &pod.object_ref(&())).await {
        warn!("Failed to record event for pod {}: {}", display_name(pod), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_resolver::DisabledReason;
    use crate::test_utils::{archs, gated_pod, scoring};
    use crds::{SCHEDULING_GATE_LABEL_VALUE_GATED, SCHEDULING_GATE_NAME};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube_runtime::{reflector, watcher};
    use registry_client::ProbeFailure;

    const MAX_GATED: Duration = Duration::from_secs(600);

    fn enabled(scoring: Option<crds::NodeAffinityScoring>) -> PlacementScope {
        PlacementScope::Enabled { scoring, source: None }
    }

    #[test]
    fn test_decide_mutates_on_common_architectures() {
        let pod = gated_pod("app", "web", &["quay.io/a:1"]);
        let decision = decide(
            PodResolution::Architectures(archs(&["amd64", "arm64"])),
            pod.spec.as_ref().unwrap(),
            &enabled(None),
        )
        .unwrap();
        assert_eq!(decision.outcome, PodOutcome::Mutated);
        assert!(decision.affinity.unwrap().required_set);
    }

    #[test]
    fn test_decide_releases_unmutated_on_empty_intersection() {
        let pod = gated_pod("app", "web", &["quay.io/a:1"]);
        let decision = decide(
            PodResolution::Architectures(archs(&[])),
            pod.spec.as_ref().unwrap(),
            &enabled(Some(scoring(&[("arm64", 10)]))),
        )
        .unwrap();
        assert_eq!(decision.outcome, PodOutcome::Unmutated);
        assert_eq!(decision.reason, "NoSupportedArchitecturesFound");
        assert!(decision.affinity.is_none());
    }

    #[test]
    fn test_decide_fatal_and_transient() {
        let pod = gated_pod("app", "web", &["quay.io/a:1"]);
        let spec = pod.spec.as_ref().unwrap();

        let fatal = decide(
            PodResolution::Fatal {
                image: "quay.io/a:1".to_string(),
                failure: ProbeFailure::PolicyDenied,
                reason: "blocked".to_string(),
            },
            spec,
            &enabled(None),
        )
        .unwrap();
        assert_eq!(fatal.outcome, PodOutcome::Unmutated);
        assert!(fatal.note.contains("policy-denied"));

        let transient = decide(
            PodResolution::Transient {
                image: "quay.io/a:1".to_string(),
                reason: "timeout".to_string(),
            },
            spec,
            &enabled(None),
        );
        assert!(transient.is_err());
    }

    #[test]
    fn test_apply_decision_sets_affinity_gate_and_labels_together() {
        let mut pod = gated_pod("app", "web", &["quay.io/a:1"]);
        let decision = decide(
            PodResolution::Architectures(archs(&["arm64"])),
            pod.spec.as_ref().unwrap(),
            &enabled(Some(scoring(&[("arm64", 50)]))),
        )
        .unwrap();

        apply_decision(&mut pod, &decision);
        let spec = pod.spec.as_ref().unwrap();
        assert!(spec.affinity.is_some());
        assert!(spec.scheduling_gates.is_none());
        let labels = pod.labels();
        assert_eq!(labels[SCHEDULING_GATE_LABEL], SCHEDULING_GATE_LABEL_VALUE_REMOVED);
        assert_eq!(labels[NODE_AFFINITY_LABEL], LABEL_VALUE_SET);
        assert_eq!(labels[PREFERRED_NODE_AFFINITY_LABEL], LABEL_VALUE_SET);
    }

    #[test]
    fn test_apply_unmutated_decision_only_removes_gate() {
        let mut pod = gated_pod("app", "web", &["quay.io/a:1"]);
        assert_eq!(pod.labels()[SCHEDULING_GATE_LABEL], SCHEDULING_GATE_LABEL_VALUE_GATED);
        let decision = Decision::unmutated(PodOutcome::OutOfScope, EventType::Normal, "SchedulingGateRemoved", String::new());

        apply_decision(&mut pod, &decision);
        let spec = pod.spec.as_ref().unwrap();
        assert!(spec.affinity.is_none());
        assert!(
            !spec
                .scheduling_gates
                .iter()
                .flatten()
                .any(|g| g.name == SCHEDULING_GATE_NAME)
        );
        assert_eq!(pod.labels()[NODE_AFFINITY_LABEL], LABEL_VALUE_NOT_SET);
        assert!(!pod.labels().contains_key(PREFERRED_NODE_AFFINITY_LABEL));
    }

    #[test]
    fn test_gated_for_reads_creation_timestamp() {
        let mut pod = gated_pod("app", "web", &["quay.io/a:1"]);
        assert_eq!(gated_for(&pod), None);

        pod.metadata.creation_timestamp = Some(Time(chrono::Utc::now() - chrono::TimeDelta::minutes(20)));
        assert!(gated_for(&pod).unwrap() > Duration::from_secs(600));
    }

    #[test]
    fn test_disabled_scope_releases_before_resolution() {
        let pod = gated_pod("app", "web", &["quay.io/a:1"]);
        let decision = release_unresolved(
            pod.spec.as_ref().unwrap(),
            &PlacementScope::Disabled(DisabledReason::NoClusterConfig),
            Some(Duration::from_secs(1)),
            MAX_GATED,
        )
        .unwrap();
        assert_eq!(decision.outcome, PodOutcome::OutOfScope);
        assert_eq!(decision.reason, "SchedulingGateRemoved");
        assert!(decision.affinity.is_none());
    }

    #[test]
    fn test_gated_too_long_releases_unmutated() {
        let pod = gated_pod("app", "web", &["quay.io/a:1"]);
        let spec = pod.spec.as_ref().unwrap();

        let late = release_unresolved(spec, &enabled(None), Some(MAX_GATED + Duration::from_secs(1)), MAX_GATED).unwrap();
        assert_eq!(late.outcome, PodOutcome::Unmutated);
        assert_eq!(late.event_type, EventType::Warning);
        assert_eq!(late.reason, "SchedulingGateTimeout");

        assert!(release_unresolved(spec, &enabled(None), Some(Duration::from_secs(5)), MAX_GATED).is_none());
        assert!(release_unresolved(spec, &enabled(None), None, MAX_GATED).is_none());
    }

    #[test]
    fn test_pinned_pod_released_before_resolution() {
        let mut pod = gated_pod("app", "web", &["quay.io/a:1"]);
        pod.spec.as_mut().unwrap().node_name = Some("worker-0".to_string());
        let decision = release_unresolved(pod.spec.as_ref().unwrap(), &enabled(None), None, MAX_GATED).unwrap();
        assert_eq!(decision.outcome, PodOutcome::OutOfScope);
    }

    #[test]
    fn test_transient_failures_give_up_after_budget() {
        assert!(give_up("quay.io/a:1", "timeout", 1, 3).is_none());
        assert!(give_up("quay.io/a:1", "timeout", 2, 3).is_none());

        let decision = give_up("quay.io/a:1", "timeout", 3, 3).unwrap();
        assert_eq!(decision.outcome, PodOutcome::Unmutated);
        assert_eq!(decision.reason, "RegistryRetriesExhausted");
        assert!(decision.note.contains("quay.io/a:1"));
        assert!(decision.affinity.is_none());
    }

    #[test]
    fn test_attempts_of_departed_pods_are_dropped() {
        let (pods, mut writer) = reflector::store();
        let staying = gated_pod("app", "web", &["quay.io/a:1"]);
        writer.apply_watcher_event(&watcher::Event::Apply(staying.clone()));

        let attempts = Attempts::default();
        assert_eq!(attempts.record(&staying.uid().unwrap()), 1);
        assert_eq!(attempts.record("app-deleted-uid"), 1);
        assert_eq!(attempts.record("app-deleted-uid"), 2);

        attempts.retain_gated(&pods);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts.record(&staying.uid().unwrap()), 2);

        attempts.forget(&staying.uid().unwrap());
        assert_eq!(attempts.len(), 0);
    }

    #[test]
    fn test_satisfied_affinity_is_labelled_set() {
        let mut pod = gated_pod("app", "web", &["quay.io/a:1"]);
        let first = decide(
            PodResolution::Architectures(archs(&["arm64"])),
            pod.spec.as_ref().unwrap(),
            &enabled(None),
        )
        .unwrap();
        pod.spec.as_mut().unwrap().affinity = first.affinity.map(|m| m.affinity);

        let again = decide(
            PodResolution::Architectures(archs(&["arm64"])),
            pod.spec.as_ref().unwrap(),
            &enabled(None),
        )
        .unwrap();
        assert_eq!(again.reason, "NodeAffinityAlreadySatisfied");
        apply_decision(&mut pod, &again);
        assert_eq!(pod.labels()[NODE_AFFINITY_LABEL], LABEL_VALUE_SET);
    }

    #[test]
    fn test_transient_backoff_grows() {
        let first = fibonacci_delay(1, RETRY_MIN_SECONDS, RETRY_MAX_SECONDS);
        let fifth = fibonacci_delay(5, RETRY_MIN_SECONDS, RETRY_MAX_SECONDS);
        assert!(fifth > first);
        assert!(fifth <= Duration::from_secs(RETRY_MAX_SECONDS));
    }
}
