//! Node Affinity Merge Engine
//!
//! Combines the architectures every container image supports with the pod's
//! own node affinity. The architecture requirement is ANDed into each
//! existing required term; a term whose architecture constraint cannot be
//! satisfied by the resolved set is a conflict and the pod is left alone.
//!
//! Merging a pod against its own output changes nothing.

use crate::pod::{PlacementDirective, placement_directive};
use crds::{ARCH_LABEL, NodeAffinityScoring};
use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PodSpec, PreferredSchedulingTerm,
};
use std::collections::BTreeSet;

/// Why the merge left the pod untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The pod author pinned the pod explicitly
    Directive(PlacementDirective),
    /// The images share no architecture
    NoCommonArchitecture,
    /// An existing required term excludes every resolved architecture
    Conflict(String),
}

/// Affinity to write back to the pod
#[derive(Debug, Clone, PartialEq)]
pub struct MergedAffinity {
    pub affinity: Affinity,
    /// Required architecture expression added to at least one term
    pub required_set: bool,
    /// Preferred architecture terms added
    pub preferred_set: bool,
}

/// Result of [`merge`]
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Mutated(MergedAffinity),
    /// Already satisfied; nothing to write
    Unchanged,
    Skipped(SkipReason),
}

/// How one existing term relates to the resolved architectures
enum TermFit {
    /// Already restricted to a subset of the resolved set
    Satisfied,
    /// Needs the architecture expression ANDed in
    Needs,
    /// No resolved architecture can satisfy the term
    Conflict(String),
}

/// Merges `architectures` into the node affinity of `spec`.
///
/// `scoring`, when present, adds one preferred term per weighted
/// architecture that is also in `architectures`. Existing preferred terms on
/// the architecture label are left as the pod author wrote them.
#[must_use]
pub fn merge(
    architectures: &BTreeSet<String>,
    spec: &PodSpec,
    scoring: Option<&NodeAffinityScoring>,
) -> MergeOutcome {
    if let Some(directive) = placement_directive(spec) {
        return MergeOutcome::Skipped(SkipReason::Directive(directive));
    }
    if architectures.is_empty() {
        return MergeOutcome::Skipped(SkipReason::NoCommonArchitecture);
    }

    let mut affinity = spec.affinity.clone().unwrap_or_default();
    let mut node_affinity = affinity.node_affinity.take().unwrap_or_default();

    let required_set = match merge_required(architectures, &mut node_affinity) {
        Ok(changed) => changed,
        Err(reason) => return MergeOutcome::Skipped(SkipReason::Conflict(reason)),
    };
    let preferred_set = scoring.is_some_and(|s| merge_preferred(architectures, s, &mut node_affinity));

    if !required_set && !preferred_set {
        return MergeOutcome::Unchanged;
    }
    affinity.node_affinity = Some(node_affinity);
    MergeOutcome::Mutated(MergedAffinity {
        affinity,
        required_set,
        preferred_set,
    })
}

fn arch_requirement(architectures: &BTreeSet<String>) -> NodeSelectorRequirement {
    NodeSelectorRequirement {
        key: ARCH_LABEL.to_string(),
        operator: "In".to_string(),
        values: Some(architectures.iter().cloned().collect()),
    }
}

fn merge_required(architectures: &BTreeSet<String>, node_affinity: &mut NodeAffinity) -> Result<bool, String> {
    let required = node_affinity
        .required_during_scheduling_ignored_during_execution
        .get_or_insert_with(NodeSelector::default);

    if required.node_selector_terms.is_empty() {
        required.node_selector_terms.push(NodeSelectorTerm {
            match_expressions: Some(vec![arch_requirement(architectures)]),
            match_fields: None,
        });
        return Ok(true);
    }

    let mut needs = Vec::with_capacity(required.node_selector_terms.len());
    for (index, term) in required.node_selector_terms.iter().enumerate() {
        match fit(architectures, term) {
            TermFit::Satisfied => needs.push(false),
            TermFit::Needs => needs.push(true),
            TermFit::Conflict(why) => return Err(format!("required term {index}: {why}")),
        }
    }

    let mut changed = false;
    for (term, needs) in required.node_selector_terms.iter_mut().zip(needs) {
        if needs {
            term.match_expressions
                .get_or_insert_with(Vec::new)
                .push(arch_requirement(architectures));
            changed = true;
        }
    }
    Ok(changed)
}

/// Architectures a node may have and still match one required term
enum Allowed {
    /// Any architecture except these
    AllBut(BTreeSet<String>),
    /// Only these
    Only(BTreeSet<String>),
}

/// Folds every architecture expression of `term` into one allowed set.
///
/// `In` values intersect, `NotIn` values are removed, and `DoesNotExist`
/// allows nothing since every node carries the label.
fn allowed_architectures(term: &NodeSelectorTerm) -> Allowed {
    let mut only: Option<BTreeSet<String>> = None;
    let mut excluded = BTreeSet::new();
    for req in term.match_expressions.iter().flatten().filter(|r| r.key == ARCH_LABEL) {
        let values: BTreeSet<String> = req.values.iter().flatten().cloned().collect();
        match req.operator.as_str() {
            "In" => {
                only = Some(match only {
                    Some(current) => current.intersection(&values).cloned().collect(),
                    None => values,
                });
            }
            "NotIn" => excluded.extend(values),
            "DoesNotExist" => return Allowed::Only(BTreeSet::new()),
            _ => {}
        }
    }
    match only {
        Some(only) => Allowed::Only(only.difference(&excluded).cloned().collect()),
        None => Allowed::AllBut(excluded),
    }
}

fn fit(architectures: &BTreeSet<String>, term: &NodeSelectorTerm) -> TermFit {
    match allowed_architectures(term) {
        Allowed::AllBut(excluded) => {
            if architectures.is_subset(&excluded) {
                TermFit::Conflict(format!("{ARCH_LABEL} excludes {excluded:?}, covering {architectures:?}"))
            } else {
                TermFit::Needs
            }
        }
        Allowed::Only(allowed) => {
            if allowed.is_disjoint(architectures) {
                TermFit::Conflict(format!(
                    "{ARCH_LABEL} allows only {allowed:?}, none of {architectures:?}"
                ))
            } else if allowed.is_subset(architectures) {
                TermFit::Satisfied
            } else {
                TermFit::Needs
            }
        }
    }
}

fn merge_preferred(
    architectures: &BTreeSet<String>,
    scoring: &NodeAffinityScoring,
    node_affinity: &mut NodeAffinity,
) -> bool {
    let preferred = node_affinity
        .preferred_during_scheduling_ignored_during_execution
        .get_or_insert_with(Vec::new);

    let already_scored = preferred.iter().any(|p| {
        p.preference
            .match_expressions
            .iter()
            .flatten()
            .any(|r| r.key == ARCH_LABEL)
    });
    if already_scored {
        return false;
    }

    let before = preferred.len();
    for term in scoring.platforms.iter().filter(|t| architectures.contains(&t.architecture)) {
        preferred.push(PreferredSchedulingTerm {
            weight: term.weight,
            preference: NodeSelectorTerm {
                match_expressions: Some(vec![NodeSelectorRequirement {
                    key: ARCH_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![term.architecture.clone()]),
                }]),
                match_fields: None,
            },
        });
    }
    if preferred.is_empty() {
        node_affinity.preferred_during_scheduling_ignored_during_execution = None;
    }
    node_affinity
        .preferred_during_scheduling_ignored_during_execution
        .as_ref()
        .is_some_and(|p| p.len() != before)
}

#[cfg(test)]
#[path = "affinity_test.rs"]
mod affinity_test;
