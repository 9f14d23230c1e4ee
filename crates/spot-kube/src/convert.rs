//! Conversion of API objects into the rescheduler's domain model.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1 as core;
use k8s_openapi::api::policy::v1 as policy;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as meta;
use spot_core::{
    HostPort, LabelSelector, Node, NodeAffinity, NodeSelectorTerm, OwnerReference, Pod,
    PodAffinityTerm, PodDisruptionBudget, PodPhase, Requirement, Resources, SelectorOperator,
    Taint, TaintEffect, Toleration, TolerationOperator,
};
use tracing::warn;

use crate::error::KubeError;
use crate::quantity;

/// Returns true if the node's `Ready` condition is `True`.
pub fn is_node_ready(node: &core::Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Returns true for pending pods the scheduler could not place.
pub fn is_unschedulable(pod: &core::Pod) -> bool {
    let bound = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .is_some_and(|n| !n.is_empty());
    if bound || phase(pod).is_terminal() {
        return false;
    }
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.type_ == "PodScheduled"
                    && c.status == "False"
                    && c.reason.as_deref() == Some("Unschedulable")
            })
        })
}

/// Converts a node. Nodes without a name are dropped.
pub fn node_from(node: &core::Node) -> Option<Node> {
    let name = node.metadata.name.clone()?;
    let spec = node.spec.as_ref();

    let taints = spec
        .and_then(|s| s.taints.as_ref())
        .map(|taints| taints.iter().filter_map(taint_from).collect())
        .unwrap_or_default();
    let allocatable = node
        .status
        .as_ref()
        .and_then(|s| s.allocatable.as_ref())
        .map(|a| {
            let (allocatable, invalid) = resources_from(a);
            for (resource, e) in invalid {
                warn!(node = %name, resource = %resource, error = %e, "unparsable allocatable quantity, counting it as zero");
            }
            allocatable
        })
        .unwrap_or_default();

    Some(Node {
        labels: node.metadata.labels.clone().unwrap_or_default(),
        taints,
        allocatable,
        unschedulable: spec.and_then(|s| s.unschedulable).unwrap_or(false),
        name,
    })
}

fn taint_from(taint: &core::Taint) -> Option<Taint> {
    let Some(effect) = TaintEffect::parse(&taint.effect) else {
        warn!(key = %taint.key, effect = %taint.effect, "ignoring taint with unknown effect");
        return None;
    };
    Some(Taint::new(taint.key.clone(), taint.value.as_deref(), effect))
}

/// Converts a pod. Pods without a name are dropped.
pub fn pod_from(pod: &core::Pod) -> Option<Pod> {
    let meta = &pod.metadata;
    let name = meta.name.clone()?;
    let namespace = meta.namespace.clone().unwrap_or_else(|| "default".to_string());
    let spec = pod.spec.as_ref();

    let mut out = Pod::new(namespace, name);
    out.uid = meta.uid.clone().unwrap_or_default();
    out.labels = meta.labels.clone().unwrap_or_default();
    out.annotations = meta.annotations.clone().unwrap_or_default();
    out.owners = meta
        .owner_references
        .as_ref()
        .map(|refs| refs.iter().map(owner_from).collect())
        .unwrap_or_default();
    out.phase = phase(pod);
    out.terminating = meta.deletion_timestamp.is_some();

    if let Some(spec) = spec {
        out.node_name = spec.node_name.clone().filter(|n| !n.is_empty());
        match pod_requests(spec) {
            Ok(requests) => out.requests = requests,
            Err(reason) => {
                warn!(pod = %out.key(), %reason, "unparsable resource request, pod can't be placed");
                out.request_error = Some(reason);
            }
        }
        out.node_selector = spec.node_selector.clone().unwrap_or_default();
        out.tolerations = spec
            .tolerations
            .as_ref()
            .map(|t| t.iter().filter_map(toleration_from).collect())
            .unwrap_or_default();
        out.host_ports = host_ports(spec);
        out.termination_grace_period = spec
            .termination_grace_period_seconds
            .map(|s| Duration::from_secs(u64::try_from(s).unwrap_or(0)));

        if let Some(affinity) = &spec.affinity {
            out.node_affinity = affinity
                .node_affinity
                .as_ref()
                .and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref())
                .map(node_affinity_from)
                .unwrap_or_default();
            out.affinity = affinity
                .pod_affinity
                .as_ref()
                .and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref())
                .map(|terms| terms.iter().filter_map(affinity_term_from).collect())
                .unwrap_or_default();
            out.anti_affinity = affinity
                .pod_anti_affinity
                .as_ref()
                .and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref())
                .map(|terms| terms.iter().filter_map(affinity_term_from).collect())
                .unwrap_or_default();
        }
    }
    Some(out)
}

fn phase(pod: &core::Pod) -> PodPhase {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map_or(PodPhase::Pending, PodPhase::parse)
}

fn owner_from(owner: &meta::OwnerReference) -> OwnerReference {
    OwnerReference {
        kind: owner.kind.clone(),
        name: owner.name.clone(),
        controller: owner.controller.unwrap_or(false),
    }
}

/// Effective requests: the larger of the summed app containers and the
/// largest init container, plus pod overhead. Fails on the first quantity
/// that does not parse.
fn pod_requests(spec: &core::PodSpec) -> std::result::Result<Resources, String> {
    let read = |list: Option<&BTreeMap<String, Quantity>>| {
        let Some(list) = list else {
            return Ok(Resources::new());
        };
        let (resources, invalid) = resources_from(list);
        match invalid.into_iter().next() {
            Some((resource, e)) => Err(format!("{resource}: {e}")),
            None => Ok(resources),
        }
    };
    let container = |c: &core::Container| read(c.resources.as_ref().and_then(|r| r.requests.as_ref()));

    let mut app = Resources::new();
    for c in &spec.containers {
        app += &container(c)?;
    }
    let mut init = Resources::new();
    for c in spec.init_containers.iter().flatten() {
        init = init.max_each(&container(c)?);
    }
    let mut total = app.max_each(&init) + &read(spec.overhead.as_ref())?;
    total.pods = 0;
    Ok(total)
}

/// Reads a resource list. Anything but `cpu`, `memory` and `pods` lands in
/// the scalar map. Quantities that fail to parse are returned by name.
fn resources_from(list: &BTreeMap<String, Quantity>) -> (Resources, Vec<(String, KubeError)>) {
    let mut out = Resources::new();
    let mut invalid = Vec::new();
    for (name, q) in list {
        let parsed = if name == "cpu" {
            quantity::cpu_millis(q)
        } else {
            quantity::units(q)
        };
        match (name.as_str(), parsed) {
            (_, Err(e)) => invalid.push((name.clone(), e)),
            ("cpu", Ok(amount)) => out.cpu_millis = amount,
            ("memory", Ok(amount)) => out.memory_bytes = amount,
            ("pods", Ok(amount)) => out.pods = amount,
            (_, Ok(amount)) => {
                out.scalar.insert(name.clone(), amount);
            }
        }
    }
    (out, invalid)
}

fn toleration_from(toleration: &core::Toleration) -> Option<Toleration> {
    let operator = match toleration.operator.as_deref() {
        None | Some("" | "Equal") => TolerationOperator::Equal,
        Some("Exists") => TolerationOperator::Exists,
        Some(other) => {
            warn!(operator = other, "ignoring toleration with unknown operator");
            return None;
        }
    };
    let effect = match toleration.effect.as_deref() {
        None | Some("") => None,
        Some(effect) => Some(TaintEffect::parse(effect)?),
    };
    Some(Toleration {
        key: toleration.key.clone().filter(|k| !k.is_empty()),
        operator,
        value: toleration.value.clone(),
        effect,
    })
}

fn host_ports(spec: &core::PodSpec) -> Vec<HostPort> {
    spec.containers
        .iter()
        .flat_map(|c| c.ports.iter().flatten())
        .filter_map(|p| {
            let port = u16::try_from(p.host_port?).ok().filter(|p| *p > 0)?;
            Some(HostPort {
                port,
                protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                host_ip: p.host_ip.clone().unwrap_or_default(),
            })
        })
        .collect()
}

/// Builds a requirement; unknown operators yield one that never matches.
fn requirement(key: &str, operator: &str, values: Option<&Vec<String>>) -> Requirement {
    match SelectorOperator::parse(operator) {
        Some(op) => Requirement::new(key, op).with_values(values.into_iter().flatten().cloned()),
        None => {
            warn!(key, operator, "unknown selector operator, treating as unsatisfiable");
            Requirement::new(key, SelectorOperator::In)
        }
    }
}

fn node_affinity_from(selector: &core::NodeSelector) -> NodeAffinity {
    let terms = selector
        .node_selector_terms
        .iter()
        .map(|term| {
            // field selectors can't be evaluated against labels
            if term.match_fields.as_ref().is_some_and(|f| !f.is_empty()) {
                return NodeSelectorTerm::default();
            }
            NodeSelectorTerm::new(
                term.match_expressions
                    .iter()
                    .flatten()
                    .map(|r| requirement(&r.key, &r.operator, r.values.as_ref()))
                    .collect(),
            )
        })
        .collect();
    NodeAffinity::new(terms)
}

/// Converts a label selector.
pub fn selector_from(selector: &meta::LabelSelector) -> LabelSelector {
    LabelSelector {
        match_labels: selector.match_labels.clone().unwrap_or_default(),
        match_expressions: selector
            .match_expressions
            .iter()
            .flatten()
            .map(|r| requirement(&r.key, &r.operator, r.values.as_ref()))
            .collect(),
    }
}

/// A term without a selector selects no pods and is dropped.
fn affinity_term_from(term: &core::PodAffinityTerm) -> Option<PodAffinityTerm> {
    let selector = selector_from(term.label_selector.as_ref()?);
    Some(
        PodAffinityTerm::new(selector, term.topology_key.clone())
            .with_namespaces(term.namespaces.iter().flatten().cloned()),
    )
}

/// Converts a disruption budget. Budgets without a selector cover no pods
/// and are dropped.
pub fn budget_from(budget: &policy::PodDisruptionBudget) -> Option<PodDisruptionBudget> {
    let name = budget.metadata.name.clone()?;
    let namespace = budget.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
    let selector = selector_from(budget.spec.as_ref()?.selector.as_ref()?);
    let disruptions_allowed = budget
        .status
        .as_ref()
        .map_or(0, |s| s.disruptions_allowed);
    Some(PodDisruptionBudget::new(
        namespace,
        name,
        selector,
        disruptions_allowed,
    ))
}
