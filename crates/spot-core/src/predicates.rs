//! Scheduling feasibility checks against a simulated node.
//!
//! [`PredicateChecker::check`] answers "could the scheduler bind this pod to
//! this node, given the pods already attributed to it?". It is pure: the
//! node info may be a planning copy carrying tentative placements.

use thiserror::Error;

use crate::node_info::NodeInfo;
use crate::selector::PodAffinityTerm;
use crate::types::{HOSTNAME_LABEL, Pod, Resources};

/// Why a pod does not fit a node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredicateFailure {
    /// The pod still names a node; callers must pass an unbound copy.
    #[error("pod is still bound to node {node}")]
    StaleBinding {
        /// Node the pod is bound to.
        node: String,
    },

    /// The node is cordoned.
    #[error("node is unschedulable")]
    NodeUnschedulable,

    /// The node has no free pod slot.
    #[error("node already runs {count} of {capacity} pods")]
    TooManyPods {
        /// Pods attributed to the node.
        count: usize,
        /// Allocatable pod slots.
        capacity: u64,
    },

    /// The requests of a pod involved could not be read.
    #[error("requests of pod {pod} are unknown: {reason}")]
    UnknownRequests {
        /// The pod with unreadable requests.
        pod: String,
        /// Why they could not be read.
        reason: String,
    },

    /// CPU, memory or scalar requests exceed what is free.
    #[error("insufficient resources: requested {requested}, free {free}")]
    InsufficientResources {
        /// Requests of the pod.
        requested: Resources,
        /// Free capacity on the node.
        free: Resources,
    },

    /// The node lacks a label required by the pod's node selector.
    #[error("node selector {key}={value} not satisfied")]
    NodeSelectorMismatch {
        /// Required label key.
        key: String,
        /// Required label value.
        value: String,
    },

    /// No required node affinity term matches.
    #[error("node affinity not satisfied")]
    NodeAffinityMismatch,

    /// The pod does not tolerate a scheduling taint.
    #[error("untolerated taint {key}")]
    UntoleratedTaint {
        /// Taint key.
        key: String,
    },

    /// A host port is already in use on the node.
    #[error("host port {port} already in use")]
    HostPortConflict {
        /// Conflicting port.
        port: u16,
    },

    /// A required anti-affinity term is violated.
    #[error("anti-affinity with pod {pod} on topology {topology_key}")]
    AntiAffinity {
        /// The conflicting pod.
        pod: String,
        /// Topology key of the violated term.
        topology_key: String,
    },

    /// No pod on the node satisfies a required affinity term.
    #[error("affinity on topology {topology_key} not satisfied")]
    AffinityUnsatisfied {
        /// Topology key of the unmet term.
        topology_key: String,
    },

    /// Affinity spans nodes outside the simulated one and can't be verified.
    #[error("affinity on topology {topology_key} can't be verified on a single node")]
    UnverifiableAffinity {
        /// Topology key of the term.
        topology_key: String,
    },

    /// Anti-affinity spans nodes outside the simulated one and can't be verified.
    #[error("anti-affinity on topology {topology_key} can't be verified on a single node")]
    UnverifiableAntiAffinity {
        /// Topology key of the term.
        topology_key: String,
    },
}

/// Checks whether a pod could be scheduled onto a node.
pub trait PredicateChecker: Send + Sync {
    /// Returns the first failing predicate, or `Ok` if the pod fits.
    ///
    /// # Errors
    ///
    /// Returns the reason the pod does not fit.
    fn check(&self, pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure>;

    /// Returns true if the pod fits.
    fn fits(&self, pod: &Pod, node: &NodeInfo) -> bool {
        self.check(pod, node).is_ok()
    }
}

/// Resource, selector, taint, port, affinity and anti-affinity checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPredicateChecker;

impl DefaultPredicateChecker {
    /// Creates the checker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn check_pod_count(node: &NodeInfo) -> Result<(), PredicateFailure> {
        let capacity = node.node().allocatable.pods;
        let count = node.pod_count();
        if capacity > 0 && count as u64 >= capacity {
            return Err(PredicateFailure::TooManyPods { count, capacity });
        }
        Ok(())
    }

    fn check_known_requests(pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure> {
        let unknown = std::iter::once(pod)
            .chain(node.pods())
            .find_map(|p| p.request_error.as_ref().map(|reason| (p, reason)));
        match unknown {
            Some((p, reason)) => Err(PredicateFailure::UnknownRequests {
                pod: p.key(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn check_resources(pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure> {
        let needed = node.requested() + &pod.requests;
        if needed.fits_within(&node.node().allocatable) {
            return Ok(());
        }
        Err(PredicateFailure::InsufficientResources {
            requested: pod.requests.clone(),
            free: node.free(),
        })
    }

    fn check_node_selector(pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure> {
        let labels = &node.node().labels;
        for (key, value) in &pod.node_selector {
            if labels.get(key) != Some(value) {
                return Err(PredicateFailure::NodeSelectorMismatch {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }
        if !pod.node_affinity.matches(labels) {
            return Err(PredicateFailure::NodeAffinityMismatch);
        }
        Ok(())
    }

    fn check_taints(pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure> {
        let untolerated = node
            .node()
            .taints
            .iter()
            .filter(|t| t.effect.blocks_scheduling())
            .find(|t| !pod.tolerations.iter().any(|tol| tol.tolerates(t)));
        match untolerated {
            Some(taint) => Err(PredicateFailure::UntoleratedTaint {
                key: taint.key.clone(),
            }),
            None => Ok(()),
        }
    }

    fn check_host_ports(pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure> {
        for wanted in &pod.host_ports {
            let used = node
                .pods()
                .iter()
                .flat_map(|p| p.host_ports.iter())
                .any(|p| p.conflicts_with(wanted));
            if used {
                return Err(PredicateFailure::HostPortConflict { port: wanted.port });
            }
        }
        Ok(())
    }

    /// A term is met by a selected pod on this very node, whatever the key.
    /// Without one, a hostname term is unmet and any wider domain is unknown.
    fn check_affinity(pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure> {
        for term in &pod.affinity {
            let met = node.node().topology_value(&term.topology_key).is_some()
                && node
                    .pods()
                    .iter()
                    .any(|p| term.selects(&pod.namespace, &p.namespace, &p.labels));
            if met {
                continue;
            }
            let topology_key = term.topology_key.clone();
            if term.topology_key == HOSTNAME_LABEL
                || node.node().topology_value(&term.topology_key).is_none()
            {
                return Err(PredicateFailure::AffinityUnsatisfied { topology_key });
            }
            return Err(PredicateFailure::UnverifiableAffinity { topology_key });
        }
        Ok(())
    }

    fn check_anti_affinity(pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure> {
        let in_domain = |term: &PodAffinityTerm| node.node().topology_value(&term.topology_key).is_some();

        for term in pod.anti_affinity.iter().filter(|t| in_domain(t)) {
            if let Some(existing) = node
                .pods()
                .iter()
                .find(|p| term.selects(&pod.namespace, &p.namespace, &p.labels))
            {
                return Err(PredicateFailure::AntiAffinity {
                    pod: existing.key(),
                    topology_key: term.topology_key.clone(),
                });
            }
        }
        for existing in node.pods() {
            for term in existing.anti_affinity.iter().filter(|t| in_domain(t)) {
                if term.selects(&existing.namespace, &pod.namespace, &pod.labels) {
                    return Err(PredicateFailure::AntiAffinity {
                        pod: existing.key(),
                        topology_key: term.topology_key.clone(),
                    });
                }
            }
        }
        // wider domains include pods on nodes this check can't see
        if let Some(term) = pod
            .anti_affinity
            .iter()
            .find(|t| t.topology_key != HOSTNAME_LABEL && in_domain(t))
        {
            return Err(PredicateFailure::UnverifiableAntiAffinity {
                topology_key: term.topology_key.clone(),
            });
        }
        Ok(())
    }
}

impl PredicateChecker for DefaultPredicateChecker {
    fn check(&self, pod: &Pod, node: &NodeInfo) -> Result<(), PredicateFailure> {
        if let Some(bound) = &pod.node_name {
            return Err(PredicateFailure::StaleBinding {
                node: bound.clone(),
            });
        }
        if node.node().unschedulable {
            return Err(PredicateFailure::NodeUnschedulable);
        }
        Self::check_known_requests(pod, node)?;
        Self::check_pod_count(node)?;
        Self::check_resources(pod, node)?;
        Self::check_node_selector(pod, node)?;
        Self::check_taints(pod, node)?;
        Self::check_host_ports(pod, node)?;
        Self::check_affinity(pod, node)?;
        Self::check_anti_affinity(pod, node)
    }
}
