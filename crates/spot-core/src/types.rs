//! Core cluster object types.
//!
//! This module provides the snapshot view of cluster objects the planner
//! works on:
//! - [`Resources`]: CPU, memory and pod-slot quantities
//! - [`Node`]: a ready node with its labels, taints and allocatable capacity
//! - [`Pod`]: a pod with its requests and scheduling constraints
//! - [`PodDisruptionBudget`]: how many pods of a set may be disrupted

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::selector::{Labels, LabelSelector, NodeAffinity, PodAffinityTerm, Taint, Toleration};

/// Annotation marking a mirror pod created by the kubelet for a static pod.
pub const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

/// Well-known node label holding the node's hostname.
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Compute resource quantities.
///
/// Anything other than CPU, memory and pod slots (extended resources such as
/// `nvidia.com/gpu`, `ephemeral-storage`, `hugepages-2Mi`) is kept by name in
/// [`Resources::scalar`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resources {
    /// CPU in millicores.
    pub cpu_millis: u64,
    /// Memory in bytes.
    pub memory_bytes: u64,
    /// Number of pod slots.
    pub pods: u64,
    /// Other named resources, in whole units.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scalar: BTreeMap<String, u64>,
}

impl Resources {
    /// Creates an empty resource set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cpu_millis: 0,
            memory_bytes: 0,
            pods: 0,
            scalar: BTreeMap::new(),
        }
    }

    /// Sets CPU in millicores.
    #[must_use]
    pub const fn with_cpu_millis(mut self, millis: u64) -> Self {
        self.cpu_millis = millis;
        self
    }

    /// Sets memory in bytes.
    #[must_use]
    pub const fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Sets memory in mebibytes.
    #[must_use]
    pub const fn with_memory_mib(mut self, mib: u64) -> Self {
        self.memory_bytes = mib * 1024 * 1024;
        self
    }

    /// Sets the number of pod slots.
    #[must_use]
    pub const fn with_pods(mut self, pods: u64) -> Self {
        self.pods = pods;
        self
    }

    /// Sets a named scalar resource.
    #[must_use]
    pub fn with_scalar(mut self, name: impl Into<String>, amount: u64) -> Self {
        self.scalar.insert(name.into(), amount);
        self
    }

    /// Returns the amount of a scalar resource; absent means zero.
    #[must_use]
    pub fn scalar(&self, name: &str) -> u64 {
        self.scalar.get(name).copied().unwrap_or(0)
    }

    /// Adds two resource sets, saturating at the numeric bounds.
    #[must_use]
    pub fn saturating_add(&self, other: &Self) -> Self {
        let mut scalar = self.scalar.clone();
        for (name, amount) in &other.scalar {
            let entry = scalar.entry(name.clone()).or_insert(0);
            *entry = entry.saturating_add(*amount);
        }
        Self {
            cpu_millis: self.cpu_millis.saturating_add(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
            pods: self.pods.saturating_add(other.pods),
            scalar,
        }
    }

    /// Subtracts `other`, flooring every dimension at zero.
    #[must_use]
    pub fn saturating_sub(&self, other: &Self) -> Self {
        Self {
            cpu_millis: self.cpu_millis.saturating_sub(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
            pods: self.pods.saturating_sub(other.pods),
            scalar: self
                .scalar
                .iter()
                .map(|(name, amount)| (name.clone(), amount.saturating_sub(other.scalar(name))))
                .collect(),
        }
    }

    /// Returns the per-dimension maximum of both sets.
    #[must_use]
    pub fn max_each(&self, other: &Self) -> Self {
        let mut scalar = self.scalar.clone();
        for (name, amount) in &other.scalar {
            let entry = scalar.entry(name.clone()).or_insert(0);
            *entry = (*entry).max(*amount);
        }
        Self {
            cpu_millis: self.cpu_millis.max(other.cpu_millis),
            memory_bytes: self.memory_bytes.max(other.memory_bytes),
            pods: self.pods.max(other.pods),
            scalar,
        }
    }

    /// Returns true if CPU, memory and every scalar resource fit within
    /// `capacity`. A scalar the capacity does not list counts as zero.
    ///
    /// Pod slots are checked separately since pods never request them.
    #[must_use]
    pub fn fits_within(&self, capacity: &Self) -> bool {
        self.cpu_millis <= capacity.cpu_millis
            && self.memory_bytes <= capacity.memory_bytes
            && self
                .scalar
                .iter()
                .all(|(name, amount)| *amount <= capacity.scalar(name))
    }
}

impl Add for Resources {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(&rhs)
    }
}

impl Add<&Resources> for Resources {
    type Output = Self;

    fn add(self, rhs: &Resources) -> Self {
        self.saturating_add(rhs)
    }
}

impl AddAssign<&Resources> for Resources {
    fn add_assign(&mut self, rhs: &Resources) {
        *self = self.saturating_add(rhs);
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={}m memory={}B pods={}",
            self.cpu_millis, self.memory_bytes, self.pods
        )?;
        for (name, amount) in &self.scalar {
            write!(f, " {name}={amount}")?;
        }
        Ok(())
    }
}

/// A node as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node name.
    pub name: String,
    /// Node labels.
    pub labels: Labels,
    /// Node taints.
    pub taints: Vec<Taint>,
    /// Allocatable capacity.
    pub allocatable: Resources,
    /// Whether the node is cordoned.
    pub unschedulable: bool,
}

impl Node {
    /// Creates a schedulable node with no labels and no capacity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            taints: Vec::new(),
            allocatable: Resources::new(),
            unschedulable: false,
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds a taint.
    #[must_use]
    pub fn with_taint(mut self, taint: Taint) -> Self {
        self.taints.push(taint);
        self
    }

    /// Sets allocatable capacity.
    #[must_use]
    pub fn with_allocatable(mut self, allocatable: Resources) -> Self {
        self.allocatable = allocatable;
        self
    }

    /// Marks the node as cordoned.
    #[must_use]
    pub const fn cordoned(mut self) -> Self {
        self.unschedulable = true;
        self
    }

    /// Returns true if the node carries the label key, whatever its value.
    #[must_use]
    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }

    /// Returns the topology domain of this node for the given key.
    ///
    /// The hostname key falls back to the node name when the label is missing.
    #[must_use]
    pub fn topology_value(&self, key: &str) -> Option<&str> {
        match self.labels.get(key) {
            Some(v) => Some(v.as_str()),
            None if key == HOSTNAME_LABEL => Some(self.name.as_str()),
            None => None,
        }
    }
}

/// Lifecycle phase of a pod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    /// Accepted but not all containers are running.
    #[default]
    Pending,
    /// Bound and at least one container running.
    Running,
    /// All containers terminated successfully.
    Succeeded,
    /// All containers terminated, at least one failed.
    Failed,
    /// State could not be obtained.
    Unknown,
}

impl PodPhase {
    /// Parses the phase from its Kubernetes name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Pending" => Self::Pending,
            _ => Self::Unknown,
        }
    }

    /// Returns true for phases a pod never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Reference to the object that owns a pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerReference {
    /// Kind of the owner, e.g. `ReplicaSet`.
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// Whether the owner is the managing controller.
    pub controller: bool,
}

impl OwnerReference {
    /// Creates a controller owner reference.
    #[must_use]
    pub fn controller(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            controller: true,
        }
    }
}

/// A host port claimed by a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    /// Port number on the host.
    pub port: u16,
    /// Protocol, e.g. `TCP`.
    pub protocol: String,
    /// Host IP; `0.0.0.0` binds all addresses.
    pub host_ip: String,
}

impl HostPort {
    /// Creates a TCP host port bound to all addresses.
    #[must_use]
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: "TCP".to_string(),
            host_ip: "0.0.0.0".to_string(),
        }
    }

    /// Returns true if both ports cannot be bound on the same host.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        let wildcard = |ip: &str| ip.is_empty() || ip == "0.0.0.0";
        self.port == other.port
            && self.protocol == other.protocol
            && (self.host_ip == other.host_ip || wildcard(&self.host_ip) || wildcard(&other.host_ip))
    }
}

/// A pod as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
    /// Unique ID assigned by the API server.
    pub uid: String,
    /// Node the pod is bound to.
    pub node_name: Option<String>,
    /// Pod labels.
    pub labels: Labels,
    /// Pod annotations.
    pub annotations: Labels,
    /// Owner references.
    pub owners: Vec<OwnerReference>,
    /// Summed container requests. The `pods` field is unused.
    pub requests: Resources,
    /// Required node labels.
    pub node_selector: Labels,
    /// Required node affinity.
    pub node_affinity: NodeAffinity,
    /// Required pod affinity terms.
    pub affinity: Vec<PodAffinityTerm>,
    /// Required pod anti-affinity terms.
    pub anti_affinity: Vec<PodAffinityTerm>,
    /// Tolerations.
    pub tolerations: Vec<Toleration>,
    /// Host ports claimed by containers.
    pub host_ports: Vec<HostPort>,
    /// Lifecycle phase.
    pub phase: PodPhase,
    /// Whether a deletion timestamp is set.
    pub terminating: bool,
    /// Requested graceful termination period.
    pub termination_grace_period: Option<Duration>,
    /// Set when the requests could not be read, so the pod's real demand
    /// is unknown.
    pub request_error: Option<String>,
}

impl Pod {
    /// Creates a running, unbound pod with no requests.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        Self {
            uid: format!("{namespace}/{name}"),
            namespace,
            name,
            node_name: None,
            labels: Labels::new(),
            annotations: Labels::new(),
            owners: Vec::new(),
            requests: Resources::new(),
            node_selector: Labels::new(),
            node_affinity: NodeAffinity::default(),
            affinity: Vec::new(),
            anti_affinity: Vec::new(),
            tolerations: Vec::new(),
            host_ports: Vec::new(),
            phase: PodPhase::Running,
            terminating: false,
            termination_grace_period: None,
            request_error: None,
        }
    }

    /// Sets the UID.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Binds the pod to a node.
    #[must_use]
    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.node_name = Some(node.into());
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Adds an owner reference.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owners.push(owner);
        self
    }

    /// Sets resource requests.
    #[must_use]
    pub fn with_requests(mut self, requests: Resources) -> Self {
        self.requests = requests;
        self
    }

    /// Adds a required node label.
    #[must_use]
    pub fn with_node_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.node_selector.insert(key.into(), value.into());
        self
    }

    /// Sets required node affinity.
    #[must_use]
    pub fn with_node_affinity(mut self, affinity: NodeAffinity) -> Self {
        self.node_affinity = affinity;
        self
    }

    /// Adds a required affinity term.
    #[must_use]
    pub fn with_affinity(mut self, term: PodAffinityTerm) -> Self {
        self.affinity.push(term);
        self
    }

    /// Adds a required anti-affinity term.
    #[must_use]
    pub fn with_anti_affinity(mut self, term: PodAffinityTerm) -> Self {
        self.anti_affinity.push(term);
        self
    }

    /// Adds a toleration.
    #[must_use]
    pub fn with_toleration(mut self, toleration: Toleration) -> Self {
        self.tolerations.push(toleration);
        self
    }

    /// Adds a host port.
    #[must_use]
    pub fn with_host_port(mut self, port: HostPort) -> Self {
        self.host_ports.push(port);
        self
    }

    /// Sets the phase.
    #[must_use]
    pub const fn with_phase(mut self, phase: PodPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Marks the pod as being deleted.
    #[must_use]
    pub const fn terminating(mut self) -> Self {
        self.terminating = true;
        self
    }

    /// Sets the requested graceful termination period.
    #[must_use]
    pub const fn with_termination_grace_period(mut self, grace: Duration) -> Self {
        self.termination_grace_period = Some(grace);
        self
    }

    /// Records that the requests could not be read.
    #[must_use]
    pub fn with_request_error(mut self, reason: impl Into<String>) -> Self {
        self.request_error = Some(reason.into());
        self
    }

    /// Returns the grace period to evict with: the pod's own, capped at `max`.
    #[must_use]
    pub fn grace_period(&self, max: Duration) -> Duration {
        self.termination_grace_period.map_or(max, |grace| grace.min(max))
    }

    /// Returns `namespace/name`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Returns a copy with the node binding cleared, as if never scheduled.
    #[must_use]
    pub fn unbound(&self) -> Self {
        Self {
            node_name: None,
            ..self.clone()
        }
    }

    /// Returns the managing controller, if any.
    #[must_use]
    pub fn controller(&self) -> Option<&OwnerReference> {
        self.owners.iter().find(|o| o.controller)
    }

    /// Returns true for kubelet mirror pods.
    #[must_use]
    pub fn is_mirror(&self) -> bool {
        self.annotations.contains_key(MIRROR_POD_ANNOTATION)
    }

    /// Returns true if a `DaemonSet` manages the pod.
    #[must_use]
    pub fn is_daemon_set_pod(&self) -> bool {
        self.controller().is_some_and(|o| o.kind == "DaemonSet")
    }

    /// Returns true if the pod is finished or going away.
    #[must_use]
    pub const fn is_terminal_or_terminating(&self) -> bool {
        self.terminating || self.phase.is_terminal()
    }
}

impl fmt::Display for Pod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A pod disruption budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodDisruptionBudget {
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
    /// Pods covered by the budget.
    pub selector: LabelSelector,
    /// Disruptions currently allowed, from the budget status.
    pub disruptions_allowed: i32,
}

impl PodDisruptionBudget {
    /// Creates a budget.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        selector: LabelSelector,
        disruptions_allowed: i32,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            selector,
            disruptions_allowed,
        }
    }

    /// Returns `namespace/name`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Returns true if the budget covers the pod.
    #[must_use]
    pub fn covers(&self, pod: &Pod) -> bool {
        self.namespace == pod.namespace && self.selector.matches(&pod.labels)
    }
}
