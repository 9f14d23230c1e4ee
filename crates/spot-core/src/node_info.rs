//! Per-cycle snapshot of nodes and the pods attributed to them.
//!
//! A [`NodeMap`] is rebuilt from a full listing at the start of every cycle
//! and dropped at the end of it. The planner never mutates it: it works on a
//! [`NodeInfoArray::deep_copy`] instead.

use std::collections::HashMap;

use serde::Serialize;

use crate::classifier::{NodeClassifier, NodeRole};
use crate::types::{Node, Pod, Resources};

/// A node together with the pods bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    node: Node,
    pods: Vec<Pod>,
}

impl NodeInfo {
    /// Creates a node info with no pods.
    #[must_use]
    pub fn new(node: Node) -> Self {
        Self {
            node,
            pods: Vec::new(),
        }
    }

    /// Creates a node info with the given pods.
    #[must_use]
    pub fn with_pods(node: Node, pods: Vec<Pod>) -> Self {
        Self { node, pods }
    }

    /// Returns the node.
    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Returns the pods attributed to the node, in attribution order.
    #[must_use]
    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    /// Returns the number of pods attributed to the node.
    #[must_use]
    pub fn pod_count(&self) -> usize {
        self.pods.len()
    }

    /// Appends a pod, e.g. a tentative placement on a planning copy.
    pub fn add_pod(&mut self, pod: Pod) {
        self.pods.push(pod);
    }

    /// Sum of the requests of all attributed pods; `pods` holds the pod count.
    #[must_use]
    pub fn requested(&self) -> Resources {
        let mut total = self
            .pods
            .iter()
            .fold(Resources::new(), |acc, pod| acc + &pod.requests);
        total.pods = self.pods.len() as u64;
        total
    }

    /// Allocatable capacity not yet requested.
    #[must_use]
    pub fn free(&self) -> Resources {
        self.node.allocatable.saturating_sub(&self.requested())
    }
}

/// An ordered sequence of node infos sharing one role.
///
/// Order is placement priority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeInfoArray(Vec<NodeInfo>);

impl NodeInfoArray {
    /// Creates an empty array.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a node info.
    pub fn push(&mut self, info: NodeInfo) {
        self.0.push(info);
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in placement order.
    pub fn iter(&self) -> std::slice::Iter<'_, NodeInfo> {
        self.0.iter()
    }

    /// Iterates mutably in placement order.
    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, NodeInfo> {
        self.0.iter_mut()
    }

    /// Returns the node info at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&NodeInfo> {
        self.0.get(index)
    }

    /// Finds a node info by node name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&NodeInfo> {
        self.0.iter().find(|info| info.name() == name)
    }

    /// Returns the node names in placement order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(NodeInfo::name).collect()
    }

    /// Returns an independent copy whose pod collections share no storage
    /// with this array.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|info| NodeInfo::with_pods(info.node.clone(), info.pods.clone()))
                .collect(),
        )
    }

    /// Stable sort by requested CPU, busiest node first.
    fn sort_by_requested_cpu_desc(&mut self) {
        self.0
            .sort_by_key(|info| std::cmp::Reverse(info.requested().cpu_millis));
    }
}

impl FromIterator<NodeInfo> for NodeInfoArray {
    fn from_iter<I: IntoIterator<Item = NodeInfo>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a NodeInfoArray {
    type Item = &'a NodeInfo;
    type IntoIter = std::slice::Iter<'a, NodeInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Managed nodes grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeMap {
    on_demand: NodeInfoArray,
    spot: NodeInfoArray,
    ignored: usize,
}

impl NodeMap {
    /// Builds the map from a node listing and a pod listing.
    ///
    /// Pods are attributed to the node named in their binding; unbound pods,
    /// finished pods and pods on unlisted nodes are dropped. On-demand nodes
    /// keep listing order. Spot nodes are ordered busiest first by requested
    /// CPU so placements fill fuller nodes before emptier ones.
    #[must_use]
    pub fn build(classifier: &NodeClassifier, nodes: Vec<Node>, pods: Vec<Pod>) -> Self {
        let mut by_node: HashMap<String, Vec<Pod>> = HashMap::new();
        for pod in pods {
            if pod.phase.is_terminal() {
                continue;
            }
            if let Some(node_name) = pod.node_name.clone() {
                by_node.entry(node_name).or_default().push(pod);
            }
        }

        let mut map = Self::default();
        for node in nodes {
            let role = classifier.classify(&node);
            let pods = by_node.remove(&node.name).unwrap_or_default();
            let info = NodeInfo::with_pods(node, pods);
            match role {
                NodeRole::OnDemand => map.on_demand.push(info),
                NodeRole::Spot => map.spot.push(info),
                NodeRole::Other => map.ignored += 1,
            }
        }
        map.spot.sort_by_requested_cpu_desc();
        map
    }

    /// Returns the array for a role; `Other` nodes are not tracked.
    #[must_use]
    pub const fn get(&self, role: NodeRole) -> Option<&NodeInfoArray> {
        match role {
            NodeRole::OnDemand => Some(&self.on_demand),
            NodeRole::Spot => Some(&self.spot),
            NodeRole::Other => None,
        }
    }

    /// Returns the on-demand nodes in listing order.
    #[must_use]
    pub const fn on_demand(&self) -> &NodeInfoArray {
        &self.on_demand
    }

    /// Returns the spot nodes in placement order.
    #[must_use]
    pub const fn spot(&self) -> &NodeInfoArray {
        &self.spot
    }

    /// Returns the number of listed nodes that are neither on-demand nor spot.
    #[must_use]
    pub const fn ignored(&self) -> usize {
        self.ignored
    }
}
