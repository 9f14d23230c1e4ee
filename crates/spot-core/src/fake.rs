//! In-memory collaborators for tests and local experiments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::classifier::NodeRole;
use crate::cluster::{ClusterReader, DrainExecutor, DrainResult, MetricsSink};
use crate::error::{ReschedulerError, Result};
use crate::types::{Node, Pod, PodDisruptionBudget};

/// A listing of [`FakeCluster`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    /// Ready nodes.
    Nodes,
    /// Pods.
    Pods,
    /// Pod disruption budgets.
    DisruptionBudgets,
    /// Unschedulable pods.
    UnschedulablePods,
}

impl Listing {
    fn error(self) -> ReschedulerError {
        let reason = "injected failure".to_string();
        match self {
            Self::Nodes => ReschedulerError::ListNodes { reason },
            Self::Pods => ReschedulerError::ListPods { reason },
            Self::DisruptionBudgets => ReschedulerError::ListDisruptionBudgets { reason },
            Self::UnschedulablePods => ReschedulerError::ListUnschedulablePods { reason },
        }
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: Vec<Node>,
    pods: Vec<Pod>,
    budgets: Vec<PodDisruptionBudget>,
    unschedulable: Vec<Pod>,
    failing: HashSet<Listing>,
}

/// A cluster held in memory.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: RwLock<ClusterState>,
}

impl FakeCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node.
    pub fn add_node(&self, node: Node) {
        self.state.write().nodes.push(node);
    }

    /// Adds a pod.
    pub fn add_pod(&self, pod: Pod) {
        self.state.write().pods.push(pod);
    }

    /// Adds a pod disruption budget.
    pub fn add_budget(&self, budget: PodDisruptionBudget) {
        self.state.write().budgets.push(budget);
    }

    /// Adds a pod the scheduler could not place.
    pub fn add_unschedulable(&self, pod: Pod) {
        self.state.write().unschedulable.push(pod);
    }

    /// Removes all unschedulable pods.
    pub fn clear_unschedulable(&self) {
        self.state.write().unschedulable.clear();
    }

    /// Removes a pod by `namespace/name`, returning whether it existed.
    pub fn remove_pod(&self, key: &str) -> bool {
        let mut state = self.state.write();
        let before = state.pods.len();
        state.pods.retain(|p| p.key() != key);
        state.pods.len() != before
    }

    /// Removes a node by name, returning whether it existed.
    pub fn remove_node(&self, name: &str) -> bool {
        let mut state = self.state.write();
        let before = state.nodes.len();
        state.nodes.retain(|n| n.name != name);
        state.nodes.len() != before
    }

    /// Returns the pods bound to a node.
    #[must_use]
    pub fn pods_on(&self, node: &str) -> Vec<Pod> {
        self.state
            .read()
            .pods
            .iter()
            .filter(|p| p.node_name.as_deref() == Some(node))
            .cloned()
            .collect()
    }

    /// Makes a listing fail until [`FakeCluster::heal`] is called.
    pub fn fail(&self, listing: Listing) {
        self.state.write().failing.insert(listing);
    }

    /// Makes every listing succeed again.
    pub fn heal(&self) {
        self.state.write().failing.clear();
    }

    fn check(&self, listing: Listing) -> Result<()> {
        if self.state.read().failing.contains(&listing) {
            return Err(listing.error());
        }
        Ok(())
    }
}

impl ClusterReader for FakeCluster {
    async fn list_ready_nodes(&self) -> Result<Vec<Node>> {
        self.check(Listing::Nodes)?;
        Ok(self
            .state
            .read()
            .nodes
            .iter()
            .filter(|n| !n.unschedulable)
            .cloned()
            .collect())
    }

    async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.check(Listing::Pods)?;
        Ok(self.state.read().pods.clone())
    }

    async fn list_disruption_budgets(&self) -> Result<Vec<PodDisruptionBudget>> {
        self.check(Listing::DisruptionBudgets)?;
        Ok(self.state.read().budgets.clone())
    }

    async fn list_unschedulable_pods(&self) -> Result<Vec<Pod>> {
        self.check(Listing::UnschedulablePods)?;
        Ok(self.state.read().unschedulable.clone())
    }
}

/// A recorded call to [`FakeDrainExecutor::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainCall {
    /// Drained node.
    pub node: String,
    /// `namespace/name` of every pod handed to the executor.
    pub pods: Vec<String>,
    /// Grace period passed.
    pub grace_period: Duration,
    /// Eviction timeout passed.
    pub eviction_timeout: Duration,
}

/// A drain executor that records calls.
///
/// When attached to a [`FakeCluster`], successful drains remove the evicted
/// pods from it.
#[derive(Debug, Default)]
pub struct FakeDrainExecutor {
    calls: RwLock<Vec<DrainCall>>,
    failing: RwLock<Option<String>>,
    cluster: Option<Arc<FakeCluster>>,
}

impl FakeDrainExecutor {
    /// Creates an executor that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes evicted pods from `cluster` on success.
    #[must_use]
    pub fn evicting_from(mut self, cluster: Arc<FakeCluster>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Makes every drain fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failing.write() = Some(reason.into());
    }

    /// Makes drains succeed again.
    pub fn succeed(&self) {
        *self.failing.write() = None;
    }

    /// Returns the recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<DrainCall> {
        self.calls.read().clone()
    }

    /// Returns the names of drained nodes in call order.
    #[must_use]
    pub fn drained_nodes(&self) -> Vec<String> {
        self.calls.read().iter().map(|c| c.node.clone()).collect()
    }
}

impl DrainExecutor for FakeDrainExecutor {
    async fn drain(
        &self,
        node: &Node,
        pods: &[Pod],
        grace_period: Duration,
        eviction_timeout: Duration,
    ) -> Result<()> {
        debug!(node = %node.name, pods = pods.len(), "fake drain");
        self.calls.write().push(DrainCall {
            node: node.name.clone(),
            pods: pods.iter().map(Pod::key).collect(),
            grace_period,
            eviction_timeout,
        });

        if let Some(reason) = self.failing.read().clone() {
            return Err(ReschedulerError::DrainFailed {
                node: node.name.clone(),
                reason,
            });
        }

        if let Some(cluster) = &self.cluster {
            for pod in pods {
                cluster.remove_pod(&pod.key());
            }
        }
        Ok(())
    }
}

/// A metrics sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn record_node_count(&self, _role: NodeRole, _count: usize) {}

    fn record_node_pod_count(&self, _role: NodeRole, _node: &str, _count: usize) {}

    fn reset_node_pod_counts(&self) {}

    fn record_drain_outcome(&self, _result: DrainResult, _node: &str) {}

    fn record_cycle(&self, _outcome: &str, _duration: Duration) {}
}

/// A metrics sink that keeps the latest values in memory.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    node_counts: RwLock<HashMap<NodeRole, usize>>,
    pod_counts: RwLock<HashMap<(NodeRole, String), usize>>,
    drains: RwLock<Vec<(DrainResult, String)>>,
    cycles: RwLock<Vec<String>>,
}

impl RecordingMetricsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last node count recorded for a role.
    #[must_use]
    pub fn node_count(&self, role: NodeRole) -> Option<usize> {
        self.node_counts.read().get(&role).copied()
    }

    /// Returns the last pod count recorded for a node.
    #[must_use]
    pub fn pod_count(&self, role: NodeRole, node: &str) -> Option<usize> {
        self.pod_counts
            .read()
            .get(&(role, node.to_string()))
            .copied()
    }

    /// Returns every drain outcome in recording order.
    #[must_use]
    pub fn drains(&self) -> Vec<(DrainResult, String)> {
        self.drains.read().clone()
    }

    /// Returns every cycle outcome label in recording order.
    #[must_use]
    pub fn cycles(&self) -> Vec<String> {
        self.cycles.read().clone()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record_node_count(&self, role: NodeRole, count: usize) {
        self.node_counts.write().insert(role, count);
    }

    fn record_node_pod_count(&self, role: NodeRole, node: &str, count: usize) {
        self.pod_counts
            .write()
            .insert((role, node.to_string()), count);
    }

    fn reset_node_pod_counts(&self) {
        self.pod_counts.write().clear();
    }

    fn record_drain_outcome(&self, result: DrainResult, node: &str) {
        self.drains.write().push((result, node.to_string()));
    }

    fn record_cycle(&self, outcome: &str, _duration: Duration) {
        self.cycles.write().push(outcome.to_string());
    }
}
