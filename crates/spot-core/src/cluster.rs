//! Collaborator seams of the control loop.
//!
//! Implement these traits to connect the loop to a real cluster:
//! - [`ClusterReader`]: listings of nodes, pods and budgets
//! - [`DrainExecutor`]: evicts the pods of a node
//! - [`MetricsSink`]: receives per-node counts and drain outcomes

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::NodeRole;
use crate::error::Result;
use crate::types::{Node, Pod, PodDisruptionBudget};

/// Read access to cluster state.
///
/// Every listing returns the complete current set or an error, never a
/// partial result.
#[allow(async_fn_in_trait)]
pub trait ClusterReader: Send + Sync {
    /// Lists nodes that are ready and schedulable.
    fn list_ready_nodes(&self) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// Lists pods across all namespaces.
    fn list_pods(&self) -> impl Future<Output = Result<Vec<Pod>>> + Send;

    /// Lists pod disruption budgets across all namespaces.
    fn list_disruption_budgets(&self) -> impl Future<Output = Result<Vec<PodDisruptionBudget>>> + Send;

    /// Lists pods the scheduler failed to place.
    fn list_unschedulable_pods(&self) -> impl Future<Output = Result<Vec<Pod>>> + Send;
}

/// Evicts the pods of a node.
#[allow(async_fn_in_trait)]
pub trait DrainExecutor: Send + Sync {
    /// Evicts `pods` from `node`, retrying internally.
    ///
    /// Each pod gets at most `grace_period` to terminate; each eviction is
    /// retried for at most `eviction_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if any pod could not be evicted or did not terminate.
    fn drain(
        &self,
        node: &Node,
        pods: &[Pod],
        grace_period: Duration,
        eviction_timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Outcome of a drain attempt as reported to metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainResult {
    /// Every pod was evicted.
    Success,
    /// The drain failed.
    Failure,
}

impl DrainResult {
    /// Returns the metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for DrainResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget metrics recording.
pub trait MetricsSink: Send + Sync {
    /// Records how many nodes of a role were listed.
    fn record_node_count(&self, role: NodeRole, count: usize);

    /// Records how many relocatable pods run on a node.
    fn record_node_pod_count(&self, role: NodeRole, node: &str, count: usize);

    /// Forgets every per-node pod count, ahead of recording a fresh snapshot.
    fn reset_node_pod_counts(&self);

    /// Records the outcome of a drain attempt.
    fn record_drain_outcome(&self, result: DrainResult, node: &str);

    /// Records a finished cycle.
    fn record_cycle(&self, outcome: &str, duration: Duration);
}

impl<T: ClusterReader> ClusterReader for Arc<T> {
    fn list_ready_nodes(&self) -> impl Future<Output = Result<Vec<Node>>> + Send {
        (**self).list_ready_nodes()
    }

    fn list_pods(&self) -> impl Future<Output = Result<Vec<Pod>>> + Send {
        (**self).list_pods()
    }

    fn list_disruption_budgets(&self) -> impl Future<Output = Result<Vec<PodDisruptionBudget>>> + Send {
        (**self).list_disruption_budgets()
    }

    fn list_unschedulable_pods(&self) -> impl Future<Output = Result<Vec<Pod>>> + Send {
        (**self).list_unschedulable_pods()
    }
}

impl<T: DrainExecutor> DrainExecutor for Arc<T> {
    fn drain(
        &self,
        node: &Node,
        pods: &[Pod],
        grace_period: Duration,
        eviction_timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).drain(node, pods, grace_period, eviction_timeout)
    }
}

impl<T: MetricsSink + ?Sized> MetricsSink for Arc<T> {
    fn record_node_count(&self, role: NodeRole, count: usize) {
        (**self).record_node_count(role, count);
    }

    fn record_node_pod_count(&self, role: NodeRole, node: &str, count: usize) {
        (**self).record_node_pod_count(role, node, count);
    }

    fn reset_node_pod_counts(&self) {
        (**self).reset_node_pod_counts();
    }

    fn record_drain_outcome(&self, result: DrainResult, node: &str) {
        (**self).record_drain_outcome(result, node);
    }

    fn record_cycle(&self, outcome: &str, duration: Duration) {
        (**self).record_cycle(outcome, duration);
    }
}
