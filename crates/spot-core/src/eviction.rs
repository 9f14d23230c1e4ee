//! Selection of the pods that must move before a node can be drained.

use tracing::debug;

use crate::error::{ReschedulerError, Result};
use crate::types::{Pod, PodDisruptionBudget};

/// Picks the relocatable workload of a node.
pub trait EvictionFilter: Send + Sync {
    /// Returns the pods that would have to be evicted to drain a node, in
    /// input order.
    ///
    /// # Errors
    ///
    /// Returns an error if some pod makes the node undrainable, e.g. an
    /// unreplicated pod or an exhausted disruption budget.
    fn pods_to_evict(&self, pods: &[Pod], budgets: &[PodDisruptionBudget]) -> Result<Vec<Pod>>;
}

/// Drain candidate selection with default, non-strict flags.
///
/// Mirror pods, `DaemonSet` pods and pods that are finished or already being
/// deleted are left alone. System pods and pods with local storage are
/// treated like any other workload.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvictionFilter;

impl DefaultEvictionFilter {
    /// Creates the filter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn is_relocatable(pod: &Pod) -> bool {
        if pod.is_mirror() {
            debug!(pod = %pod, "skipping mirror pod");
            return false;
        }
        if pod.is_daemon_set_pod() {
            debug!(pod = %pod, "skipping daemon set pod");
            return false;
        }
        if pod.is_terminal_or_terminating() {
            debug!(pod = %pod, "skipping finished or terminating pod");
            return false;
        }
        true
    }
}

impl EvictionFilter for DefaultEvictionFilter {
    fn pods_to_evict(&self, pods: &[Pod], budgets: &[PodDisruptionBudget]) -> Result<Vec<Pod>> {
        let candidates: Vec<Pod> = pods
            .iter()
            .filter(|pod| Self::is_relocatable(pod))
            .cloned()
            .collect();

        for pod in &candidates {
            if pod.controller().is_none() {
                return Err(ReschedulerError::PodNotReplicated { pod: pod.key() });
            }
            if let Some(budget) = budgets
                .iter()
                .find(|b| b.covers(pod) && b.disruptions_allowed < 1)
            {
                return Err(ReschedulerError::DisruptionBudgetExhausted {
                    pod: pod.key(),
                    budget: budget.key(),
                });
            }
        }

        Ok(candidates)
    }
}
