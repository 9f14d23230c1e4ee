//! Error types for the rescheduler core.

use thiserror::Error;

/// Result type for rescheduler operations.
pub type Result<T> = std::result::Result<T, ReschedulerError>;

/// Errors that can occur while planning or executing a drain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReschedulerError {
    /// Listing ready nodes failed.
    #[error("failed to list nodes: {reason}")]
    ListNodes {
        /// Underlying failure.
        reason: String,
    },

    /// Listing pods failed.
    #[error("failed to list pods: {reason}")]
    ListPods {
        /// Underlying failure.
        reason: String,
    },

    /// Listing pod disruption budgets failed.
    #[error("failed to list pod disruption budgets: {reason}")]
    ListDisruptionBudgets {
        /// Underlying failure.
        reason: String,
    },

    /// Listing unschedulable pods failed.
    #[error("failed to list unschedulable pods: {reason}")]
    ListUnschedulablePods {
        /// Underlying failure.
        reason: String,
    },

    /// A pod has no controller that would recreate it after eviction.
    #[error("pod {pod} is not replicated")]
    PodNotReplicated {
        /// The `namespace/name` of the pod.
        pod: String,
    },

    /// A pod disruption budget does not allow another disruption.
    #[error("pod {pod} is protected by disruption budget {budget}")]
    DisruptionBudgetExhausted {
        /// The `namespace/name` of the pod.
        pod: String,
        /// The `namespace/name` of the budget.
        budget: String,
    },

    /// No spot node can accept the pod.
    #[error("pod {pod} can't be rescheduled on any existing spot node")]
    Unplaceable {
        /// The `namespace/name` of the pod.
        pod: String,
    },

    /// Draining a node failed.
    #[error("failed to drain node {node}: {reason}")]
    DrainFailed {
        /// Name of the node.
        node: String,
        /// Description of the failure.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of why the configuration is invalid.
        reason: String,
    },
}

impl ReschedulerError {
    /// Returns true if this error prevents draining a single node only.
    #[must_use]
    pub const fn is_node_scoped(&self) -> bool {
        matches!(
            self,
            Self::PodNotReplicated { .. }
                | Self::DisruptionBudgetExhausted { .. }
                | Self::Unplaceable { .. }
                | Self::DrainFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_list_nodes() {
        let err = ReschedulerError::ListNodes {
            reason: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "failed to list nodes: connection refused");
    }

    #[test]
    fn error_display_unplaceable() {
        let err = ReschedulerError::Unplaceable {
            pod: "default/web-0".into(),
        };
        assert_eq!(
            err.to_string(),
            "pod default/web-0 can't be rescheduled on any existing spot node"
        );
    }

    #[test]
    fn error_display_disruption_budget() {
        let err = ReschedulerError::DisruptionBudgetExhausted {
            pod: "default/web-0".into(),
            budget: "default/web".into(),
        };
        assert_eq!(
            err.to_string(),
            "pod default/web-0 is protected by disruption budget default/web"
        );
    }

    #[test]
    fn error_display_drain_failed() {
        let err = ReschedulerError::DrainFailed {
            node: "worker-1".into(),
            reason: "eviction timed out".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to drain node worker-1: eviction timed out"
        );
    }

    #[test]
    fn node_scoped_errors() {
        assert!(ReschedulerError::PodNotReplicated { pod: "a/b".into() }.is_node_scoped());
        assert!(ReschedulerError::Unplaceable { pod: "a/b".into() }.is_node_scoped());
        assert!(!ReschedulerError::ListPods { reason: "x".into() }.is_node_scoped());
        assert!(!ReschedulerError::InvalidConfig { reason: "x".into() }.is_node_scoped());
    }

    #[test]
    fn error_clone_and_eq() {
        let err1 = ReschedulerError::ListPods {
            reason: "timeout".into(),
        };
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
