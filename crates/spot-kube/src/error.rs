//! Error types for Kubernetes access.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Kubernetes operations.
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors from talking to the Kubernetes API.
#[derive(Debug, Error)]
pub enum KubeError {
    /// The client configuration could not be loaded.
    #[error("failed to load cluster configuration: {reason}")]
    Config {
        /// Why loading failed.
        reason: String,
    },

    /// An API request failed.
    #[error("{operation} failed: {source}")]
    Api {
        /// What was being done.
        operation: String,
        /// The client error.
        #[source]
        source: kube::Error,
    },

    /// A resource quantity could not be parsed.
    #[error("invalid quantity {value:?}")]
    InvalidQuantity {
        /// The offending quantity.
        value: String,
    },

    /// The API server refused an eviction for good.
    #[error("eviction of pod {pod} was rejected: {source}")]
    EvictionRejected {
        /// `namespace/name` of the pod.
        pod: String,
        /// The client error.
        #[source]
        source: kube::Error,
    },

    /// An eviction kept failing until the eviction timeout.
    #[error("eviction of pod {pod} did not succeed within {timeout:?}: {last_error}")]
    EvictionTimedOut {
        /// `namespace/name` of the pod.
        pod: String,
        /// The eviction timeout.
        timeout: Duration,
        /// The last retriable failure.
        last_error: String,
    },

    /// Evicted pods were still present after the termination deadline.
    #[error("pods not deleted within {timeout:?}: {}", pods.join(", "))]
    DeletionTimedOut {
        /// `namespace/name` of every remaining pod.
        pods: Vec<String>,
        /// How long deletion was awaited.
        timeout: Duration,
    },
}

impl KubeError {
    /// Wraps a client error with the operation that failed.
    pub fn api(operation: impl Into<String>, source: kube::Error) -> Self {
        Self::Api {
            operation: operation.into(),
            source,
        }
    }

    /// Wraps a configuration failure.
    pub fn config(reason: impl std::fmt::Display) -> Self {
        Self::Config {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletion_timeout_lists_pods() {
        let err = KubeError::DeletionTimedOut {
            pods: vec!["default/a".into(), "default/b".into()],
            timeout: Duration::from_secs(150),
        };
        assert_eq!(err.to_string(), "pods not deleted within 150s: default/a, default/b");
    }

    #[test]
    fn config_error() {
        let err = KubeError::config("no kubeconfig");
        assert_eq!(err.to_string(), "failed to load cluster configuration: no kubeconfig");
    }
}
