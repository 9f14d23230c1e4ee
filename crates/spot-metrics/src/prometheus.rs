//! Prometheus metrics for the rescheduler.
//!
//! # Example
//!
//! ```rust
//! use spot_core::{DrainResult, MetricsSink, NodeRole};
//! use spot_metrics::PrometheusRegistry;
//!
//! let registry = PrometheusRegistry::new();
//! registry.record_node_pod_count(NodeRole::OnDemand, "od-1", 4);
//! registry.record_drain_outcome(DrainResult::Success, "od-1");
//!
//! let output = registry.encode();
//! assert!(output.contains("spot_rescheduler_node_pods_count"));
//! assert!(output.contains("spot_rescheduler_node_drain_total"));
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use spot_core::{DrainResult, MetricsSink, NodeRole};

/// Label set for per-role metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RoleLabels {
    /// `on-demand`, `spot` or `other`.
    pub node_role: String,
}

/// Label set for per-node pod counts.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NodePodLabels {
    /// `on-demand` or `spot`.
    pub node_role: String,
    /// The node name.
    pub node: String,
}

/// Label set for drain outcomes.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DrainLabels {
    /// `success` or `failure`.
    pub result: String,
    /// The drained node.
    pub node: String,
}

/// Label set for cycle outcomes.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CycleLabels {
    /// The cycle outcome label.
    pub outcome: String,
}

/// The rescheduler's metric families.
#[derive(Clone)]
pub struct ReschedulerMetrics {
    nodes_count: Family<RoleLabels, Gauge>,
    node_pods_count: Family<NodePodLabels, Gauge>,
    node_drain: Family<DrainLabels, Counter>,
    cycles: Family<CycleLabels, Counter>,
    cycle_duration_seconds: Histogram,
}

impl std::fmt::Debug for ReschedulerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReschedulerMetrics").finish_non_exhaustive()
    }
}

impl ReschedulerMetrics {
    fn new(registry: &mut Registry) -> Self {
        let nodes_count = Family::<RoleLabels, Gauge>::default();
        registry.register(
            "spot_rescheduler_nodes_count",
            "Number of ready nodes by role",
            nodes_count.clone(),
        );

        let node_pods_count = Family::<NodePodLabels, Gauge>::default();
        registry.register(
            "spot_rescheduler_node_pods_count",
            "Number of relocatable pods on a node",
            node_pods_count.clone(),
        );

        // the client appends the _total suffix to counters
        let node_drain = Family::<DrainLabels, Counter>::default();
        registry.register(
            "spot_rescheduler_node_drain",
            "Drain attempts by result",
            node_drain.clone(),
        );

        let cycles = Family::<CycleLabels, Counter>::default();
        registry.register(
            "spot_rescheduler_cycles",
            "Housekeeping cycles by outcome",
            cycles.clone(),
        );

        // 10ms to ~20s
        let cycle_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 12));
        registry.register(
            "spot_rescheduler_cycle_duration_seconds",
            "Time taken by a housekeeping cycle",
            cycle_duration_seconds.clone(),
        );

        Self {
            nodes_count,
            node_pods_count,
            node_drain,
            cycles,
            cycle_duration_seconds,
        }
    }

    /// Returns the last node count of a role.
    #[must_use]
    pub fn nodes_count(&self, role: NodeRole) -> i64 {
        self.nodes_count
            .get_or_create(&RoleLabels {
                node_role: role.as_str().to_string(),
            })
            .get()
    }

    /// Returns the last pod count of a node.
    #[must_use]
    pub fn node_pods_count(&self, role: NodeRole, node: &str) -> i64 {
        self.node_pods_count
            .get_or_create(&NodePodLabels {
                node_role: role.as_str().to_string(),
                node: node.to_string(),
            })
            .get()
    }

    /// Returns how often a node was drained with a given result.
    #[must_use]
    pub fn node_drain_total(&self, result: DrainResult, node: &str) -> u64 {
        self.node_drain
            .get_or_create(&DrainLabels {
                result: result.as_str().to_string(),
                node: node.to_string(),
            })
            .get()
    }

    /// Returns how many cycles ended with an outcome.
    #[must_use]
    pub fn cycles_total(&self, outcome: &str) -> u64 {
        self.cycles
            .get_or_create(&CycleLabels {
                outcome: outcome.to_string(),
            })
            .get()
    }
}

/// Registry holding every rescheduler metric.
///
/// Cheap to clone; clones share the same metrics.
#[derive(Clone)]
pub struct PrometheusRegistry {
    registry: Arc<RwLock<Registry>>,
    metrics: ReschedulerMetrics,
}

impl std::fmt::Debug for PrometheusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusRegistry")
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Default for PrometheusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusRegistry {
    /// Creates a registry with all rescheduler metrics registered.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = ReschedulerMetrics::new(&mut registry);
        Self {
            registry: Arc::new(RwLock::new(registry)),
            metrics,
        }
    }

    /// Returns the metric families.
    #[must_use]
    pub const fn metrics(&self) -> &ReschedulerMetrics {
        &self.metrics
    }

    /// Encodes all metrics in Prometheus text format.
    #[must_use]
    pub fn encode(&self) -> String {
        let registry = self.registry.read();
        let mut buffer = String::new();
        if encode(&mut buffer, &registry).is_err() {
            tracing::error!("failed to encode prometheus metrics");
            return String::new();
        }
        buffer
    }

    /// Returns the Content-Type header value for Prometheus metrics.
    #[must_use]
    pub const fn content_type() -> &'static str {
        "text/plain; version=0.0.4; charset=utf-8"
    }
}

impl MetricsSink for PrometheusRegistry {
    fn record_node_count(&self, role: NodeRole, count: usize) {
        self.metrics
            .nodes_count
            .get_or_create(&RoleLabels {
                node_role: role.as_str().to_string(),
            })
            .set(count as i64);
    }

    fn record_node_pod_count(&self, role: NodeRole, node: &str, count: usize) {
        self.metrics
            .node_pods_count
            .get_or_create(&NodePodLabels {
                node_role: role.as_str().to_string(),
                node: node.to_string(),
            })
            .set(count as i64);
    }

    fn reset_node_pod_counts(&self) {
        self.metrics.node_pods_count.clear();
    }

    fn record_drain_outcome(&self, result: DrainResult, node: &str) {
        self.metrics
            .node_drain
            .get_or_create(&DrainLabels {
                result: result.as_str().to_string(),
                node: node.to_string(),
            })
            .inc();
    }

    fn record_cycle(&self, outcome: &str, duration: Duration) {
        self.metrics
            .cycles
            .get_or_create(&CycleLabels {
                outcome: outcome.to_string(),
            })
            .inc();
        self.metrics
            .cycle_duration_seconds
            .observe(duration.as_secs_f64());
    }
}
