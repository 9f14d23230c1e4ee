//! The cooldown-gated rebalancing loop.
//!
//! Every housekeeping interval the [`Rescheduler`] runs one cycle:
//!
//! 1. skip if the cooldown from the last drain attempt has not expired
//! 2. skip if the scheduler has pods it cannot place
//! 3. snapshot nodes and pods into a [`NodeMap`]
//! 4. walk on-demand nodes in listing order and plan each one against the
//!    spot nodes; the first node whose plan succeeds is drained
//! 5. restart the cooldown, whether the drain worked or not
//!
//! Node and per-node pod-count metrics are refreshed on every cycle, the
//! skipped ones included. At most one node is drained per cycle. The
//! cooldown deadline is the only state that outlives a cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::classifier::{NodeClassifier, NodeRole};
use crate::cluster::{ClusterReader, DrainExecutor, DrainResult, MetricsSink};
use crate::config::ReschedulerConfig;
use crate::error::{ReschedulerError, Result};
use crate::eviction::{DefaultEvictionFilter, EvictionFilter};
use crate::node_info::{NodeInfo, NodeInfoArray, NodeMap};
use crate::planner::{DrainPlan, DrainPlanner};
use crate::predicates::{DefaultPredicateChecker, PredicateChecker};
use crate::types::{Node, Pod, PodDisruptionBudget};

/// What a cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The last drain attempt is too recent.
    CoolingDown {
        /// When draining is allowed again.
        until: DateTime<Utc>,
    },
    /// The scheduler has pods it cannot place.
    UnschedulablePods {
        /// Number of unschedulable pods.
        count: usize,
    },
    /// There are no on-demand nodes.
    NoOnDemandNodes,
    /// No on-demand node could be drained.
    NothingDrainable {
        /// On-demand nodes looked at.
        considered: usize,
    },
    /// A node was drained.
    Drained {
        /// The drained node.
        node: String,
        /// Number of evicted pods.
        pods: usize,
    },
    /// Draining a node failed.
    DrainFailed {
        /// The node.
        node: String,
        /// Why the drain failed.
        reason: String,
    },
    /// A node would have been drained.
    DryRun {
        /// The node.
        node: String,
        /// Number of pods that would be evicted.
        pods: usize,
    },
}

impl CycleOutcome {
    /// Returns the metric label value.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CoolingDown { .. } => "cooling_down",
            Self::UnschedulablePods { .. } => "unschedulable_pods",
            Self::NoOnDemandNodes => "no_on_demand_nodes",
            Self::NothingDrainable { .. } => "nothing_drainable",
            Self::Drained { .. } => "drained",
            Self::DrainFailed { .. } => "drain_failed",
            Self::DryRun { .. } => "dry_run",
        }
    }

    /// Returns true if the cycle attempted a drain.
    #[must_use]
    pub const fn attempted_drain(&self) -> bool {
        matches!(
            self,
            Self::Drained { .. } | Self::DrainFailed { .. } | Self::DryRun { .. }
        )
    }
}

/// What planning decided for one on-demand node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Some pod makes the node undrainable.
    Skipped {
        /// Why the node was skipped.
        reason: ReschedulerError,
    },
    /// Nothing on the node needs to move.
    NoCandidates,
    /// Some pod fits on no spot node.
    Infeasible {
        /// The unplaceable pod.
        reason: ReschedulerError,
    },
    /// Every pod has a destination.
    Drainable {
        /// Pods to evict.
        pods: Vec<Pod>,
        /// Where they would go.
        plan: DrainPlan,
    },
}

/// Snapshot of the loop state for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    /// Completed cycles, including failed ones.
    pub cycles: u64,
    /// Start of the last cycle.
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// When draining is allowed again.
    pub next_drain_at: Option<DateTime<Utc>>,
    /// Outcome of the last successful cycle.
    pub last_outcome: Option<CycleOutcome>,
    /// Error of the last cycle, if it failed.
    pub last_error: Option<String>,
    /// Whether drains are only simulated.
    pub dry_run: bool,
}

/// Shared, read-mostly view of [`ControllerStatus`].
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<ControllerStatus>>,
}

impl StatusHandle {
    /// Creates a handle with an empty status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current status.
    #[must_use]
    pub fn snapshot(&self) -> ControllerStatus {
        self.inner.read().clone()
    }

    fn update(&self, f: impl FnOnce(&mut ControllerStatus)) {
        f(&mut self.inner.write());
    }
}

/// The rebalancing controller.
pub struct Rescheduler<R, D, M, P = DefaultPredicateChecker, F = DefaultEvictionFilter> {
    config: ReschedulerConfig,
    classifier: NodeClassifier,
    cluster: R,
    drainer: D,
    metrics: M,
    planner: DrainPlanner<P>,
    filter: F,
    next_drain_at: Option<DateTime<Utc>>,
    status: StatusHandle,
}

impl<R, D, M> Rescheduler<R, D, M>
where
    R: ClusterReader,
    D: DrainExecutor,
    M: MetricsSink,
{
    /// Creates a controller with the default predicates and candidate filter.
    #[must_use]
    pub fn new(config: ReschedulerConfig, cluster: R, drainer: D, metrics: M) -> Self {
        let status = StatusHandle::new();
        status.update(|s| s.dry_run = config.dry_run);
        Self {
            classifier: NodeClassifier::from_config(&config),
            config,
            cluster,
            drainer,
            metrics,
            planner: DrainPlanner::new(DefaultPredicateChecker::new()),
            filter: DefaultEvictionFilter::new(),
            next_drain_at: None,
            status,
        }
    }
}

impl<R, D, M, P, F> Rescheduler<R, D, M, P, F>
where
    R: ClusterReader,
    D: DrainExecutor,
    M: MetricsSink,
    P: PredicateChecker,
    F: EvictionFilter,
{
    /// Replaces the feasibility checker.
    #[must_use]
    pub fn with_predicate_checker<Q: PredicateChecker>(self, checker: Q) -> Rescheduler<R, D, M, Q, F> {
        Rescheduler {
            config: self.config,
            classifier: self.classifier,
            cluster: self.cluster,
            drainer: self.drainer,
            metrics: self.metrics,
            planner: DrainPlanner::new(checker),
            filter: self.filter,
            next_drain_at: self.next_drain_at,
            status: self.status,
        }
    }

    /// Replaces the eviction-candidate filter.
    #[must_use]
    pub fn with_eviction_filter<G: EvictionFilter>(self, filter: G) -> Rescheduler<R, D, M, P, G> {
        Rescheduler {
            config: self.config,
            classifier: self.classifier,
            cluster: self.cluster,
            drainer: self.drainer,
            metrics: self.metrics,
            planner: self.planner,
            filter,
            next_drain_at: self.next_drain_at,
            status: self.status,
        }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ReschedulerConfig {
        &self.config
    }

    /// Returns a handle to the published status.
    #[must_use]
    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Returns when draining is allowed again, if a drain was attempted.
    pub const fn next_drain_at(&self) -> Option<DateTime<Utc>> {
        self.next_drain_at
    }

    /// Runs one cycle as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if a cluster listing fails; the cycle is then
    /// abandoned and the cooldown left unchanged.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let started = Instant::now();
        let result = self.cycle(now).await;
        let label = result.as_ref().map_or("error", CycleOutcome::label);
        self.metrics.record_cycle(label, started.elapsed());

        let next_drain_at = self.next_drain_at;
        self.status.update(|s| {
            s.cycles += 1;
            s.last_cycle_at = Some(now);
            s.next_drain_at = next_drain_at;
            match &result {
                Ok(outcome) => {
                    s.last_outcome = Some(outcome.clone());
                    s.last_error = None;
                }
                Err(e) => s.last_error = Some(e.to_string()),
            }
        });
        result
    }

    /// Runs one cycle now, logging listing failures.
    pub async fn run_once(&mut self) -> Option<CycleOutcome> {
        match self.run_cycle_at(Utc::now()).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(error = %e, "cycle aborted");
                None
            }
        }
    }

    /// Runs a cycle every housekeeping interval until `shutdown` resolves.
    ///
    /// The first cycle starts one interval after the call. A cycle in
    /// progress is finished before shutting down.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) {
        let period = self.config.housekeeping_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval = ?period,
            drain_delay = ?self.config.node_drain_delay,
            dry_run = self.config.dry_run,
            "rescheduler started"
        );
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        info!("rescheduler stopped");
    }

    /// Decides whether an on-demand node could be drained right now.
    pub fn evaluate_node(
        &self,
        info: &NodeInfo,
        spot: &NodeInfoArray,
        budgets: &[PodDisruptionBudget],
    ) -> NodeOutcome {
        let pods = match self.filter.pods_to_evict(info.pods(), budgets) {
            Ok(pods) => pods,
            Err(reason) => {
                warn!(node = %info.name(), error = %reason, "failed to get pods for consideration");
                return NodeOutcome::Skipped { reason };
            }
        };

        if pods.is_empty() {
            info!(node = %info.name(), "no pods on node, skipping");
            return NodeOutcome::NoCandidates;
        }

        info!(node = %info.name(), pods = pods.len(), "considering node for removal");
        match self.planner.build_plan(spot, &pods) {
            Ok(plan) => NodeOutcome::Drainable { pods, plan },
            Err(reason) => {
                info!(node = %info.name(), error = %reason, "failed to build plan");
                NodeOutcome::Infeasible { reason }
            }
        }
    }

    async fn cycle(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        if let Some(until) = self.next_drain_at.filter(|until| now < *until) {
            info!(next_drain_at = %until, "waiting for drain delay timer");
            self.refresh_node_metrics().await;
            return Ok(CycleOutcome::CoolingDown { until });
        }

        let unschedulable = self.cluster.list_unschedulable_pods().await?;
        if !unschedulable.is_empty() {
            info!(count = unschedulable.len(), "waiting for unschedulable pods to be scheduled");
            self.refresh_node_metrics().await;
            return Ok(CycleOutcome::UnschedulablePods {
                count: unschedulable.len(),
            });
        }

        info!("starting node processing");
        let (map, budgets) = self.snapshot().await?;
        self.record_node_metrics(&map, &budgets);

        if map.on_demand().is_empty() {
            info!("no nodes to process");
            return Ok(CycleOutcome::NoOnDemandNodes);
        }

        let mut considered = 0;
        for info in map.on_demand() {
            considered += 1;
            if let NodeOutcome::Drainable { pods, plan } = self.evaluate_node(info, map.spot(), &budgets) {
                info!(node = %info.name(), placements = plan.len(), "all pods on node can be moved, will drain node");
                return Ok(self.drain(now, info.node(), pods).await);
            }
        }

        info!(considered, "finished processing nodes");
        Ok(CycleOutcome::NothingDrainable { considered })
    }

    async fn snapshot(&self) -> Result<(NodeMap, Vec<PodDisruptionBudget>)> {
        let nodes = self.cluster.list_ready_nodes().await?;
        let pods = self.cluster.list_pods().await?;
        let map = NodeMap::build(&self.classifier, nodes, pods);
        let budgets = self.cluster.list_disruption_budgets().await?;
        Ok((map, budgets))
    }

    /// Updates node metrics on a cycle that does no planning. Listing
    /// failures leave the previous values in place.
    async fn refresh_node_metrics(&self) {
        match self.snapshot().await {
            Ok((map, budgets)) => self.record_node_metrics(&map, &budgets),
            Err(e) => warn!(error = %e, "failed to refresh node metrics"),
        }
    }

    fn record_node_metrics(&self, map: &NodeMap, budgets: &[PodDisruptionBudget]) {
        self.metrics
            .record_node_count(NodeRole::OnDemand, map.on_demand().len());
        self.metrics.record_node_count(NodeRole::Spot, map.spot().len());

        self.metrics.reset_node_pod_counts();
        for (role, nodes) in [(NodeRole::OnDemand, map.on_demand()), (NodeRole::Spot, map.spot())] {
            for info in nodes {
                match self.filter.pods_to_evict(info.pods(), budgets) {
                    Ok(pods) => self.metrics.record_node_pod_count(role, info.name(), pods.len()),
                    Err(e) => debug!(node = %info.name(), role = %role, error = %e, "no pod count for node"),
                }
            }
        }
    }

    async fn drain(&mut self, now: DateTime<Utc>, node: &Node, pods: Vec<Pod>) -> CycleOutcome {
        let started = Instant::now();
        let outcome = if self.config.dry_run {
            info!(node = %node.name, pods = pods.len(), "dry run, not draining node");
            CycleOutcome::DryRun {
                node: node.name.clone(),
                pods: pods.len(),
            }
        } else {
            let result = self
                .drainer
                .drain(
                    node,
                    &pods,
                    self.config.max_graceful_termination,
                    self.config.pod_eviction_timeout,
                )
                .await;
            match result {
                Ok(()) => {
                    info!(node = %node.name, pods = pods.len(), "node drained");
                    self.metrics.record_drain_outcome(DrainResult::Success, &node.name);
                    CycleOutcome::Drained {
                        node: node.name.clone(),
                        pods: pods.len(),
                    }
                }
                Err(e) => {
                    error!(node = %node.name, error = %e, "failed to drain node");
                    self.metrics.record_drain_outcome(DrainResult::Failure, &node.name);
                    CycleOutcome::DrainFailed {
                        node: node.name.clone(),
                        reason: e.to_string(),
                    }
                }
            }
        };

        let finished = add_duration(now, started.elapsed());
        let next = add_duration(finished, self.config.node_drain_delay);
        debug!(next_drain_at = %next, "drain delay timer restarted");
        self.next_drain_at = Some(next);
        outcome
    }
}

fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_ON_DEMAND_LABEL, DEFAULT_SPOT_LABEL};
    use crate::fake::{FakeCluster, FakeDrainExecutor, Listing, RecordingMetricsSink};
    use crate::types::{OwnerReference, Resources};

    type TestRescheduler =
        Rescheduler<Arc<FakeCluster>, Arc<FakeDrainExecutor>, Arc<RecordingMetricsSink>>;

    struct Harness {
        cluster: Arc<FakeCluster>,
        drainer: Arc<FakeDrainExecutor>,
        metrics: Arc<RecordingMetricsSink>,
        rescheduler: TestRescheduler,
    }

    fn harness(config: ReschedulerConfig) -> Harness {
        let cluster = Arc::new(FakeCluster::new());
        let drainer = Arc::new(FakeDrainExecutor::new().evicting_from(Arc::clone(&cluster)));
        let metrics = Arc::new(RecordingMetricsSink::new());
        let rescheduler = Rescheduler::new(
            config,
            Arc::clone(&cluster),
            Arc::clone(&drainer),
            Arc::clone(&metrics),
        );
        Harness {
            cluster,
            drainer,
            metrics,
            rescheduler,
        }
    }

    fn on_demand(name: &str) -> Node {
        Node::new(name)
            .with_label(DEFAULT_ON_DEMAND_LABEL, "")
            .with_allocatable(Resources::new().with_cpu_millis(4000).with_memory_mib(8192).with_pods(110))
    }

    fn spot(name: &str, cpu: u64) -> Node {
        Node::new(name)
            .with_label(DEFAULT_SPOT_LABEL, "")
            .with_allocatable(Resources::new().with_cpu_millis(cpu).with_memory_mib(8192).with_pods(110))
    }

    fn pod(name: &str, node: &str, cpu: u64) -> Pod {
        Pod::new("default", name)
            .on_node(node)
            .with_owner(OwnerReference::controller("ReplicaSet", "rs"))
            .with_requests(Resources::new().with_cpu_millis(cpu))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    #[tokio::test]
    async fn drains_feasible_node_and_starts_cooldown() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 2000));
        h.cluster.add_pod(pod("a", "od1", 1000));

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert_eq!(
            outcome,
            Ok(CycleOutcome::Drained {
                node: "od1".into(),
                pods: 1
            })
        );
        assert_eq!(h.drainer.drained_nodes(), vec!["od1".to_string()]);
        assert_eq!(h.metrics.drains(), vec![(DrainResult::Success, "od1".to_string())]);

        let next = h.rescheduler.next_drain_at();
        assert!(next.is_some_and(|n| n >= t0() + minutes(10) && n < t0() + minutes(11)));
    }

    #[tokio::test]
    async fn passes_configured_timeouts_to_drainer() {
        let config = ReschedulerConfig::default()
            .with_max_graceful_termination(Duration::from_secs(30))
            .with_pod_eviction_timeout(Duration::from_secs(45));
        let mut h = harness(config);
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 2000));
        h.cluster.add_pod(pod("a", "od1", 1000));

        let _ = h.rescheduler.run_cycle_at(t0()).await;
        let call = h.drainer.calls().into_iter().next();
        assert_eq!(call.as_ref().map(|c| c.grace_period), Some(Duration::from_secs(30)));
        assert_eq!(call.as_ref().map(|c| c.eviction_timeout), Some(Duration::from_secs(45)));
        assert_eq!(call.map(|c| c.pods), Some(vec!["default/a".to_string()]));
    }

    #[tokio::test]
    async fn cooldown_blocks_until_deadline() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(on_demand("od2"));
        h.cluster.add_node(spot("s1", 4000));
        h.cluster.add_pod(pod("a", "od1", 1000));
        h.cluster.add_pod(pod("b", "od2", 1000));

        let first = h.rescheduler.run_cycle_at(t0()).await;
        assert!(first.is_ok_and(|o| o.attempted_drain()));

        let second = h.rescheduler.run_cycle_at(t0() + minutes(5)).await;
        assert!(matches!(second, Ok(CycleOutcome::CoolingDown { .. })));
        assert_eq!(h.drainer.calls().len(), 1);

        let third = h.rescheduler.run_cycle_at(t0() + minutes(11)).await;
        assert_eq!(
            third,
            Ok(CycleOutcome::Drained {
                node: "od2".into(),
                pods: 1
            })
        );
        assert_eq!(h.drainer.drained_nodes(), vec!["od1".to_string(), "od2".to_string()]);
    }

    #[tokio::test]
    async fn cooldown_cycle_still_records_node_metrics() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(on_demand("od2"));
        h.cluster.add_node(spot("s1", 4000));
        h.cluster.add_pod(pod("a", "od1", 1000));
        h.cluster.add_pod(pod("b", "od2", 1000));
        h.cluster.add_pod(pod("c", "od2", 1000));

        let first = h.rescheduler.run_cycle_at(t0()).await;
        assert!(first.is_ok_and(|o| o.attempted_drain()));

        h.cluster.add_node(spot("s2", 4000));
        h.cluster.add_pod(pod("d", "s2", 100));
        let second = h.rescheduler.run_cycle_at(t0() + minutes(5)).await;
        assert!(matches!(second, Ok(CycleOutcome::CoolingDown { .. })));
        assert_eq!(h.drainer.calls().len(), 1);

        assert_eq!(h.metrics.node_count(NodeRole::OnDemand), Some(2));
        assert_eq!(h.metrics.node_count(NodeRole::Spot), Some(2));
        assert_eq!(h.metrics.pod_count(NodeRole::OnDemand, "od1"), Some(0));
        assert_eq!(h.metrics.pod_count(NodeRole::OnDemand, "od2"), Some(2));
        assert_eq!(h.metrics.pod_count(NodeRole::Spot, "s1"), Some(0));
        assert_eq!(h.metrics.pod_count(NodeRole::Spot, "s2"), Some(1));
    }

    #[tokio::test]
    async fn cooldown_listing_failure_keeps_outcome() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 4000));
        h.cluster.add_pod(pod("a", "od1", 1000));
        let _ = h.rescheduler.run_cycle_at(t0()).await;

        h.cluster.fail(Listing::Pods);
        let outcome = h.rescheduler.run_cycle_at(t0() + minutes(1)).await;
        assert!(matches!(outcome, Ok(CycleOutcome::CoolingDown { .. })));
        assert_eq!(h.metrics.node_count(NodeRole::Spot), Some(1));
    }

    #[tokio::test]
    async fn departed_nodes_lose_their_pod_count() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 1000));
        h.cluster.add_node(spot("s2", 1000));
        h.cluster.add_pod(pod("a", "od1", 4000));
        h.cluster.add_pod(pod("b", "s2", 100));

        let first = h.rescheduler.run_cycle_at(t0()).await;
        assert!(matches!(first, Ok(CycleOutcome::NothingDrainable { .. })));
        assert_eq!(h.metrics.pod_count(NodeRole::Spot, "s2"), Some(1));

        h.cluster.remove_pod("default/b");
        h.cluster.remove_node("s2");
        let _ = h.rescheduler.run_cycle_at(t0() + minutes(1)).await;
        assert_eq!(h.metrics.pod_count(NodeRole::Spot, "s1"), Some(0));
        assert_eq!(h.metrics.pod_count(NodeRole::Spot, "s2"), None);
    }

    #[tokio::test]
    async fn failed_drain_still_starts_cooldown() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 2000));
        h.cluster.add_pod(pod("a", "od1", 1000));
        h.drainer.fail_with("eviction timed out");

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert!(matches!(outcome, Ok(CycleOutcome::DrainFailed { ref node, .. }) if node == "od1"));
        assert_eq!(h.metrics.drains(), vec![(DrainResult::Failure, "od1".to_string())]);
        assert!(h.rescheduler.next_drain_at().is_some());

        h.drainer.succeed();
        let retry = h.rescheduler.run_cycle_at(t0() + minutes(1)).await;
        assert!(matches!(retry, Ok(CycleOutcome::CoolingDown { .. })));
        assert_eq!(h.drainer.calls().len(), 1);
    }

    #[tokio::test]
    async fn unschedulable_pods_skip_cycle() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 2000));
        h.cluster.add_pod(pod("a", "od1", 1000));
        h.cluster.add_unschedulable(Pod::new("default", "pending"));

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert_eq!(outcome, Ok(CycleOutcome::UnschedulablePods { count: 1 }));
        assert!(h.drainer.calls().is_empty());
        assert_eq!(h.rescheduler.next_drain_at(), None);
        assert_eq!(h.metrics.node_count(NodeRole::Spot), Some(1));
        assert_eq!(h.metrics.pod_count(NodeRole::OnDemand, "od1"), Some(1));
    }

    #[tokio::test]
    async fn listing_error_aborts_without_cooldown() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.fail(Listing::DisruptionBudgets);

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert!(matches!(outcome, Err(ReschedulerError::ListDisruptionBudgets { .. })));
        assert_eq!(h.rescheduler.next_drain_at(), None);
        assert_eq!(h.metrics.cycles(), vec!["error".to_string()]);

        let status = h.rescheduler.status().snapshot();
        assert_eq!(status.cycles, 1);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn infeasible_node_is_skipped_for_next() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od-big"));
        h.cluster.add_node(on_demand("od-small"));
        h.cluster.add_node(spot("s1", 1000));
        h.cluster.add_pod(pod("big", "od-big", 3000));
        h.cluster.add_pod(pod("small", "od-small", 500));

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert_eq!(
            outcome,
            Ok(CycleOutcome::Drained {
                node: "od-small".into(),
                pods: 1
            })
        );
    }

    #[tokio::test]
    async fn filter_error_skips_node() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(on_demand("od2"));
        h.cluster.add_node(spot("s1", 4000));
        h.cluster.add_pod(Pod::new("default", "bare").on_node("od1"));
        h.cluster.add_pod(pod("b", "od2", 100));

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert_eq!(
            outcome,
            Ok(CycleOutcome::Drained {
                node: "od2".into(),
                pods: 1
            })
        );
        assert_eq!(h.metrics.pod_count(NodeRole::OnDemand, "od1"), None);
    }

    #[tokio::test]
    async fn empty_nodes_are_not_drained() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 4000));

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert_eq!(outcome, Ok(CycleOutcome::NothingDrainable { considered: 1 }));
        assert_eq!(h.metrics.pod_count(NodeRole::OnDemand, "od1"), Some(0));
        assert_eq!(h.rescheduler.next_drain_at(), None);
    }

    #[tokio::test]
    async fn no_on_demand_nodes() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(spot("s1", 4000));
        h.cluster.add_pod(pod("a", "s1", 100));

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert_eq!(outcome, Ok(CycleOutcome::NoOnDemandNodes));
        assert_eq!(h.metrics.node_count(NodeRole::OnDemand), Some(0));
        assert_eq!(h.metrics.pod_count(NodeRole::Spot, "s1"), Some(1));
    }

    #[tokio::test]
    async fn dry_run_plans_without_evicting() {
        let mut h = harness(ReschedulerConfig::default().with_dry_run(true));
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 2000));
        h.cluster.add_pod(pod("a", "od1", 1000));

        let outcome = h.rescheduler.run_cycle_at(t0()).await;
        assert_eq!(
            outcome,
            Ok(CycleOutcome::DryRun {
                node: "od1".into(),
                pods: 1
            })
        );
        assert!(h.drainer.calls().is_empty());
        assert!(h.metrics.drains().is_empty());
        assert!(h.rescheduler.next_drain_at().is_some());
        assert!(h.rescheduler.status().snapshot().dry_run);
    }

    #[tokio::test]
    async fn status_tracks_last_outcome() {
        let mut h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(spot("s1", 2000));
        h.cluster.add_pod(pod("a", "od1", 1000));
        let status = h.rescheduler.status();

        let _ = h.rescheduler.run_cycle_at(t0()).await;
        let snapshot = status.snapshot();
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.last_cycle_at, Some(t0()));
        assert_eq!(snapshot.next_drain_at, h.rescheduler.next_drain_at());
        assert!(matches!(snapshot.last_outcome, Some(CycleOutcome::Drained { .. })));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(CycleOutcome::Drained {
            node: "od1".into(),
            pods: 2,
        })
        .ok();
        assert_eq!(
            json,
            Some(serde_json::json!({"outcome": "drained", "node": "od1", "pods": 2}))
        );
    }

    #[test]
    fn add_duration_saturates() {
        assert_eq!(add_duration(t0(), Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(add_duration(t0(), Duration::from_secs(60)), t0() + minutes(1));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_on_interval_and_stops() {
        let h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        let status = h.rescheduler.status();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(h.rescheduler.run_until(async {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(status.snapshot().cycles, 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(status.snapshot().cycles, 3);

        let _ = tx.send(());
        assert!(handle.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_drains_once_within_cooldown() {
        let h = harness(ReschedulerConfig::default());
        h.cluster.add_node(on_demand("od1"));
        h.cluster.add_node(on_demand("od2"));
        h.cluster.add_node(spot("s1", 4000));
        h.cluster.add_pod(pod("a", "od1", 100));
        h.cluster.add_pod(pod("b", "od2", 100));
        let drainer = Arc::clone(&h.drainer);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(h.rescheduler.run_until(async {
            let _ = rx.await;
        }));
        tokio::time::sleep(Duration::from_secs(65)).await;
        let _ = tx.send(());
        assert!(handle.await.is_ok());

        assert_eq!(drainer.drained_nodes(), vec!["od1".to_string()]);
    }
}
