//! Speculative drain planning.
//!
//! The planner places every candidate pod of one on-demand node onto a spot
//! node, first fit in placement order. Placements are made on a private deep
//! copy of the spot nodes, so each tentative placement counts against later
//! checks in the same plan while the caller's snapshot stays untouched.
//! Either every pod gets a destination or the plan fails on the first pod
//! that fits nowhere.

use tracing::{debug, info};

use crate::error::{ReschedulerError, Result};
use crate::node_info::NodeInfoArray;
use crate::predicates::PredicateChecker;
use crate::types::Pod;

/// A pod and the spot node it would move to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// `namespace/name` of the pod.
    pub pod: String,
    /// Destination node.
    pub node: String,
}

/// A complete assignment of a node's candidate pods to spot nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainPlan {
    placements: Vec<Placement>,
    projected: NodeInfoArray,
}

impl DrainPlan {
    /// Returns the placements in pod order.
    #[must_use]
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Returns the spot nodes as they would look after the drain.
    #[must_use]
    pub const fn projected(&self) -> &NodeInfoArray {
        &self.projected
    }

    /// Returns the destination of a pod.
    #[must_use]
    pub fn destination(&self, pod_key: &str) -> Option<&str> {
        self.placements
            .iter()
            .find(|p| p.pod == pod_key)
            .map(|p| p.node.as_str())
    }

    /// Returns the number of placed pods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// Returns true if the plan moves nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

/// Builds drain plans with a feasibility checker.
#[derive(Debug, Clone, Default)]
pub struct DrainPlanner<P> {
    checker: P,
}

impl<P: PredicateChecker> DrainPlanner<P> {
    /// Creates a planner.
    #[must_use]
    pub const fn new(checker: P) -> Self {
        Self { checker }
    }

    /// Returns the feasibility checker.
    pub const fn checker(&self) -> &P {
        &self.checker
    }

    /// Plans the relocation of `pods` onto `spot`.
    ///
    /// # Errors
    ///
    /// Returns [`ReschedulerError::Unplaceable`] naming the first pod no spot
    /// node can take. Later pods are not evaluated.
    pub fn build_plan(&self, spot: &NodeInfoArray, pods: &[Pod]) -> Result<DrainPlan> {
        let mut projected = spot.deep_copy();
        let mut placements = Vec::with_capacity(pods.len());

        for pod in pods {
            let candidate = pod.unbound();
            let target = projected.iter_mut().find(|info| match self.checker.check(&candidate, info) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(pod = %pod, node = %info.name(), %reason, "pod does not fit");
                    false
                }
            });

            let Some(target) = target else {
                return Err(ReschedulerError::Unplaceable { pod: pod.key() });
            };

            info!(pod = %pod, node = %target.name(), "pod can be rescheduled, adding to plan");
            placements.push(Placement {
                pod: pod.key(),
                node: target.name().to_string(),
            });
            let node_name = target.name().to_string();
            target.add_pod(candidate.on_node(node_name));
        }

        Ok(DrainPlan {
            placements,
            projected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_info::NodeInfo;
    use crate::predicates::DefaultPredicateChecker;
    use crate::types::{Node, Resources};
    use proptest::prelude::*;

    fn spot(name: &str, cpu: u64) -> NodeInfo {
        NodeInfo::new(
            Node::new(name).with_allocatable(
                Resources::new()
                    .with_cpu_millis(cpu)
                    .with_memory_mib(1024)
                    .with_pods(110),
            ),
        )
    }

    fn pod(name: &str, cpu: u64) -> Pod {
        Pod::new("default", name)
            .on_node("od-1")
            .with_requests(Resources::new().with_cpu_millis(cpu))
    }

    fn planner() -> DrainPlanner<DefaultPredicateChecker> {
        DrainPlanner::new(DefaultPredicateChecker::new())
    }

    fn array(nodes: Vec<NodeInfo>) -> NodeInfoArray {
        nodes.into_iter().collect()
    }

    #[test]
    fn one_pod_per_spot_node() {
        let spots = array(vec![spot("s1", 1000), spot("s2", 1000)]);
        let plan = planner()
            .build_plan(&spots, &[pod("a", 1000), pod("b", 1000)])
            .ok();
        let plan = plan.as_ref();
        assert_eq!(plan.and_then(|p| p.destination("default/a")), Some("s1"));
        assert_eq!(plan.and_then(|p| p.destination("default/b")), Some("s2"));
        assert_eq!(plan.map(DrainPlan::len), Some(2));
    }

    #[test]
    fn fails_on_first_unplaceable_pod() {
        let spots = array(vec![spot("s1", 1000)]);
        let result = planner().build_plan(&spots, &[pod("a", 1000), pod("b", 1000), pod("c", 1)]);
        assert_eq!(
            result,
            Err(ReschedulerError::Unplaceable {
                pod: "default/b".into()
            })
        );
    }

    #[test]
    fn failing_plan_leaves_snapshot_untouched() {
        let spots = array(vec![spot("s1", 1000), spot("s2", 500)]);
        let before = spots.clone();
        let result = planner().build_plan(&spots, &[pod("a", 900), pod("b", 900)]);
        assert!(result.is_err());
        assert_eq!(spots, before);
    }

    #[test]
    fn successful_plan_leaves_snapshot_untouched() {
        let spots = array(vec![spot("s1", 2000)]);
        let before = spots.clone();
        let plan = planner().build_plan(&spots, &[pod("a", 500)]);
        assert!(plan.is_ok());
        assert_eq!(spots, before);
        assert_eq!(
            plan.ok().and_then(|p| p.projected().get(0).map(NodeInfo::pod_count)),
            Some(1)
        );
    }

    #[test]
    fn tentative_placements_count() {
        // s1 can hold both only if the first placement is ignored
        let spots = array(vec![spot("s1", 1500), spot("s2", 1000)]);
        let plan = planner().build_plan(&spots, &[pod("a", 1000), pod("b", 1000)]).ok();
        assert_eq!(plan.as_ref().and_then(|p| p.destination("default/a")), Some("s1"));
        assert_eq!(plan.as_ref().and_then(|p| p.destination("default/b")), Some("s2"));
    }

    #[test]
    fn no_pods_is_an_empty_plan() {
        let plan = planner().build_plan(&NodeInfoArray::new(), &[]);
        assert!(plan.is_ok_and(|p| p.is_empty()));
    }

    #[test]
    fn no_spot_nodes_fails() {
        let result = planner().build_plan(&NodeInfoArray::new(), &[pod("a", 1)]);
        assert!(matches!(result, Err(ReschedulerError::Unplaceable { .. })));
    }

    #[test]
    fn projected_pods_are_bound_to_their_target() {
        let spots = array(vec![spot("s1", 1000)]);
        let plan = planner().build_plan(&spots, &[pod("a", 100)]).ok();
        let bound = plan
            .as_ref()
            .and_then(|p| p.projected().get(0))
            .and_then(|info| info.pods().first())
            .and_then(|p| p.node_name.clone());
        assert_eq!(bound.as_deref(), Some("s1"));
    }

    fn arb_spots() -> impl Strategy<Value = NodeInfoArray> {
        prop::collection::vec(0u64..4000, 0..6).prop_map(|cpus| {
            cpus.iter()
                .enumerate()
                .map(|(i, cpu)| spot(&format!("s{i}"), *cpu))
                .collect()
        })
    }

    fn arb_pods() -> impl Strategy<Value = Vec<Pod>> {
        prop::collection::vec(0u64..2000, 0..10).prop_map(|cpus| {
            cpus.iter()
                .enumerate()
                .map(|(i, cpu)| pod(&format!("p{i}"), *cpu))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn planning_is_deterministic(spots in arb_spots(), pods in arb_pods()) {
            let first = planner().build_plan(&spots, &pods);
            let second = planner().build_plan(&spots, &pods);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn snapshot_is_never_mutated(spots in arb_spots(), pods in arb_pods()) {
            let before = spots.clone();
            let _ = planner().build_plan(&spots, &pods);
            prop_assert_eq!(spots, before);
        }

        #[test]
        fn projected_capacity_never_exceeded(spots in arb_spots(), pods in arb_pods()) {
            if let Ok(plan) = planner().build_plan(&spots, &pods) {
                prop_assert_eq!(plan.len(), pods.len());
                for info in plan.projected() {
                    prop_assert!(info.requested().cpu_millis <= info.node().allocatable.cpu_millis);
                }
            }
        }

        #[test]
        fn failure_names_a_candidate_pod(spots in arb_spots(), pods in arb_pods()) {
            if let Err(ReschedulerError::Unplaceable { pod }) = planner().build_plan(&spots, &pods) {
                prop_assert!(pods.iter().any(|p| p.key() == pod));
            }
        }
    }
}
