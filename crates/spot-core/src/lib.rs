//! Drain planning and control loop for moving workloads onto spot capacity.
//!
//! `spot-core` holds everything of the rescheduler that does not talk to a
//! cluster API: the domain model, the scheduling predicates, the drain
//! planner and the cooldown-gated loop. Cluster access goes through the
//! [`ClusterReader`], [`DrainExecutor`] and [`MetricsSink`] traits.
//!
//! # Example
//!
//! ```rust
//! use spot_core::{
//!     DefaultEvictionFilter, DefaultPredicateChecker, DrainPlanner, EvictionFilter, Node,
//!     NodeClassifier, NodeMap, OwnerReference, Pod, ReschedulerConfig, Resources,
//! };
//!
//! let config = ReschedulerConfig::default();
//! let capacity = Resources::new().with_cpu_millis(2000).with_memory_mib(4096).with_pods(110);
//! let nodes = vec![
//!     Node::new("od-1").with_label(&config.on_demand_label, "").with_allocatable(capacity.clone()),
//!     Node::new("spot-1").with_label(&config.spot_label, "").with_allocatable(capacity),
//! ];
//! let pods = vec![
//!     Pod::new("default", "web-0")
//!         .on_node("od-1")
//!         .with_owner(OwnerReference::controller("ReplicaSet", "web"))
//!         .with_requests(Resources::new().with_cpu_millis(500)),
//! ];
//!
//! let map = NodeMap::build(&NodeClassifier::from_config(&config), nodes, pods);
//! let on_demand = map.on_demand().get(0).map(|info| info.pods().to_vec()).unwrap_or_default();
//! let candidates = DefaultEvictionFilter::new().pods_to_evict(&on_demand, &[]).unwrap_or_default();
//!
//! let plan = DrainPlanner::new(DefaultPredicateChecker::new()).build_plan(map.spot(), &candidates);
//! assert_eq!(plan.ok().and_then(|p| p.destination("default/web-0").map(String::from)).as_deref(), Some("spot-1"));
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Rescheduler                  │
//! │  cooldown ─► safety gate ─► NodeMap          │
//! │                               │              │
//! │     EvictionFilter ─► DrainPlanner ─► drain  │
//! │                        (predicates)          │
//! └──────┬──────────────────┬───────────────┬────┘
//!        │                  │               │
//!  ClusterReader      DrainExecutor     MetricsSink
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod classifier;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod eviction;
pub mod fake;
pub mod node_info;
pub mod planner;
pub mod predicates;
pub mod selector;
pub mod types;

pub use classifier::{NodeClassifier, NodeRole};
pub use cluster::{ClusterReader, DrainExecutor, DrainResult, MetricsSink};
pub use config::ReschedulerConfig;
pub use controller::{ControllerStatus, CycleOutcome, NodeOutcome, Rescheduler, StatusHandle};
pub use error::{ReschedulerError, Result};
pub use eviction::{DefaultEvictionFilter, EvictionFilter};
pub use node_info::{NodeInfo, NodeInfoArray, NodeMap};
pub use planner::{DrainPlan, DrainPlanner, Placement};
pub use predicates::{DefaultPredicateChecker, PredicateChecker, PredicateFailure};
pub use selector::{
    LabelSelector, NodeAffinity, NodeSelectorTerm, PodAffinityTerm, Requirement, SelectorOperator,
    Taint, TaintEffect, Toleration, TolerationOperator,
};
pub use types::{HostPort, Node, OwnerReference, Pod, PodDisruptionBudget, PodPhase, Resources};
