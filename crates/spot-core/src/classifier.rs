//! Node role classification by label key.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ReschedulerConfig;
use crate::types::Node;

/// Role of a node in the rebalancing process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /// Expensive capacity that should be emptied.
    OnDemand,
    /// Cheap capacity that receives workload.
    Spot,
    /// Not managed.
    Other,
}

impl NodeRole {
    /// Returns the role name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnDemand => "on-demand",
            Self::Spot => "spot",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assigns a [`NodeRole`] to nodes from their labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeClassifier {
    on_demand_label: String,
    spot_label: String,
}

impl NodeClassifier {
    /// Creates a classifier from the two label keys.
    #[must_use]
    pub fn new(on_demand_label: impl Into<String>, spot_label: impl Into<String>) -> Self {
        Self {
            on_demand_label: on_demand_label.into(),
            spot_label: spot_label.into(),
        }
    }

    /// Creates a classifier from the configured label keys.
    #[must_use]
    pub fn from_config(config: &ReschedulerConfig) -> Self {
        Self::new(&config.on_demand_label, &config.spot_label)
    }

    /// Returns the on-demand label key.
    #[must_use]
    pub fn on_demand_label(&self) -> &str {
        &self.on_demand_label
    }

    /// Returns the spot label key.
    #[must_use]
    pub fn spot_label(&self) -> &str {
        &self.spot_label
    }

    /// Classifies a node. A node carrying both labels is ignored.
    #[must_use]
    pub fn classify(&self, node: &Node) -> NodeRole {
        match (
            node.has_label(&self.on_demand_label),
            node.has_label(&self.spot_label),
        ) {
            (true, true) => {
                warn!(
                    node = %node.name,
                    on_demand_label = %self.on_demand_label,
                    spot_label = %self.spot_label,
                    "node carries both on-demand and spot labels, ignoring it"
                );
                NodeRole::Other
            }
            (true, false) => NodeRole::OnDemand,
            (false, true) => NodeRole::Spot,
            (false, false) => NodeRole::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_ON_DEMAND_LABEL, DEFAULT_SPOT_LABEL};
    use test_case::test_case;

    fn classifier() -> NodeClassifier {
        NodeClassifier::from_config(&ReschedulerConfig::default())
    }

    #[test_case(&[DEFAULT_ON_DEMAND_LABEL], NodeRole::OnDemand ; "on demand")]
    #[test_case(&[DEFAULT_SPOT_LABEL], NodeRole::Spot ; "spot")]
    #[test_case(&[], NodeRole::Other ; "unlabelled")]
    #[test_case(&["node-role.kubernetes.io/master"], NodeRole::Other ; "master")]
    #[test_case(&[DEFAULT_ON_DEMAND_LABEL, DEFAULT_SPOT_LABEL], NodeRole::Other ; "both labels")]
    fn classify(label_keys: &[&str], expected: NodeRole) {
        let node = label_keys
            .iter()
            .fold(Node::new("n"), |node, key| node.with_label(*key, "true"));
        assert_eq!(classifier().classify(&node), expected);
    }

    #[test]
    fn label_value_is_ignored() {
        let node = Node::new("n").with_label(DEFAULT_SPOT_LABEL, "");
        assert_eq!(classifier().classify(&node), NodeRole::Spot);
    }

    #[test]
    fn custom_labels() {
        let c = NodeClassifier::new("lifecycle/normal", "lifecycle/spot");
        assert_eq!(c.on_demand_label(), "lifecycle/normal");
        assert_eq!(c.spot_label(), "lifecycle/spot");
        let node = Node::new("n").with_label("lifecycle/spot", "1");
        assert_eq!(c.classify(&node), NodeRole::Spot);
        let node = Node::new("n").with_label(DEFAULT_SPOT_LABEL, "1");
        assert_eq!(c.classify(&node), NodeRole::Other);
    }

    #[test]
    fn role_display() {
        assert_eq!(NodeRole::OnDemand.to_string(), "on-demand");
        assert_eq!(NodeRole::Spot.as_str(), "spot");
    }
}
