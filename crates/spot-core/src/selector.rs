//! Label selectors, node affinity, taints and tolerations.
//!
//! These follow Kubernetes matching rules closely enough for feasibility
//! checks against a simulated node:
//! - [`LabelSelector`]: `matchLabels` plus `matchExpressions`, empty selects all
//! - [`NodeAffinity`]: required node selector terms, ORed together
//! - [`Toleration`]: matched against a node [`Taint`]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Labels attached to an object.
pub type Labels = BTreeMap<String, String>;

/// Operator of a selector requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectorOperator {
    /// Label value is one of the listed values.
    In,
    /// Label is absent or its value is not one of the listed values.
    NotIn,
    /// Label is present.
    Exists,
    /// Label is absent.
    DoesNotExist,
    /// Label value, as an integer, is greater than the single listed value.
    Gt,
    /// Label value, as an integer, is less than the single listed value.
    Lt,
}

impl SelectorOperator {
    /// Parses the operator from its Kubernetes name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "In" => Some(Self::In),
            "NotIn" => Some(Self::NotIn),
            "Exists" => Some(Self::Exists),
            "DoesNotExist" => Some(Self::DoesNotExist),
            "Gt" => Some(Self::Gt),
            "Lt" => Some(Self::Lt),
            _ => None,
        }
    }
}

/// A single `key operator values` requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    /// Label key the requirement applies to.
    pub key: String,
    /// Matching operator.
    pub operator: SelectorOperator,
    /// Values for `In`, `NotIn`, `Gt` and `Lt`.
    pub values: Vec<String>,
}

impl Requirement {
    /// Creates a new requirement.
    #[must_use]
    pub fn new(key: impl Into<String>, operator: SelectorOperator) -> Self {
        Self {
            key: key.into(),
            operator,
            values: Vec::new(),
        }
    }

    /// Sets the values.
    #[must_use]
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the labels satisfy this requirement.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
            SelectorOperator::Gt | SelectorOperator::Lt => {
                let [bound] = self.values.as_slice() else {
                    return false;
                };
                let (Some(actual), Ok(bound)) =
                    (value.and_then(|v| v.parse::<i64>().ok()), bound.parse::<i64>())
                else {
                    return false;
                };
                if self.operator == SelectorOperator::Gt {
                    actual > bound
                } else {
                    actual < bound
                }
            }
        }
    }
}

/// Selects objects by their labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    /// Exact label matches.
    pub match_labels: Labels,
    /// Expression requirements.
    pub match_expressions: Vec<Requirement>,
}

impl LabelSelector {
    /// Creates an empty selector, which selects everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an exact label match.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Adds an expression requirement.
    #[must_use]
    pub fn with_expression(mut self, requirement: Requirement) -> Self {
        self.match_expressions.push(requirement);
        self
    }

    /// Returns true if the selector has no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    /// Returns true if the labels satisfy every constraint.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
            && self.match_expressions.iter().all(|r| r.matches(labels))
    }
}

/// One node selector term; its requirements are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelectorTerm {
    /// Requirements on node labels.
    pub match_expressions: Vec<Requirement>,
}

impl NodeSelectorTerm {
    /// Creates a term from requirements.
    #[must_use]
    pub fn new(match_expressions: Vec<Requirement>) -> Self {
        Self { match_expressions }
    }

    /// An empty term matches no nodes.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        !self.match_expressions.is_empty()
            && self.match_expressions.iter().all(|r| r.matches(labels))
    }
}

/// Required node affinity of a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAffinity {
    /// Terms of which at least one must match. No terms means no constraint.
    pub required_terms: Vec<NodeSelectorTerm>,
}

impl NodeAffinity {
    /// Creates an affinity from terms.
    #[must_use]
    pub fn new(required_terms: Vec<NodeSelectorTerm>) -> Self {
        Self { required_terms }
    }

    /// Returns true if the node labels satisfy the affinity.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        self.required_terms.is_empty() || self.required_terms.iter().any(|t| t.matches(labels))
    }
}

/// A required pod anti-affinity term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodAffinityTerm {
    /// Pods selected by this selector repel the owner.
    pub selector: LabelSelector,
    /// Node label defining the topology domain.
    pub topology_key: String,
    /// Namespaces to search. Empty means the owner's namespace.
    pub namespaces: Vec<String>,
}

impl PodAffinityTerm {
    /// Creates a term in the owner's namespace.
    #[must_use]
    pub fn new(selector: LabelSelector, topology_key: impl Into<String>) -> Self {
        Self {
            selector,
            topology_key: topology_key.into(),
            namespaces: Vec::new(),
        }
    }

    /// Restricts the term to the given namespaces.
    #[must_use]
    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if a pod with the given namespace and labels is selected.
    #[must_use]
    pub fn selects(&self, owner_namespace: &str, namespace: &str, labels: &Labels) -> bool {
        let in_scope = if self.namespaces.is_empty() {
            namespace == owner_namespace
        } else {
            self.namespaces.iter().any(|n| n == namespace)
        };
        in_scope && self.selector.matches(labels)
    }
}

/// Effect of a node taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaintEffect {
    /// New pods are not scheduled unless they tolerate the taint.
    NoSchedule,
    /// Scheduler avoids the node but may still use it.
    PreferNoSchedule,
    /// Running pods are evicted and new pods are not scheduled.
    NoExecute,
}

impl TaintEffect {
    /// Parses the effect from its Kubernetes name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NoSchedule" => Some(Self::NoSchedule),
            "PreferNoSchedule" => Some(Self::PreferNoSchedule),
            "NoExecute" => Some(Self::NoExecute),
            _ => None,
        }
    }

    /// Returns true if the effect prevents scheduling.
    #[must_use]
    pub const fn blocks_scheduling(self) -> bool {
        matches!(self, Self::NoSchedule | Self::NoExecute)
    }
}

/// A taint on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Taint {
    /// Taint key.
    pub key: String,
    /// Optional taint value.
    pub value: Option<String>,
    /// Taint effect.
    pub effect: TaintEffect,
}

impl Taint {
    /// Creates a taint.
    #[must_use]
    pub fn new(key: impl Into<String>, value: Option<&str>, effect: TaintEffect) -> Self {
        Self {
            key: key.into(),
            value: value.map(str::to_string),
            effect,
        }
    }
}

/// Operator of a toleration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TolerationOperator {
    /// Key and value must be equal.
    #[default]
    Equal,
    /// Key must exist, value ignored.
    Exists,
}

/// A pod toleration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Toleration {
    /// Taint key to tolerate. `None` with `Exists` tolerates every taint.
    pub key: Option<String>,
    /// Matching operator.
    pub operator: TolerationOperator,
    /// Value for the `Equal` operator.
    pub value: Option<String>,
    /// Effect to tolerate. `None` tolerates all effects.
    pub effect: Option<TaintEffect>,
}

impl Toleration {
    /// Tolerates a taint with the given key and value.
    #[must_use]
    pub fn equal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            operator: TolerationOperator::Equal,
            value: Some(value.into()),
            effect: None,
        }
    }

    /// Tolerates any taint with the given key.
    #[must_use]
    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            operator: TolerationOperator::Exists,
            value: None,
            effect: None,
        }
    }

    /// Restricts the toleration to one effect.
    #[must_use]
    pub const fn with_effect(mut self, effect: TaintEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    /// Returns true if this toleration tolerates the taint.
    #[must_use]
    pub fn tolerates(&self, taint: &Taint) -> bool {
        if self.effect.is_some_and(|e| e != taint.effect) {
            return false;
        }
        let Some(key) = self.key.as_deref().filter(|k| !k.is_empty()) else {
            return self.operator == TolerationOperator::Exists;
        };
        if key != taint.key {
            return false;
        }
        match self.operator {
            TolerationOperator::Exists => true,
            TolerationOperator::Equal => {
                self.value.as_deref().unwrap_or_default()
                    == taint.value.as_deref().unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    mod requirement {
        use super::*;
        use test_case::test_case;

        #[test_case(SelectorOperator::In, &["a", "b"], Some("a"), true ; "in present")]
        #[test_case(SelectorOperator::In, &["a"], Some("c"), false ; "in other value")]
        #[test_case(SelectorOperator::In, &["a"], None, false ; "in absent")]
        #[test_case(SelectorOperator::NotIn, &["a"], Some("c"), true ; "not in other value")]
        #[test_case(SelectorOperator::NotIn, &["a"], None, true ; "not in absent")]
        #[test_case(SelectorOperator::NotIn, &["a"], Some("a"), false ; "not in listed")]
        #[test_case(SelectorOperator::Exists, &[], Some("x"), true ; "exists present")]
        #[test_case(SelectorOperator::Exists, &[], None, false ; "exists absent")]
        #[test_case(SelectorOperator::DoesNotExist, &[], None, true ; "does not exist absent")]
        #[test_case(SelectorOperator::Gt, &["4"], Some("8"), true ; "gt larger")]
        #[test_case(SelectorOperator::Gt, &["4"], Some("4"), false ; "gt equal")]
        #[test_case(SelectorOperator::Lt, &["4"], Some("2"), true ; "lt smaller")]
        #[test_case(SelectorOperator::Lt, &["4"], Some("abc"), false ; "lt not a number")]
        #[test_case(SelectorOperator::Gt, &["1", "2"], Some("8"), false ; "gt needs single value")]
        fn matches(op: SelectorOperator, values: &[&str], actual: Option<&str>, expected: bool) {
            let req = Requirement::new("zone", op).with_values(values.iter().copied());
            let l = actual.map_or_else(Labels::new, |v| labels(&[("zone", v)]));
            assert_eq!(req.matches(&l), expected);
        }

        #[test]
        fn parse_operator() {
            assert_eq!(SelectorOperator::parse("NotIn"), Some(SelectorOperator::NotIn));
            assert_eq!(SelectorOperator::parse("Between"), None);
        }
    }

    mod label_selector {
        use super::*;

        #[test]
        fn empty_selects_everything() {
            let sel = LabelSelector::new();
            assert!(sel.is_empty());
            assert!(sel.matches(&Labels::new()));
            assert!(sel.matches(&labels(&[("app", "web")])));
        }

        #[test]
        fn labels_and_expressions_are_anded() {
            let sel = LabelSelector::new()
                .with_label("app", "web")
                .with_expression(Requirement::new("tier", SelectorOperator::Exists));
            assert!(sel.matches(&labels(&[("app", "web"), ("tier", "fe")])));
            assert!(!sel.matches(&labels(&[("app", "web")])));
            assert!(!sel.matches(&labels(&[("app", "db"), ("tier", "fe")])));
        }
    }

    mod node_affinity {
        use super::*;

        #[test]
        fn no_terms_matches() {
            assert!(NodeAffinity::default().matches(&Labels::new()));
        }

        #[test]
        fn terms_are_ored() {
            let affinity = NodeAffinity::new(vec![
                NodeSelectorTerm::new(vec![
                    Requirement::new("zone", SelectorOperator::In).with_values(["a"]),
                ]),
                NodeSelectorTerm::new(vec![
                    Requirement::new("zone", SelectorOperator::In).with_values(["b"]),
                ]),
            ]);
            assert!(affinity.matches(&labels(&[("zone", "b")])));
            assert!(!affinity.matches(&labels(&[("zone", "c")])));
        }

        #[test]
        fn empty_term_matches_nothing() {
            let affinity = NodeAffinity::new(vec![NodeSelectorTerm::default()]);
            assert!(!affinity.matches(&labels(&[("zone", "a")])));
        }
    }

    mod pod_affinity_term {
        use super::*;

        #[test]
        fn defaults_to_owner_namespace() {
            let term = PodAffinityTerm::new(
                LabelSelector::new().with_label("app", "web"),
                "kubernetes.io/hostname",
            );
            let l = labels(&[("app", "web")]);
            assert!(term.selects("prod", "prod", &l));
            assert!(!term.selects("prod", "dev", &l));
        }

        #[test]
        fn explicit_namespaces() {
            let term = PodAffinityTerm::new(LabelSelector::new(), "kubernetes.io/hostname")
                .with_namespaces(["dev"]);
            assert!(term.selects("prod", "dev", &Labels::new()));
            assert!(!term.selects("prod", "prod", &Labels::new()));
        }
    }

    mod toleration {
        use super::*;

        fn taint() -> Taint {
            Taint::new("dedicated", Some("spot"), TaintEffect::NoSchedule)
        }

        #[test]
        fn equal_matches_key_and_value() {
            assert!(Toleration::equal("dedicated", "spot").tolerates(&taint()));
            assert!(!Toleration::equal("dedicated", "gpu").tolerates(&taint()));
        }

        #[test]
        fn exists_ignores_value() {
            assert!(Toleration::exists("dedicated").tolerates(&taint()));
            assert!(!Toleration::exists("other").tolerates(&taint()));
        }

        #[test]
        fn empty_key_exists_tolerates_everything() {
            let tol = Toleration {
                operator: TolerationOperator::Exists,
                ..Toleration::default()
            };
            assert!(tol.tolerates(&taint()));
        }

        #[test]
        fn empty_key_equal_tolerates_nothing() {
            assert!(!Toleration::default().tolerates(&taint()));
        }

        #[test]
        fn effect_must_match_when_set() {
            let tol = Toleration::exists("dedicated").with_effect(TaintEffect::NoExecute);
            assert!(!tol.tolerates(&taint()));
            let tol = Toleration::exists("dedicated").with_effect(TaintEffect::NoSchedule);
            assert!(tol.tolerates(&taint()));
        }

        #[test]
        fn missing_value_equals_empty_value() {
            let t = Taint::new("dedicated", None, TaintEffect::NoSchedule);
            assert!(Toleration::equal("dedicated", "").tolerates(&t));
        }
    }

    #[test]
    fn taint_effect_blocks_scheduling() {
        assert!(TaintEffect::NoSchedule.blocks_scheduling());
        assert!(TaintEffect::NoExecute.blocks_scheduling());
        assert!(!TaintEffect::PreferNoSchedule.blocks_scheduling());
        assert_eq!(TaintEffect::parse("NoExecute"), Some(TaintEffect::NoExecute));
    }
}
