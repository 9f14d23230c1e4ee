//! Cluster listings backed by the API server.

use k8s_openapi::api::core::v1::{Node as KubeNode, Pod as KubePod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget as KubeBudget;
use kube::api::{Api, ListParams};
use kube::Client;
use spot_core::{ClusterReader, Node, Pod, PodDisruptionBudget, ReschedulerError};
use tracing::debug;

use crate::convert;

/// Pods that still occupy a node.
const ACTIVE_PODS: &str = "status.phase!=Succeeded,status.phase!=Failed";

/// Pending pods not yet bound to a node.
const PENDING_UNBOUND_PODS: &str = "spec.nodeName=,status.phase!=Succeeded,status.phase!=Failed";

/// [`ClusterReader`] that lists objects across all namespaces.
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl std::fmt::Debug for KubeClusterReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterReader").finish_non_exhaustive()
    }
}

impl KubeClusterReader {
    /// Creates a reader.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    async fn pods(&self, fields: &str) -> Result<Vec<KubePod>, kube::Error> {
        let api: Api<KubePod> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default().fields(fields)).await?.items)
    }
}

impl ClusterReader for KubeClusterReader {
    async fn list_ready_nodes(&self) -> spot_core::Result<Vec<Node>> {
        let api: Api<KubeNode> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ReschedulerError::ListNodes {
                reason: e.to_string(),
            })?;
        let total = list.items.len();
        let nodes: Vec<Node> = list
            .items
            .iter()
            .filter(|n| convert::is_node_ready(n))
            .filter_map(convert::node_from)
            .filter(|n| !n.unschedulable)
            .collect();
        debug!(total, ready = nodes.len(), "listed nodes");
        Ok(nodes)
    }

    async fn list_pods(&self) -> spot_core::Result<Vec<Pod>> {
        let pods = self
            .pods(ACTIVE_PODS)
            .await
            .map_err(|e| ReschedulerError::ListPods {
                reason: e.to_string(),
            })?;
        Ok(pods.iter().filter_map(convert::pod_from).collect())
    }

    async fn list_disruption_budgets(&self) -> spot_core::Result<Vec<PodDisruptionBudget>> {
        let api: Api<KubeBudget> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ReschedulerError::ListDisruptionBudgets {
                reason: e.to_string(),
            })?;
        Ok(list.items.iter().filter_map(convert::budget_from).collect())
    }

    async fn list_unschedulable_pods(&self) -> spot_core::Result<Vec<Pod>> {
        let pods = self
            .pods(PENDING_UNBOUND_PODS)
            .await
            .map_err(|e| ReschedulerError::ListUnschedulablePods {
                reason: e.to_string(),
            })?;
        Ok(pods
            .iter()
            .filter(|p| convert::is_unschedulable(p))
            .filter_map(convert::pod_from)
            .collect())
    }
}
