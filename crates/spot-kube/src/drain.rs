//! Node draining through the eviction API.
//!
//! Evictions respect disruption budgets: the API server answers `429` while
//! a budget forbids the disruption, and the eviction is retried until the
//! eviction timeout. Once every eviction has been accepted the drain waits
//! for the pods to actually disappear from the node.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::Pod as KubePod;
use kube::api::{Api, DeleteParams, EvictParams};
use kube::Client;
use spot_core::{DrainExecutor, Node, Pod, ReschedulerError};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::error::{KubeError, Result};
use crate::events::{EventRecorder, EventType};

/// Evictions in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Pause between attempts of a refused eviction.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Pause between checks for deleted pods.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Extra time granted on top of the grace period for pods to disappear.
pub const DEFAULT_DELETION_HEADROOM: Duration = Duration::from_secs(30);

/// How an eviction failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    /// Temporary; try again.
    Retry,
    /// The pod no longer exists.
    Gone,
    /// Permanent.
    Fail,
}

fn classify(err: &kube::Error) -> Refusal {
    match err {
        // 429: a disruption budget forbids it for now
        // 500: e.g. several budgets match the pod
        kube::Error::Api(resp) if resp.code == 429 || resp.code == 500 => Refusal::Retry,
        kube::Error::Api(resp) if resp.code == 404 => Refusal::Gone,
        kube::Error::Api(_) => Refusal::Fail,
        _ => Refusal::Retry,
    }
}

/// [`DrainExecutor`] that evicts pods through the API server.
#[derive(Clone)]
pub struct KubeDrainExecutor {
    client: Client,
    events: EventRecorder,
    concurrency: usize,
    retry_interval: Duration,
    poll_interval: Duration,
    deletion_headroom: Duration,
}

impl std::fmt::Debug for KubeDrainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeDrainExecutor")
            .field("concurrency", &self.concurrency)
            .field("retry_interval", &self.retry_interval)
            .field("poll_interval", &self.poll_interval)
            .field("deletion_headroom", &self.deletion_headroom)
            .finish_non_exhaustive()
    }
}

impl KubeDrainExecutor {
    /// Creates an executor with default pacing.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            events: EventRecorder::new(client.clone()),
            client,
            concurrency: DEFAULT_CONCURRENCY,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deletion_headroom: DEFAULT_DELETION_HEADROOM,
        }
    }

    /// Sets how many evictions run at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the pause between eviction attempts.
    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Sets the pause between deletion checks.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the extra time allowed for pods to disappear.
    #[must_use]
    pub const fn with_deletion_headroom(mut self, headroom: Duration) -> Self {
        self.deletion_headroom = headroom;
        self
    }

    fn pods_api(&self, namespace: &str) -> Api<KubePod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn evict(
        &self,
        node: &str,
        pod: &Pod,
        max_grace: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let grace = pod.grace_period(max_grace);
        let params = EvictParams {
            delete_options: Some(DeleteParams {
                grace_period_seconds: Some(u32::try_from(grace.as_secs()).unwrap_or(u32::MAX)),
                ..DeleteParams::default()
            }),
            ..EvictParams::default()
        };
        let api = self.pods_api(&pod.namespace);
        let deadline = Instant::now() + timeout;

        loop {
            let err = match api.evict(&pod.name, &params).await {
                Ok(_) => {
                    debug!(pod = %pod.key(), grace_secs = grace.as_secs(), "pod evicted");
                    let message = format!("evicted from node {node} to move it onto spot capacity");
                    self.events
                        .pod(pod, EventType::Normal, "Rescheduled", &message)
                        .await;
                    return Ok(());
                }
                Err(err) => err,
            };

            match classify(&err) {
                Refusal::Gone => {
                    debug!(pod = %pod.key(), "pod already gone");
                    return Ok(());
                }
                Refusal::Fail => {
                    return Err(KubeError::EvictionRejected {
                        pod: pod.key(),
                        source: err,
                    });
                }
                Refusal::Retry => {
                    debug!(pod = %pod.key(), error = %err, "eviction refused, retrying");
                    sleep(self.retry_interval).await;
                    if Instant::now() >= deadline {
                        return Err(KubeError::EvictionTimedOut {
                            pod: pod.key(),
                            timeout,
                            last_error: err.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Returns the pods that still run on `node`.
    async fn remaining(&self, node: &str, pods: &[Pod]) -> Vec<String> {
        let mut remaining = Vec::new();
        for pod in pods {
            match self.pods_api(&pod.namespace).get_opt(&pod.name).await {
                Ok(None) => {}
                Ok(Some(current)) => {
                    let same_uid = pod.uid.is_empty()
                        || current.metadata.uid.as_deref() == Some(pod.uid.as_str());
                    let same_node = current
                        .spec
                        .as_ref()
                        .and_then(|s| s.node_name.as_deref())
                        == Some(node);
                    if same_uid && same_node {
                        remaining.push(pod.key());
                    }
                }
                Err(e) => {
                    debug!(pod = %pod.key(), error = %e, "failed to check pod");
                    remaining.push(pod.key());
                }
            }
        }
        remaining
    }

    async fn wait_for_deletion(&self, node: &str, pods: &[Pod], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = self.remaining(node, pods).await;
            if remaining.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(KubeError::DeletionTimedOut {
                    pods: remaining,
                    timeout,
                });
            }
            debug!(node, remaining = remaining.len(), "waiting for pods to terminate");
            sleep(self.poll_interval).await;
        }
    }

    async fn evict_all(
        &self,
        node: &Node,
        pods: &[Pod],
        grace: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let evictions: Vec<_> = pods
            .iter()
            .map(|pod| self.evict(&node.name, pod, grace, timeout))
            .collect();
        let failures: Vec<KubeError> = stream::iter(evictions)
            .buffer_unordered(self.concurrency)
            .filter_map(|result| async move { result.err() })
            .collect()
            .await;

        if let Some(first) = failures.into_iter().next() {
            return Err(first);
        }
        self.wait_for_deletion(&node.name, pods, grace + self.deletion_headroom)
            .await
    }
}

impl DrainExecutor for KubeDrainExecutor {
    async fn drain(
        &self,
        node: &Node,
        pods: &[Pod],
        grace_period: Duration,
        eviction_timeout: Duration,
    ) -> spot_core::Result<()> {
        info!(node = %node.name, pods = pods.len(), "draining node");
        self.events
            .node(
                &node.name,
                EventType::Normal,
                "DrainStarted",
                &format!("evicting {} pods to move them onto spot nodes", pods.len()),
            )
            .await;

        match self.evict_all(node, pods, grace_period, eviction_timeout).await {
            Ok(()) => {
                info!(node = %node.name, "node drained");
                self.events
                    .node(&node.name, EventType::Normal, "DrainSucceeded", "all pods evicted")
                    .await;
                Ok(())
            }
            Err(e) => {
                warn!(node = %node.name, error = %e, "drain failed");
                self.events
                    .node(&node.name, EventType::Warning, "DrainFailed", &e.to_string())
                    .await;
                Err(ReschedulerError::DrainFailed {
                    node: node.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
