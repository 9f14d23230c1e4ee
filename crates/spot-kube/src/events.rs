//! Kubernetes events announcing drains.

use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, PostParams};
use kube::Client;
use spot_core::Pod;
use tracing::{debug, warn};

/// Source component on every emitted event.
pub const COMPONENT: &str = "rescheduler";

/// Namespace for events about cluster-scoped objects.
const CLUSTER_EVENTS_NAMESPACE: &str = "default";

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Routine progress.
    Normal,
    /// Something went wrong.
    Warning,
}

impl EventType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// Best-effort event publisher. Failures are logged and swallowed.
#[derive(Clone)]
pub struct EventRecorder {
    client: Client,
    component: String,
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl EventRecorder {
    /// Creates a recorder reporting as [`COMPONENT`].
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            component: COMPONENT.to_string(),
        }
    }

    /// Records an event about a node.
    pub async fn node(&self, node: &str, kind: EventType, reason: &str, message: &str) {
        let object = ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Node".to_string()),
            name: Some(node.to_string()),
            uid: Some(node.to_string()),
            ..ObjectReference::default()
        };
        self.publish(CLUSTER_EVENTS_NAMESPACE, object, kind, reason, message)
            .await;
    }

    /// Records an event about a pod.
    pub async fn pod(&self, pod: &Pod, kind: EventType, reason: &str, message: &str) {
        let object = ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Pod".to_string()),
            name: Some(pod.name.clone()),
            namespace: Some(pod.namespace.clone()),
            uid: Some(pod.uid.clone()).filter(|u| !u.is_empty()),
            ..ObjectReference::default()
        };
        self.publish(&pod.namespace, object, kind, reason, message)
            .await;
    }

    async fn publish(
        &self,
        namespace: &str,
        object: ObjectReference,
        kind: EventType,
        reason: &str,
        message: &str,
    ) {
        let now = Time(Utc::now());
        let prefix = object.name.as_deref().unwrap_or("object");
        let event = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{prefix}.")),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            involved_object: object,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            type_: Some(kind.as_str().to_string()),
            source: Some(EventSource {
                component: Some(self.component.clone()),
                host: None,
            }),
            reporting_component: Some(self.component.clone()),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            count: Some(1),
            ..Event::default()
        };

        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), &event).await {
            Ok(_) => debug!(namespace, reason, "recorded event"),
            Err(e) => warn!(namespace, reason, error = %e, "failed to record event"),
        }
    }
}
