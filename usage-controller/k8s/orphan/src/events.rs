use btp_usage_controller_k8s_tracker::k8s::{Resource, ResourceUsage};
use kube::{
    runtime::events::{Event, EventType, Recorder},
    Client,
};

pub const REASON_USAGE_ACCOUNTING: &str = "UsageAccounting";

pub const BLOCKED_MESSAGE: &str = "Blocking deletion while target still exist";

/// Publishes events about usages.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn warning(&self, usage: &ResourceUsage, reason: &str, note: &str);
}

/// Publishes events to the Kubernetes API.
#[derive(Clone)]
pub struct KubeEvents {
    recorder: Recorder,
}

// === impl KubeEvents ===

impl KubeEvents {
    pub fn new(client: Client, controller: String) -> Self {
        Self {
            recorder: Recorder::new(client, controller.into()),
        }
    }
}

#[async_trait::async_trait]
impl EventSink for KubeEvents {
    async fn warning(&self, usage: &ResourceUsage, reason: &str, note: &str) {
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(note.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(error) = self.recorder.publish(&event, &usage.object_ref(&())).await {
            tracing::warn!(%error, "Failed to publish event");
        }
    }
}
