use crate::{
    events::{EventSink, BLOCKED_MESSAGE, REASON_USAGE_ACCOUNTING},
    metrics::ReconcileMetrics,
};
use btp_usage_controller_k8s_tracker::{
    k8s::{ResourceExt, ResourceUsage},
    ObjectStore, StoreError, UsageTracker,
};
use prometheus_client::encoding::EncodeLabelValue;
use std::time::Duration;

/// Keeps usages alive exactly as long as their target exists.
///
/// A usage gets a finalizer while its target exists. Once the target is gone
/// the finalizer is released and the usage is deleted. A usage that is
/// deleted while its target still exists is kept, and a warning event is
/// published.
pub struct Reconciler<S, E> {
    tracker: UsageTracker<S>,
    events: E,
    metrics: ReconcileMetrics,
    retry_after: Duration,
}

/// The result of a successful reconciliation.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    /// The usage no longer exists.
    Missing,
    /// The target is gone and so is the usage.
    Removed,
    /// A write failed and the usage should be reconciled again later.
    Retry,
    /// The usage is being deleted while its target still exists.
    Blocked,
    FinalizerAdded,
    Unchanged,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot get ResourceUsage {name}: {source}")]
    Get {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("cannot resolve target of ResourceUsage {name}: {source}")]
    ResolveTarget {
        name: String,
        #[source]
        source: StoreError,
    },
}

// === impl Reconciler ===

impl<S: ObjectStore, E: EventSink> Reconciler<S, E> {
    pub fn new(
        tracker: UsageTracker<S>,
        events: E,
        metrics: ReconcileMetrics,
        retry_after: Duration,
    ) -> Self {
        Self {
            tracker,
            events,
            metrics,
            retry_after,
        }
    }

    #[inline]
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    /// Reconciles the named usage against the current state of its target.
    pub async fn reconcile(&self, name: &str) -> Result<Outcome, Error> {
        let result = self.reconcile_usage(name).await;
        match &result {
            Ok(outcome) => tracing::debug!(?outcome, "Reconciled"),
            Err(error) => tracing::info!(%error, "Reconcile failed"),
        }
        self.metrics.record(&result);
        result
    }

    async fn reconcile_usage(&self, name: &str) -> Result<Outcome, Error> {
        let store = self.tracker.store();
        let mut usage = match store.get_usage(name).await {
            Ok(usage) => usage,
            Err(error) if error.is_not_found() => return Ok(Outcome::Missing),
            Err(source) => {
                return Err(Error::Get {
                    name: name.to_string(),
                    source,
                })
            }
        };

        let target = match self.tracker.resolve_target(&usage).await {
            Ok(target) => target,
            Err(error) if error.is_not_found() => return Ok(self.remove(usage).await),
            Err(source) => {
                return Err(Error::ResolveTarget {
                    name: name.to_string(),
                    source,
                })
            }
        };

        if usage.is_deleting() {
            tracing::debug!(usage = %name, owner = ?target.metadata.name, "Target still exists");
            self.events
                .warning(&usage, REASON_USAGE_ACCOUNTING, BLOCKED_MESSAGE)
                .await;
            return Ok(Outcome::Blocked);
        }

        if usage.has_finalizer() {
            return Ok(Outcome::Unchanged);
        }

        usage.add_finalizer();
        match store.update_usage(&usage).await {
            Ok(_) => Ok(Outcome::FinalizerAdded),
            Err(error) => {
                tracing::debug!(%error, "Failed to add finalizer");
                Ok(Outcome::Retry)
            }
        }
    }

    /// Releases the finalizer of a usage whose target is gone and deletes it.
    async fn remove(&self, mut usage: ResourceUsage) -> Outcome {
        let store = self.tracker.store();
        let name = usage.name_any();

        if usage.remove_finalizer() {
            if let Err(error) = store.update_usage(&usage).await {
                tracing::debug!(%error, "Failed to remove finalizer");
                return Outcome::Retry;
            }
        }

        match store.delete_usage(&name).await {
            Ok(()) => Outcome::Removed,
            // Releasing the finalizer of a deleting usage completes its deletion.
            Err(error) if error.is_not_found() => Outcome::Removed,
            Err(error) => {
                tracing::debug!(%error, "Failed to delete ResourceUsage");
                Outcome::Retry
            }
        }
    }
}

// === impl Outcome ===

impl Outcome {
    /// Returns how long to wait before reconciling again, if at all.
    pub fn requeue_after(&self, retry_after: Duration) -> Option<Duration> {
        match self {
            Self::Retry => Some(retry_after),
            _ => None,
        }
    }
}
