use crate::{EventSink, Error, Outcome, ReconcileMetrics, Reconciler, BLOCKED_MESSAGE};
use btp_usage_controller_k8s_tracker::{
    k8s::{
        usage::FINALIZER, ObjectMeta, OwnerReference, ResourceExt, ResourceUsage, TypedReference,
    },
    store::{MemoryStore, ObjectStore, Operation},
    UsageTracker,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};

const NAME: &str = "dir-uid.sub-uid";

#[derive(Debug, Default)]
struct RecordedEvents(Mutex<Vec<(String, String, String)>>);

#[async_trait::async_trait]
impl EventSink for Arc<RecordedEvents> {
    async fn warning(&self, usage: &ResourceUsage, reason: &str, note: &str) {
        self.0
            .lock()
            .push((usage.name_any(), reason.to_string(), note.to_string()));
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    events: Arc<RecordedEvents>,
    reconciler: Reconciler<MemoryStore, Arc<RecordedEvents>>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::default());
    let events = Arc::new(RecordedEvents::default());
    let reconciler = Reconciler::new(
        UsageTracker::new(store.clone()),
        events.clone(),
        ReconcileMetrics::default(),
        Duration::from_secs(30),
    );
    Fixture {
        store,
        events,
        reconciler,
    }
}

fn typed(kind: &str, name: &str, uid: &str) -> TypedReference {
    TypedReference {
        api_version: "account.btp.sap.crossplane.io/v1alpha1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: Some(uid.to_string()),
    }
}

fn target() -> TypedReference {
    typed("Subaccount", "fake-subaccount", "sub-uid")
}

fn usage() -> ResourceUsage {
    let target = target();
    let owner = OwnerReference {
        api_version: target.api_version.clone(),
        kind: target.kind.clone(),
        name: target.name.clone(),
        uid: "sub-uid".to_string(),
        controller: Some(true),
        block_owner_deletion: Some(false),
    };
    ResourceUsage::between(typed("Directory", "fake-directory", "dir-uid"), target, owner)
        .expect("references have uids")
}

fn finalized_usage() -> ResourceUsage {
    let mut usage = usage();
    usage.add_finalizer();
    usage
}

fn insert_target(store: &MemoryStore) {
    let target = target();
    store.insert_object(
        &target.gvk(),
        ObjectMeta {
            name: Some(target.name),
            uid: target.uid,
            ..Default::default()
        },
    );
}

#[tokio::test]
async fn missing_usage() {
    let Fixture { reconciler, .. } = fixture();
    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Missing);
}

#[tokio::test]
async fn adds_finalizer_while_target_exists() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    insert_target(&store);
    store.insert_usage(usage());

    assert_eq!(
        reconciler.reconcile(NAME).await.unwrap(),
        Outcome::FinalizerAdded
    );
    let stored = store.usage(NAME).expect("usage remains");
    assert_eq!(stored.finalizers(), [FINALIZER.to_string()]);

    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Unchanged);
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn retries_when_finalizer_cannot_be_added() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    insert_target(&store);
    store.insert_usage(usage());
    store.fail(Operation::UpdateUsage);

    let outcome = reconciler.reconcile(NAME).await.unwrap();
    assert_eq!(outcome, Outcome::Retry);
    assert_eq!(
        outcome.requeue_after(reconciler.retry_after()),
        Some(Duration::from_secs(30))
    );
    assert!(!store.usage(NAME).expect("usage remains").has_finalizer());
}

#[tokio::test]
async fn removes_usage_of_deleted_target() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    store.insert_usage(finalized_usage());

    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Removed);
    assert!(store.usage(NAME).is_none());
    assert_eq!(Outcome::Removed.requeue_after(reconciler.retry_after()), None);
}

#[tokio::test]
async fn removes_deleting_usage_of_deleted_target() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    store.insert_usage(finalized_usage());
    store.delete_usage(NAME).await.unwrap();
    assert!(store.usage(NAME).expect("finalizer holds usage").is_deleting());

    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Removed);
    assert!(store.usage(NAME).is_none());
}

#[tokio::test]
async fn removes_usage_without_finalizer() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    store.insert_usage(usage());

    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Removed);
    assert!(store.usage(NAME).is_none());
    // Only the delete was written.
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn retries_when_finalizer_cannot_be_removed() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    store.insert_usage(finalized_usage());
    store.fail(Operation::UpdateUsage);

    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Retry);
    assert!(store.usage(NAME).expect("usage remains").has_finalizer());

    store.recover(Operation::UpdateUsage);
    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Removed);
}

#[tokio::test]
async fn retries_when_usage_cannot_be_deleted() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    store.insert_usage(usage());
    store.fail(Operation::DeleteUsage);

    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Retry);
    assert!(store.usage(NAME).is_some());
}

#[tokio::test]
async fn blocks_deletion_while_target_exists() {
    let Fixture {
        store,
        events,
        reconciler,
    } = fixture();
    insert_target(&store);
    store.insert_usage(finalized_usage());
    store.delete_usage(NAME).await.unwrap();

    assert_eq!(reconciler.reconcile(NAME).await.unwrap(), Outcome::Blocked);

    let stored = store.usage(NAME).expect("usage is kept");
    assert!(stored.is_deleting());
    assert!(stored.has_finalizer());
    assert_eq!(
        *events.0.lock(),
        vec![(
            NAME.to_string(),
            "UsageAccounting".to_string(),
            BLOCKED_MESSAGE.to_string()
        )]
    );
}

#[tokio::test]
async fn target_lookup_failure_is_an_error() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    store.insert_usage(finalized_usage());
    store.fail(Operation::GetMetadata);

    let err = reconciler.reconcile(NAME).await.unwrap_err();
    assert!(matches!(err, Error::ResolveTarget { ref name, .. } if name == NAME));
    assert!(store.usage(NAME).is_some());
}

#[tokio::test]
async fn usage_lookup_failure_is_an_error() {
    let Fixture {
        store, reconciler, ..
    } = fixture();
    store.fail(Operation::GetUsage);

    let err = reconciler.reconcile(NAME).await.unwrap_err();
    assert!(matches!(err, Error::Get { .. }), "{err}");
}
