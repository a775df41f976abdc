use crate::{
    k8s::{ResourceExt, ResourceUsage},
    orphan::{self, affected_usages, KubeEvents, Reconciler},
    tracker::KubeStore,
    TrackedKind,
};
use futures::prelude::*;
use kube::{
    api::{Api, ApiResource, DynamicObject},
    runtime::{controller::Action, watcher, Controller},
    Client,
};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

type UsageReconciler = Reconciler<KubeStore, KubeEvents>;

/// Looks up the API resource serving `kind`, if the cluster has one.
pub(crate) async fn discover(client: &Client, kind: &TrackedKind) -> Option<ApiResource> {
    let gvk = kind.gvk();
    let resources = if gvk.group.is_empty() {
        client.list_core_api_resources(&gvk.version).await
    } else {
        client.list_api_group_resources(&gvk.api_version()).await
    };
    resources
        .ok()?
        .resources
        .into_iter()
        .find(|r| r.kind == gvk.kind && !r.name.contains('/'))
        .map(|r| ApiResource::from_gvk_with_plural(&gvk, &r.name))
}

/// Runs the usage controller until the runtime shuts down.
///
/// Usages are reconciled when they change and whenever an object of a
/// tracked kind that they name as source or target changes.
pub(crate) async fn run(
    client: Client,
    tracked: Vec<ApiResource>,
    reconciler: UsageReconciler,
    drain: drain::Watch,
) {
    let mut controller = Controller::new(
        Api::<ResourceUsage>::all(client.clone()),
        watcher::Config::default(),
    );

    let usages = controller.store();
    for resource in tracked {
        let api = Api::<DynamicObject>::all_with(client.clone(), &resource);
        let usages = usages.clone();
        controller = controller.watches_with(
            api,
            resource,
            watcher::Config::default(),
            move |object| match object.uid() {
                Some(uid) => affected_usages(&uid, &usages.state()),
                None => Vec::new(),
            },
        );
    }

    let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
    let controller = controller
        .graceful_shutdown_on(async move {
            let _ = close_rx.await;
        })
        .run(reconcile, error_policy, Arc::new(reconciler))
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::debug!(%error, "Reconcile failed");
            }
        })
        .instrument(info_span!("usages"));
    tokio::pin!(controller);

    info!("Usage controller started");
    tokio::select! {
        _ = &mut controller => {}
        handle = drain.signaled() => {
            let _ = close_tx.send(());
            handle.release_after(controller).await;
        }
    }
}

async fn reconcile(
    usage: Arc<ResourceUsage>,
    reconciler: Arc<UsageReconciler>,
) -> Result<Action, orphan::Error> {
    let name = usage.name_any();
    let outcome = reconciler
        .reconcile(&name)
        .instrument(info_span!("reconcile", usage = %name))
        .await?;
    Ok(match outcome.requeue_after(reconciler.retry_after()) {
        Some(after) => Action::requeue(after),
        None => Action::await_change(),
    })
}

fn error_policy(
    _: Arc<ResourceUsage>,
    _: &orphan::Error,
    reconciler: Arc<UsageReconciler>,
) -> Action {
    Action::requeue(reconciler.retry_after())
}
