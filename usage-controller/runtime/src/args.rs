use crate::{controller, orphan, tracker};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{str::FromStr, sync::Arc};
use tokio::time::Duration;

#[derive(Debug, Parser)]
#[clap(
    name = "usage-controller",
    about = "Tracks which managed resources use which, and cleans up after them"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "btp_usage=info,warn",
        env = "BTP_USAGE_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// A kind whose objects may be the source or target of a usage, as
    /// `Kind.version.group`.
    ///
    /// Changes to objects of these kinds trigger reconciliation of the
    /// usages that name them.
    #[clap(long = "tracked-kind")]
    tracked_kinds: Vec<TrackedKind>,

    #[clap(long, default_value = "10000")]
    store_timeout_ms: u64,

    #[clap(long, default_value = "30")]
    retry_after_secs: u64,

    #[clap(long, default_value = "orchestrate.cloud.sap/resourceusage")]
    controller_name: String,
}

/// A kind named on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTrackedKind {
    #[error("tracked kind {0:?} must have the form Kind.version.group")]
    Format(String),
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            tracked_kinds,
            store_timeout_ms,
            retry_after_secs,
            controller_name,
        } = self;

        let mut prom = <Registry>::default();
        let metrics =
            orphan::ReconcileMetrics::register(prom.sub_registry_with_prefix("resource_usage"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let client = runtime.client();
        let mut tracked = Vec::with_capacity(tracked_kinds.len());
        for kind in &tracked_kinds {
            match controller::discover(&client, kind).await {
                Some(resource) => tracked.push(resource),
                None => tracing::warn!(?kind, "Resource kind not found, skipping watches"),
            }
        }

        let store = tracker::KubeStore::new(client.clone(), Duration::from_millis(store_timeout_ms))
            .with_resources(tracked.iter().cloned());
        let reconciler = orphan::Reconciler::new(
            tracker::UsageTracker::new(Arc::new(store)),
            orphan::KubeEvents::new(client.clone(), controller_name),
            metrics,
            Duration::from_secs(retry_after_secs),
        );

        tokio::spawn(controller::run(
            client,
            tracked,
            reconciler,
            runtime.shutdown_handle(),
        ));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

// === impl TrackedKind ===

impl TrackedKind {
    pub fn gvk(&self) -> crate::k8s::GroupVersionKind {
        crate::k8s::GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }
}

impl FromStr for TrackedKind {
    type Err = InvalidTrackedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let kind = parts.next().unwrap_or_default();
        let version = parts.next().unwrap_or_default();
        // Core kinds have no group.
        let group = parts.next().unwrap_or_default();
        if kind.is_empty() || version.is_empty() || (s.ends_with('.') && group.is_empty()) {
            return Err(InvalidTrackedKind::Format(s.to_string()));
        }
        Ok(Self {
            group: group.to_ascii_lowercase(),
            version: version.to_ascii_lowercase(),
            kind: kind.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_tracked_kinds() {
        assert_eq!(
            "Subaccount.v1alpha1.account.btp.sap.crossplane.io"
                .parse::<TrackedKind>()
                .unwrap(),
            TrackedKind {
                group: "account.btp.sap.crossplane.io".to_string(),
                version: "v1alpha1".to_string(),
                kind: "Subaccount".to_string(),
            }
        );
        assert_eq!(
            "ConfigMap.v1".parse::<TrackedKind>().unwrap().gvk(),
            crate::k8s::GroupVersionKind::gvk("", "v1", "ConfigMap")
        );
        assert_eq!(
            "Directory.V1Alpha1.Account.BTP.sap.crossplane.io"
                .parse::<TrackedKind>()
                .unwrap()
                .gvk()
                .api_version(),
            "account.btp.sap.crossplane.io/v1alpha1"
        );
    }

    #[test]
    fn reject_malformed_tracked_kinds() {
        for s in ["", "Subaccount", ".v1", "Subaccount.", "ConfigMap.v1."] {
            assert_eq!(
                s.parse::<TrackedKind>(),
                Err(InvalidTrackedKind::Format(s.to_string())),
                "{s:?}"
            );
        }
    }

    #[test]
    fn parse_args() {
        let args = Args::try_parse_from([
            "usage-controller",
            "--tracked-kind",
            "Directory.v1alpha1.account.btp.sap.crossplane.io",
            "--tracked-kind",
            "Subaccount.v1alpha1.account.btp.sap.crossplane.io",
        ])
        .unwrap();
        assert_eq!(args.tracked_kinds.len(), 2);
        assert_eq!(args.store_timeout_ms, 10_000);
        assert_eq!(args.retry_after_secs, 30);
        assert_eq!(args.controller_name, "orchestrate.cloud.sap/resourceusage");
    }
}
