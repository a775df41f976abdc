use super::{ObjectStore, StoreError};
use crate::k8s::{GroupVersionKind, ObjectMeta, ResourceUsage, ResourceExt};
use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams},
    Client,
};
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use tokio::time;

/// An [`ObjectStore`] backed by the Kubernetes API server.
///
/// Objects are looked up cluster-wide, so referenced kinds must be cluster
/// scoped.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    usages: Api<ResourceUsage>,
    resources: Arc<ApiResources>,
    timeout: Duration,
}

/// API resources reported by discovery, keyed by group, version and kind.
///
/// Kinds that were not discovered fall back to a plural guessed from the
/// kind name.
#[derive(Clone, Debug, Default)]
pub struct ApiResources(HashMap<(String, String, String), ApiResource>);

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            usages: Api::all(client.clone()),
            resources: Default::default(),
            client,
            timeout,
        }
    }

    /// Resolves the kinds in `resources` with their discovered plurals.
    pub fn with_resources(mut self, resources: impl IntoIterator<Item = ApiResource>) -> Self {
        self.resources = Arc::new(resources.into_iter().collect());
        self
    }

    async fn timed<T>(
        &self,
        kind: &str,
        name: &str,
        request: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<T, StoreError> {
        match time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(classify(error, kind, name)),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get_metadata(
        &self,
        gvk: &GroupVersionKind,
        name: &str,
    ) -> Result<ObjectMeta, StoreError> {
        let resource = self.resources.resolve(gvk);
        let api = Api::<DynamicObject>::all_with(self.client.clone(), &resource);
        let object = self.timed(&gvk.kind, name, api.get_metadata(name)).await?;
        Ok(object.metadata)
    }

    async fn get_usage(&self, name: &str) -> Result<ResourceUsage, StoreError> {
        self.timed("ResourceUsage", name, self.usages.get(name))
            .await
    }

    async fn list_usages(&self, key: &str, value: &str) -> Result<Vec<ResourceUsage>, StoreError> {
        let params = ListParams::default().labels(&format!("{key}={value}"));
        let list = self
            .timed("ResourceUsage", "", self.usages.list(&params))
            .await?;
        Ok(list.items)
    }

    async fn create_usage(&self, usage: &ResourceUsage) -> Result<ResourceUsage, StoreError> {
        let name = usage.name_any();
        self.timed(
            "ResourceUsage",
            &name,
            self.usages.create(&PostParams::default(), usage),
        )
        .await
    }

    async fn update_usage(&self, usage: &ResourceUsage) -> Result<ResourceUsage, StoreError> {
        let name = usage.name_any();
        self.timed(
            "ResourceUsage",
            &name,
            self.usages.replace(&name, &PostParams::default(), usage),
        )
        .await
    }

    async fn delete_usage(&self, name: &str) -> Result<(), StoreError> {
        self.timed(
            "ResourceUsage",
            name,
            self.usages.delete(name, &DeleteParams::default()),
        )
        .await
        .map(|_| ())
    }
}

// === impl ApiResources ===

impl ApiResources {
    fn key(group: &str, version: &str, kind: &str) -> (String, String, String) {
        (
            group.to_ascii_lowercase(),
            version.to_ascii_lowercase(),
            kind.to_string(),
        )
    }

    pub fn resolve(&self, gvk: &GroupVersionKind) -> ApiResource {
        self.0
            .get(&Self::key(&gvk.group, &gvk.version, &gvk.kind))
            .cloned()
            .unwrap_or_else(|| ApiResource::from_gvk(gvk))
    }
}

impl FromIterator<ApiResource> for ApiResources {
    fn from_iter<I: IntoIterator<Item = ApiResource>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|resource| {
                    let key = Self::key(&resource.group, &resource.version, &resource.kind);
                    (key, resource)
                })
                .collect(),
        )
    }
}

fn classify(error: kube::Error, kind: &str, name: &str) -> StoreError {
    let (kind, name) = (kind.to_string(), name.to_string());
    match error {
        kube::Error::Api(ref response) if response.code == 404 => {
            StoreError::NotFound { kind, name }
        }
        kube::Error::Api(ref response) if response.code == 409 => {
            if response.reason == "AlreadyExists" {
                StoreError::AlreadyExists { kind, name }
            } else {
                StoreError::Conflict { kind, name }
            }
        }
        error => StoreError::Kube(error),
    }
}
