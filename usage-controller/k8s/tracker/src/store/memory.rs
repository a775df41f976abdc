//! An in-memory [`ObjectStore`] for tests.
//!
//! Usages follow API server semantics closely enough to exercise the
//! tracker and the orphan reconciler: resource versions are checked on
//! update, and deleting a usage that still has finalizers only marks it as
//! deleting.

use super::{ObjectStore, StoreError};
use crate::k8s::{k8s_openapi, GroupVersionKind, ObjectMeta, Resource, ResourceExt, ResourceUsage, Time};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    writes: AtomicUsize,
}

/// Store operations that may be made to fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetMetadata,
    GetUsage,
    ListUsages,
    CreateUsage,
    UpdateUsage,
    DeleteUsage,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<ObjectKey, ObjectMeta>,
    usages: BTreeMap<String, ResourceUsage>,
    failing: HashSet<Operation>,
    racing: Option<ResourceUsage>,
    version: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ObjectKey {
    group: String,
    version: String,
    kind: String,
    name: String,
}

const USAGE_KIND: &str = "ResourceUsage";

// === impl MemoryStore ===

impl MemoryStore {
    /// Stores the metadata of `resource` so it can be resolved by kind and
    /// name.
    pub fn insert<K: Resource<DynamicType = ()>>(&self, resource: &K) {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.insert_object(&gvk, resource.meta().clone());
    }

    pub fn insert_object(&self, gvk: &GroupVersionKind, metadata: ObjectMeta) {
        let key = ObjectKey::new(gvk, metadata.name.as_deref().unwrap_or_default());
        self.state.write().objects.insert(key, metadata);
    }

    pub fn remove<K: Resource<DynamicType = ()>>(&self, resource: &K) {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.remove_object(&gvk, &resource.name_any());
    }

    pub fn remove_object(&self, gvk: &GroupVersionKind, name: &str) {
        self.state.write().objects.remove(&ObjectKey::new(gvk, name));
    }

    /// Stores a usage as-is, bypassing write accounting and conflict checks.
    pub fn insert_usage(&self, mut usage: ResourceUsage) -> ResourceUsage {
        let mut state = self.state.write();
        usage.metadata.resource_version = Some(state.next_version());
        state.usages.insert(usage.name_any(), usage.clone());
        usage
    }

    /// Stores `usage` just before the next create, as if another writer won
    /// the race to create it.
    pub fn insert_before_create(&self, usage: ResourceUsage) {
        self.state.write().racing = Some(usage);
    }

    pub fn usage(&self, name: &str) -> Option<ResourceUsage> {
        self.state.read().usages.get(name).cloned()
    }

    pub fn usages(&self) -> Vec<ResourceUsage> {
        self.state.read().usages.values().cloned().collect()
    }

    /// The number of successful usage writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail(&self, operation: Operation) {
        self.state.write().failing.insert(operation);
    }

    pub fn recover(&self, operation: Operation) {
        self.state.write().failing.remove(&operation);
    }

    fn check(&self, operation: Operation) -> Result<(), StoreError> {
        if self.state.read().failing.contains(&operation) {
            return Err(StoreError::Unavailable(format!("{operation:?} failed")));
        }
        Ok(())
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn get_metadata(
        &self,
        gvk: &GroupVersionKind,
        name: &str,
    ) -> Result<ObjectMeta, StoreError> {
        self.check(Operation::GetMetadata)?;
        self.state
            .read()
            .objects
            .get(&ObjectKey::new(gvk, name))
            .cloned()
            .ok_or_else(|| not_found(&gvk.kind, name))
    }

    async fn get_usage(&self, name: &str) -> Result<ResourceUsage, StoreError> {
        self.check(Operation::GetUsage)?;
        self.usage(name).ok_or_else(|| not_found(USAGE_KIND, name))
    }

    async fn list_usages(&self, key: &str, value: &str) -> Result<Vec<ResourceUsage>, StoreError> {
        self.check(Operation::ListUsages)?;
        Ok(self
            .state
            .read()
            .usages
            .values()
            .filter(|usage| usage.labels().get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn create_usage(&self, usage: &ResourceUsage) -> Result<ResourceUsage, StoreError> {
        self.check(Operation::CreateUsage)?;
        let name = usage.name_any();
        let mut state = self.state.write();
        if let Some(mut racing) = state.racing.take() {
            racing.metadata.resource_version = Some(state.next_version());
            state.usages.insert(racing.name_any(), racing);
        }
        if state.usages.contains_key(&name) {
            return Err(StoreError::AlreadyExists {
                kind: USAGE_KIND.to_string(),
                name,
            });
        }

        let mut created = usage.clone();
        created.metadata.resource_version = Some(state.next_version());
        created.metadata.deletion_timestamp = None;
        state.usages.insert(name, created.clone());
        drop(state);
        self.wrote();
        Ok(created)
    }

    async fn update_usage(&self, usage: &ResourceUsage) -> Result<ResourceUsage, StoreError> {
        self.check(Operation::UpdateUsage)?;
        let name = usage.name_any();
        let mut state = self.state.write();
        let current = state
            .usages
            .get(&name)
            .ok_or_else(|| not_found(USAGE_KIND, &name))?;
        if current.metadata.resource_version != usage.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: USAGE_KIND.to_string(),
                name,
            });
        }

        let mut updated = usage.clone();
        updated.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        updated.metadata.resource_version = Some(state.next_version());
        if updated.is_deleting() && updated.finalizers().is_empty() {
            state.usages.remove(&name);
        } else {
            state.usages.insert(name, updated.clone());
        }
        drop(state);
        self.wrote();
        Ok(updated)
    }

    async fn delete_usage(&self, name: &str) -> Result<(), StoreError> {
        self.check(Operation::DeleteUsage)?;
        let mut state = self.state.write();
        let version = state.next_version();
        let usage = state
            .usages
            .get_mut(name)
            .ok_or_else(|| not_found(USAGE_KIND, name))?;
        if usage.finalizers().is_empty() {
            state.usages.remove(name);
        } else if usage.metadata.deletion_timestamp.is_none() {
            usage.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
            usage.metadata.resource_version = Some(version);
        }
        drop(state);
        self.wrote();
        Ok(())
    }
}

fn not_found(kind: &str, name: &str) -> StoreError {
    StoreError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

// === impl State ===

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

// === impl ObjectKey ===

impl ObjectKey {
    /// Group and version are matched case-insensitively, as the API server
    /// does for URL paths built from them.
    fn new(gvk: &GroupVersionKind, name: &str) -> Self {
        Self {
            group: gvk.group.to_ascii_lowercase(),
            version: gvk.version.to_ascii_lowercase(),
            kind: gvk.kind.to_ascii_lowercase(),
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::{ResourceUsageSpec, TypedReference};
    use pretty_assertions::assert_eq;

    fn usage(name: &str) -> ResourceUsage {
        ResourceUsage::new(name, ResourceUsageSpec::default())
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = MemoryStore::default();
        let created = store.create_usage(&usage("a.b")).await.unwrap();

        let mut first = created.clone();
        first.spec.source_reference = TypedReference {
            name: "first".to_string(),
            ..Default::default()
        };
        store.update_usage(&first).await.unwrap();

        let err = store.update_usage(&created).await.unwrap_err();
        assert!(err.is_conflict(), "{err}");
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn delete_waits_for_finalizers() {
        let store = MemoryStore::default();
        let mut finalized = usage("a.b");
        finalized.add_finalizer();
        store.create_usage(&finalized).await.unwrap();

        store.delete_usage("a.b").await.unwrap();
        let mut deleting = store.usage("a.b").expect("usage must remain");
        assert!(deleting.is_deleting());

        assert!(deleting.remove_finalizer());
        store.update_usage(&deleting).await.unwrap();
        assert!(store.usage("a.b").is_none());
    }

    #[tokio::test]
    async fn objects_match_group_and_version_case_insensitively() {
        let store = MemoryStore::default();
        let meta = ObjectMeta {
            name: Some("fake-directory".to_string()),
            uid: Some("dir-uid".to_string()),
            ..Default::default()
        };
        store.insert_object(
            &GroupVersionKind::gvk("account.btp.sap.crossplane.io", "v1alpha1", "Directory"),
            meta.clone(),
        );

        let found = store
            .get_metadata(
                &GroupVersionKind::gvk("Account.BTP.sap.crossplane.io", "V1alpha1", "Directory"),
                "fake-directory",
            )
            .await
            .unwrap();
        assert_eq!(found, meta);
    }

    #[tokio::test]
    async fn create_loses_race_to_concurrent_writer() {
        let store = MemoryStore::default();
        store.insert_before_create(usage("a.b"));
        assert!(store.usage("a.b").is_none());

        let err = store.create_usage(&usage("a.b")).await.unwrap_err();
        assert!(err.is_already_exists(), "{err}");
        assert_eq!(store.usage("a.b").unwrap().metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(store.writes(), 0);

        store.create_usage(&usage("c.d")).await.unwrap();
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn failing_operations() {
        let store = MemoryStore::default();
        store.fail(Operation::ListUsages);
        assert!(matches!(
            store.list_usages("k", "v").await,
            Err(StoreError::Unavailable(_))
        ));

        store.recover(Operation::ListUsages);
        assert!(store.list_usages("k", "v").await.unwrap().is_empty());
    }
}
