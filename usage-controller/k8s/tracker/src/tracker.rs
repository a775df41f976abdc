use crate::{
    k8s::{
        condition, find_references, has_ignore_annotation,
        usage::{ERR_RESOURCE_IN_USE, LABEL_SOURCE_UID},
        GroupVersionKind, Managed, MetadataError, ObjectMetadata, OwnerReference,
        Reference, ResourceExt, ResourceUsage, TypedReference,
    },
    store::{ObjectStore, StoreError},
};
use std::sync::Arc;

/// Records which resources use which, and reports whether a resource may be
/// deleted.
#[async_trait::async_trait]
pub trait ReferenceTracker: Send + Sync {
    /// Records a usage for every reference discovered on `target`.
    async fn track<M: Managed>(&self, target: &M) -> Result<(), Error>;

    /// Records that `target` uses the resource named by `reference`.
    async fn create_tracking_reference<M: Managed>(
        &self,
        target: &M,
        reference: &Reference,
        gvk: &GroupVersionKind,
    ) -> Result<(), Error>;

    /// Sets the usage condition on `resource`.
    async fn set_conditions<M: Managed>(&self, resource: &mut M);

    fn delete_should_be_blocked<M: Managed>(&self, resource: &M) -> bool;

    async fn resolve_source(&self, usage: &ResourceUsage) -> Result<ObjectMetadata, StoreError>;

    async fn resolve_target(&self, usage: &ResourceUsage) -> Result<ObjectMetadata, StoreError>;
}

/// Maintains usages in an [`ObjectStore`].
#[derive(Debug)]
pub struct UsageTracker<S> {
    store: Arc<S>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("cannot resolve {kind} {name}: {source}")]
    Resolve {
        kind: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("ResourceUsages could not be retrieved: {0}")]
    List(#[source] StoreError),

    #[error("cannot apply ResourceUsage {name}: {source}")]
    Apply {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("{}", ERR_RESOURCE_IN_USE)]
    InUse,
}

/// Returns true while `resource` is reported as in use and does not opt out
/// of tracking.
///
/// Only the recorded condition is consulted, so [`UsageTracker::set_conditions`]
/// must have been applied for the result to be current.
pub fn delete_should_be_blocked<M: Managed>(resource: &M) -> bool {
    if has_ignore_annotation(resource) {
        return false;
    }
    resource
        .condition(condition::USE_CONDITION)
        .is_some_and(|c| c.reason == condition::IN_USE_REASON)
}

// === impl UsageTracker ===

impl<S> Clone for UsageTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ObjectStore> UsageTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn track<M: Managed>(&self, target: &M) -> Result<(), Error> {
        if has_ignore_annotation(target) {
            tracing::debug!(name = %target.name_any(), "References ignored");
            return Ok(());
        }

        for reference in find_references(target) {
            let gvk = GroupVersionKind::gvk(&reference.group, &reference.api_version, &reference.kind);
            self.create_tracking_reference(target, &reference.reference, &gvk)
                .await?;
        }
        Ok(())
    }

    pub async fn create_tracking_reference<M: Managed>(
        &self,
        target: &M,
        reference: &Reference,
        gvk: &GroupVersionKind,
    ) -> Result<(), Error> {
        let gvk = GroupVersionKind::gvk(
            &gvk.group.to_ascii_lowercase(),
            &gvk.version.to_ascii_lowercase(),
            &gvk.kind,
        );
        let source = self
            .store
            .get_metadata(&gvk, &reference.name)
            .await
            .map_err(|source| Error::Resolve {
                kind: gvk.kind.clone(),
                name: reference.name.clone(),
                source,
            })?;
        // The kind is taken from the request since metadata-only reads do not
        // report the kind of the object itself.
        let source = ObjectMetadata::new(&gvk, source).typed_reference()?;
        let target = ObjectMetadata::from_resource(target).typed_reference()?;

        let owner = OwnerReference {
            api_version: target.api_version.clone(),
            kind: target.kind.clone(),
            name: target.name.clone(),
            uid: target.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(false),
        };
        let Some(usage) = ResourceUsage::between(source, target, owner) else {
            // Both references were built with uids.
            return Ok(());
        };
        self.apply(usage).await
    }

    /// Creates `desired` or brings the stored usage in line with it.
    async fn apply(&self, desired: ResourceUsage) -> Result<(), Error> {
        let name = desired.name_any();
        let apply_err = |source| Error::Apply {
            name: name.clone(),
            source,
        };

        let current = match self.store.get_usage(&name).await {
            Ok(current) => current,
            Err(error) if error.is_not_found() => match self.store.create_usage(&desired).await {
                Ok(_) => {
                    tracing::info!(usage = %name, "Created ResourceUsage");
                    return Ok(());
                }
                Err(error) if error.is_already_exists() => {
                    self.store.get_usage(&name).await.map_err(apply_err)?
                }
                Err(error) => return Err(apply_err(error)),
            },
            Err(error) => return Err(apply_err(error)),
        };

        let target_uid = desired.target_uid().unwrap_or_default();
        if let Some(owner) = current.controller_uid() {
            if owner != target_uid {
                tracing::debug!(usage = %name, %owner, "ResourceUsage is controlled by another resource");
                return Ok(());
            }
        }

        // Labels set by other writers are left alone; only ours count as drift.
        let labels_match = desired
            .labels()
            .iter()
            .all(|(k, v)| current.labels().get(k) == Some(v));
        if labels_match && current.spec == desired.spec && current.controller_uid().is_some() {
            return Ok(());
        }

        let mut updated = current;
        updated
            .labels_mut()
            .extend(desired.labels().iter().map(|(k, v)| (k.clone(), v.clone())));
        updated.metadata.owner_references = desired.metadata.owner_references;
        updated.spec = desired.spec;
        self.store.update_usage(&updated).await.map_err(apply_err)?;
        tracing::info!(usage = %name, "Updated ResourceUsage");
        Ok(())
    }

    /// Returns whether any usage names `resource` as its source.
    pub async fn has_usages<M: Managed>(&self, resource: &M) -> Result<bool, Error> {
        let uid = ObjectMetadata::from_resource(resource).uid()?.to_string();
        let usages = self
            .store
            .list_usages(LABEL_SOURCE_UID, &uid)
            .await
            .map_err(Error::List)?;
        Ok(!usages.is_empty())
    }

    pub async fn set_conditions<M: Managed>(&self, resource: &mut M) {
        let result = self.has_usages(resource).await;
        if let Err(error) = &result {
            tracing::warn!(name = %resource.name_any(), %error, "Failed to list ResourceUsages");
        }
        resource.set_condition(condition::usage(result));
    }

    pub fn delete_should_be_blocked<M: Managed>(&self, resource: &M) -> bool {
        delete_should_be_blocked(resource)
    }

    /// Fails with [`Error::InUse`] while deletion of `resource` is blocked.
    pub fn ensure_deletable<M: Managed>(&self, resource: &M) -> Result<(), Error> {
        if delete_should_be_blocked(resource) {
            return Err(Error::InUse);
        }
        Ok(())
    }

    pub async fn resolve_source(&self, usage: &ResourceUsage) -> Result<ObjectMetadata, StoreError> {
        self.resolve(&usage.spec.source_reference).await
    }

    pub async fn resolve_target(&self, usage: &ResourceUsage) -> Result<ObjectMetadata, StoreError> {
        self.resolve(&usage.spec.target_reference).await
    }

    async fn resolve(&self, reference: &TypedReference) -> Result<ObjectMetadata, StoreError> {
        let gvk = reference.gvk();
        let metadata = self.store.get_metadata(&gvk, &reference.name).await?;
        Ok(ObjectMetadata::new(&gvk, metadata))
    }
}

#[async_trait::async_trait]
impl<S: ObjectStore> ReferenceTracker for UsageTracker<S> {
    async fn track<M: Managed>(&self, target: &M) -> Result<(), Error> {
        UsageTracker::track(self, target).await
    }

    async fn create_tracking_reference<M: Managed>(
        &self,
        target: &M,
        reference: &Reference,
        gvk: &GroupVersionKind,
    ) -> Result<(), Error> {
        UsageTracker::create_tracking_reference(self, target, reference, gvk).await
    }

    async fn set_conditions<M: Managed>(&self, resource: &mut M) {
        UsageTracker::set_conditions(self, resource).await
    }

    fn delete_should_be_blocked<M: Managed>(&self, resource: &M) -> bool {
        delete_should_be_blocked(resource)
    }

    async fn resolve_source(&self, usage: &ResourceUsage) -> Result<ObjectMetadata, StoreError> {
        UsageTracker::resolve_source(self, usage).await
    }

    async fn resolve_target(&self, usage: &ResourceUsage) -> Result<ObjectMetadata, StoreError> {
        UsageTracker::resolve_target(self, usage).await
    }
}

// === impl Error ===

impl Error {
    /// Returns true if the failure may clear up without the resource changing.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Resolve { .. } | Self::List(_) | Self::Apply { .. } | Self::InUse
        )
    }
}
