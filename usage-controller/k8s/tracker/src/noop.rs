use crate::{
    k8s::{GroupVersionKind, Managed, ObjectMetadata, Reference, ResourceUsage},
    store::StoreError,
    Error, ReferenceTracker,
};

/// A [`ReferenceTracker`] that records nothing.
///
/// Deletion is blocked according to `blocked`, which lets resource
/// controllers be tested without a store.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracker {
    pub blocked: bool,
}

#[async_trait::async_trait]
impl ReferenceTracker for NoopTracker {
    async fn track<M: Managed>(&self, _: &M) -> Result<(), Error> {
        Ok(())
    }

    async fn create_tracking_reference<M: Managed>(
        &self,
        _: &M,
        _: &Reference,
        _: &GroupVersionKind,
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn set_conditions<M: Managed>(&self, _: &mut M) {}

    fn delete_should_be_blocked<M: Managed>(&self, _: &M) -> bool {
        self.blocked
    }

    async fn resolve_source(&self, _: &ResourceUsage) -> Result<ObjectMetadata, StoreError> {
        Ok(ObjectMetadata::default())
    }

    async fn resolve_target(&self, _: &ResourceUsage) -> Result<ObjectMetadata, StoreError> {
        Ok(ObjectMetadata::default())
    }
}
