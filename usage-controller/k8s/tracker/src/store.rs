//! Access to the objects the tracker reads and the usages it writes.

mod kube;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use self::kube::{ApiResources, KubeStore};
#[cfg(any(test, feature = "test-util"))]
pub use self::memory::{MemoryStore, Operation};

use crate::k8s::{GroupVersionKind, ObjectMeta, ResourceUsage};
use std::time::Duration;

/// Reads arbitrary objects by kind and name and reads or writes usages.
///
/// Every operation is bounded in time by the implementation and reports a
/// timeout as [`StoreError::Timeout`].
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetches the metadata of the named cluster-scoped object of kind `gvk`.
    async fn get_metadata(
        &self,
        gvk: &GroupVersionKind,
        name: &str,
    ) -> Result<ObjectMeta, StoreError>;

    async fn get_usage(&self, name: &str) -> Result<ResourceUsage, StoreError>;

    /// Lists usages carrying the label `key=value`.
    async fn list_usages(&self, key: &str, value: &str) -> Result<Vec<ResourceUsage>, StoreError>;

    async fn create_usage(&self, usage: &ResourceUsage) -> Result<ResourceUsage, StoreError>;

    /// Replaces a usage. Fails with [`StoreError::Conflict`] when the usage
    /// was modified since it was read.
    async fn update_usage(&self, usage: &ResourceUsage) -> Result<ResourceUsage, StoreError>;

    async fn delete_usage(&self, name: &str) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: String, name: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Kube(#[from] ::kube::Error),
}

// === impl StoreError ===

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
