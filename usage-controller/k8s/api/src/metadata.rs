use crate::{GroupVersionKind, ObjectMeta, Resource, TypedReference};

/// The identity of an object fetched by group, version, kind and name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectMetadata {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("{kind} has no name")]
    MissingName { kind: String },

    #[error("{kind} {name} has no uid")]
    MissingUid { kind: String, name: String },
}

// === impl ObjectMetadata ===

impl ObjectMetadata {
    pub fn new(gvk: &GroupVersionKind, metadata: ObjectMeta) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            metadata,
        }
    }

    pub fn from_resource<K: Resource<DynamicType = ()>>(resource: &K) -> Self {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            metadata: resource.meta().clone(),
        }
    }

    pub fn name(&self) -> Result<&str, MetadataError> {
        self.metadata
            .name
            .as_deref()
            .ok_or_else(|| MetadataError::MissingName {
                kind: self.kind.clone(),
            })
    }

    pub fn uid(&self) -> Result<&str, MetadataError> {
        let name = self.name()?;
        self.metadata
            .uid
            .as_deref()
            .ok_or_else(|| MetadataError::MissingUid {
                kind: self.kind.clone(),
                name: name.to_string(),
            })
    }

    pub fn typed_reference(&self) -> Result<TypedReference, MetadataError> {
        Ok(TypedReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name()?.to_string(),
            uid: Some(self.uid()?.to_string()),
        })
    }
}
