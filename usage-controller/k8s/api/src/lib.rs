#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod condition;
pub mod managed;
mod metadata;
pub mod usage;

pub use self::{
    condition::{Condition, ConditionStatus},
    managed::{has_ignore_annotation, Managed},
    metadata::{MetadataError, ObjectMetadata},
    usage::{ResourceUsage, ResourceUsageSpec, TypedReference},
};
pub use btp_usage_controller_core::{
    find_references, Reference, ReferenceField, Referencing, ResolvedReference,
    Walker,
};
pub use k8s_openapi::{
    self,
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time},
};
pub use kube::{
    core::{GroupVersionKind, TypeMeta},
    Resource, ResourceExt,
};
