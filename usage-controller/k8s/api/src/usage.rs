use crate::{GroupVersionKind, OwnerReference, ResourceExt};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LABEL_SOURCE_UID: &str = "ref.orchestrate.cloud.sap/source-uid";
pub const LABEL_TARGET_UID: &str = "ref.orchestrate.cloud.sap/target-uid";
pub const ANNOTATION_IGNORE_REFERENCES: &str = "ref.orchestrate.cloud.sap/ignore";
pub const FINALIZER: &str = "finalizer.orchestrate.cloud.sap";

/// Returned by resource controllers when deletion is blocked by usages.
pub const ERR_RESOURCE_IN_USE: &str = "Resource cannot be deleted, still has usages";

/// Records that the target resource uses the source resource.
///
/// Usages are owned by their target, so they are garbage collected along
/// with it, and they carry a finalizer that is only released once the target
/// is gone.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "btp.sap.crossplane.io",
    version = "v1alpha1",
    kind = "ResourceUsage",
    derive = "Default",
    derive = "PartialEq",
    category = "crossplane",
    category = "provider",
    printcolumn = r#"{"name":"SOURCE-KIND","type":"string","jsonPath":".spec.sourceRef.kind"}"#,
    printcolumn = r#"{"name":"SOURCE","type":"string","jsonPath":".spec.sourceRef.name"}"#,
    printcolumn = r#"{"name":"TARGET-KIND","type":"string","jsonPath":".spec.targetRef.kind"}"#,
    printcolumn = r#"{"name":"TARGET","type":"string","jsonPath":".spec.targetRef.name"}"#,
    printcolumn = r#"{"name":"AGE","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct ResourceUsageSpec {
    /// The resource being used.
    #[serde(rename = "sourceRef")]
    pub source_reference: TypedReference,

    /// The resource using the source.
    #[serde(rename = "targetRef")]
    pub target_reference: TypedReference,
}

/// Refers to an object by API version, kind, name and uid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypedReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// The name of the usage recording that `target_uid` uses `source_uid`.
pub fn usage_name(source_uid: &str, target_uid: &str) -> String {
    format!("{source_uid}.{target_uid}")
}

// === impl ResourceUsage ===

impl ResourceUsage {
    /// Builds the usage of `source` by `target`, owned by `owner`.
    ///
    /// Both references must carry a uid.
    pub fn between(
        source: TypedReference,
        target: TypedReference,
        owner: OwnerReference,
    ) -> Option<Self> {
        let source_uid = source.uid.clone()?;
        let target_uid = target.uid.clone()?;

        let mut usage = Self::new(
            &usage_name(&source_uid, &target_uid),
            ResourceUsageSpec {
                source_reference: source,
                target_reference: target,
            },
        );
        usage.metadata.labels = Some(BTreeMap::from([
            (LABEL_TARGET_UID.to_string(), target_uid),
            (LABEL_SOURCE_UID.to_string(), source_uid),
        ]));
        usage.metadata.owner_references = Some(vec![owner]);
        Some(usage)
    }

    pub fn source_uid(&self) -> Option<&str> {
        self.labels().get(LABEL_SOURCE_UID).map(String::as_str)
    }

    pub fn target_uid(&self) -> Option<&str> {
        self.labels().get(LABEL_TARGET_UID).map(String::as_str)
    }

    /// Returns the uid of the owner reference marked as controller, if any.
    pub fn controller_uid(&self) -> Option<&str> {
        self.owner_references()
            .iter()
            .find(|owner| owner.controller == Some(true))
            .map(|owner| owner.uid.as_str())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    pub fn add_finalizer(&mut self) {
        if !self.has_finalizer() {
            self.finalizers_mut().push(FINALIZER.to_string());
        }
    }

    /// Removes the finalizer, returning whether it was present.
    pub fn remove_finalizer(&mut self) -> bool {
        let finalizers = self.finalizers_mut();
        let before = finalizers.len();
        finalizers.retain(|f| f != FINALIZER);
        finalizers.len() != before
    }
}

// === impl TypedReference ===

impl TypedReference {
    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        };
        GroupVersionKind::gvk(group, version, &self.kind)
    }
}
