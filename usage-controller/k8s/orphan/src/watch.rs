use btp_usage_controller_k8s_tracker::k8s::ResourceUsage;
use kube::runtime::reflector::ObjectRef;
use std::sync::Arc;

/// Returns the usages naming the object with `uid` as their source or
/// target.
pub fn affected_usages(uid: &str, usages: &[Arc<ResourceUsage>]) -> Vec<ObjectRef<ResourceUsage>> {
    usages
        .iter()
        .filter(|usage| usage.source_uid() == Some(uid) || usage.target_uid() == Some(uid))
        .map(|usage| ObjectRef::from_obj(&**usage))
        .collect()
}
