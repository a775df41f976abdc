use crate::{
    condition::{self, Condition},
    usage::ANNOTATION_IGNORE_REFERENCES,
    Referencing, Resource,
};

/// A resource whose references are tracked and whose deletion may be blocked
/// while other resources still use it.
pub trait Managed: Resource<DynamicType = ()> + Referencing + Send + Sync {
    fn conditions(&self) -> &[Condition];

    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions().iter().find(|c| c.type_ == type_)
    }

    fn set_condition(&mut self, condition: Condition) {
        condition::set(self.conditions_mut(), condition)
    }
}

/// Returns true if the resource opts out of reference tracking.
///
/// Only the presence of the annotation matters, not its value.
pub fn has_ignore_annotation<K: Resource>(resource: &K) -> bool {
    resource
        .meta()
        .annotations
        .as_ref()
        .is_some_and(|annotations| annotations.contains_key(ANNOTATION_IGNORE_REFERENCES))
}
