use crate::Time;
use k8s_openapi::chrono;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The condition type reporting whether a resource is still in use.
pub const USE_CONDITION: &str = "ResourceUsage";

pub const IN_USE_REASON: &str = "ResourceUsagesFound";
pub const NOT_IN_USE_REASON: &str = "NoResourceUsagesFound";

/// A status condition of a managed resource.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<Time>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// The resource has at least one usage.
pub fn in_use() -> Condition {
    Condition::new(USE_CONDITION, ConditionStatus::True, IN_USE_REASON)
}

/// Usages could not be listed. The resource is reported as in use so that it
/// is never deleted on the strength of an unconfirmed result.
pub fn in_use_error(error: &dyn fmt::Display) -> Condition {
    Condition {
        message: Some(error.to_string()),
        ..in_use()
    }
}

/// The resource has no usages.
pub fn not_in_use() -> Condition {
    Condition::new(USE_CONDITION, ConditionStatus::False, NOT_IN_USE_REASON)
}

pub fn usage<E: fmt::Display>(result: Result<bool, E>) -> Condition {
    match result {
        Ok(true) => in_use(),
        Ok(false) => not_in_use(),
        Err(error) => in_use_error(&error),
    }
}

/// Sets `condition` in `conditions`, replacing any condition of the same type.
///
/// The previous transition time is kept when nothing but the timestamp would
/// change.
pub fn set(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.equal_ignoring_time(&condition) => {}
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

// === impl Condition ===

impl Condition {
    pub fn new(type_: impl ToString, status: ConditionStatus, reason: impl ToString) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            last_transition_time: Some(Time(chrono::Utc::now())),
            reason: reason.to_string(),
            message: None,
        }
    }

    pub fn equal_ignoring_time(&self, other: &Self) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
