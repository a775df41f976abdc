pub use btp_usage_controller_k8s_api as k8s;
pub use btp_usage_controller_k8s_orphan as orphan;
pub use btp_usage_controller_k8s_tracker as tracker;

mod args;
mod controller;

pub use self::args::{Args, InvalidTrackedKind, TrackedKind};
