#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod noop;
pub mod store;
mod tracker;


pub use self::{
    noop::NoopTracker,
    store::{KubeStore, ObjectStore, StoreError},
    tracker::{delete_should_be_blocked, Error, ReferenceTracker, UsageTracker},
};
pub use btp_usage_controller_k8s_api as k8s;
