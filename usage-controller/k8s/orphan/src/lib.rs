#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod events;
mod metrics;
mod reconcile;
mod watch;

#[cfg(test)]
mod tests;

pub use self::{
    events::{EventSink, KubeEvents, BLOCKED_MESSAGE, REASON_USAGE_ACCOUNTING},
    metrics::ReconcileMetrics,
    reconcile::{Error, Outcome, Reconciler},
    watch::affected_usages,
};
