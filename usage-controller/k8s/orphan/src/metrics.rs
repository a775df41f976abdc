use crate::Outcome;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    reconciles: Family<OutcomeLabels, Counter>,
    errors: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: Outcome,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconciles",
            "Count of completed ResourceUsage reconciliations by outcome",
            reconciles.clone(),
        );

        let errors = Counter::default();
        prom.register(
            "errors",
            "Count of failed ResourceUsage reconciliations",
            errors.clone(),
        );

        Self { reconciles, errors }
    }

    pub(crate) fn record<E>(&self, result: &Result<Outcome, E>) {
        match result {
            Ok(outcome) => {
                self.reconciles
                    .get_or_create(&OutcomeLabels { outcome: *outcome })
                    .inc();
            }
            Err(_) => {
                self.errors.inc();
            }
        }
    }
}
