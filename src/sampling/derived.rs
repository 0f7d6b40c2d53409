//! Metrics derived from the aggregator's last result.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::health::types::{AggregateHealth, HealthStatus};
use crate::health::HealthAggregator;
use crate::sampling::source::{MetricSnapshot, MetricSource, SampleError};

/// Exposes the latest aggregate health as numbers alert rules can watch.
///
/// Produces:
/// - `health_unhealthy_checks`, `health_degraded_checks`
/// - `<component>_up` (1 unless the check is failing)
/// - `<component>_response_time_ms`
/// - `<component>_<detail>` for every numeric detail
///   (e.g. `database_active_connections`)
pub struct HealthDerivedSource {
    aggregator: Arc<HealthAggregator>,
}

impl HealthDerivedSource {
    pub fn new(aggregator: Arc<HealthAggregator>) -> Self {
        Self { aggregator }
    }
}

impl MetricSource for HealthDerivedSource {
    fn name(&self) -> &str {
        "health"
    }

    fn sample(&self) -> BoxFuture<'_, Result<MetricSnapshot, SampleError>> {
        let last = self.aggregator.last();
        Box::pin(async move {
            match last {
                Some(aggregate) => Ok(derive_metrics(&aggregate)),
                None => Err(SampleError::Unavailable("no health check has completed yet".into())),
            }
        })
    }
}

/// Flatten an aggregate into metric values.
pub fn derive_metrics(aggregate: &AggregateHealth) -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::new();
    snapshot.insert("health_unhealthy_checks".into(), aggregate.summary.unhealthy as f64);
    snapshot.insert("health_degraded_checks".into(), aggregate.summary.degraded as f64);
    snapshot.insert(
        "health_status".into(),
        match aggregate.status {
            HealthStatus::Healthy => 0.0,
            HealthStatus::Degraded => 1.0,
            HealthStatus::Unhealthy | HealthStatus::Unknown => 2.0,
        },
    );

    for check in &aggregate.checks {
        let up = if check.status.is_failing() { 0.0 } else { 1.0 };
        snapshot.insert(format!("{}_up", check.name), up);
        snapshot.insert(format!("{}_response_time_ms", check.name), check.response_time_ms);

        for (key, value) in &check.details {
            if let Some(number) = value.as_f64().or_else(|| bool_metric(value)) {
                snapshot.insert(format!("{}_{}", check.name, key), number);
            }
        }
    }
    snapshot
}

fn bool_metric(value: &Value) -> Option<f64> {
    value.as_bool().map(|b| if b { 1.0 } else { 0.0 })
}
