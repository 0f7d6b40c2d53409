//! Metrics collection and exposition.
//!
//! # Metrics
//! - `healthwatch_probe_duration_seconds` (histogram): probe wall time by probe
//! - `healthwatch_probe_status` (gauge): 0 healthy, 1 degraded, 2 unhealthy, 3 unknown
//! - `healthwatch_aggregate_status` (gauge): same scale, Unknown folded into unhealthy
//! - `healthwatch_alert_transitions_total` (counter): by rule, transition
//! - `healthwatch_alerts_firing` (gauge)
//! - `healthwatch_hub_subscribers` (gauge)
//! - `healthwatch_hub_delivery_failures_total` (counter)
//! - `healthwatch_failover_actions_total` (counter): by action, outcome
//! - `healthwatch_tick_errors_total` (counter)
//!
//! Recording without an installed exporter is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::alerting::AlertTransition;
use crate::health::types::HealthStatus;

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn status_value(status: HealthStatus) -> f64 {
    match status {
        HealthStatus::Healthy => 0.0,
        HealthStatus::Degraded => 1.0,
        HealthStatus::Unhealthy => 2.0,
        HealthStatus::Unknown => 3.0,
    }
}

pub fn record_probe(probe: &str, status: HealthStatus, elapsed: Duration) {
    histogram!("healthwatch_probe_duration_seconds", "probe" => probe.to_string())
        .record(elapsed.as_secs_f64());
    gauge!("healthwatch_probe_status", "probe" => probe.to_string()).set(status_value(status));
}

pub fn record_aggregate_status(status: HealthStatus) {
    gauge!("healthwatch_aggregate_status").set(status_value(status));
}

pub fn record_alert_transition(rule: &str, transition: AlertTransition) {
    counter!(
        "healthwatch_alert_transitions_total",
        "rule" => rule.to_string(),
        "transition" => transition.as_str()
    )
    .increment(1);
}

pub fn record_alerts_firing(count: usize) {
    gauge!("healthwatch_alerts_firing").set(count as f64);
}

pub fn record_hub_subscribers(count: usize) {
    gauge!("healthwatch_hub_subscribers").set(count as f64);
}

pub fn record_delivery_failure() {
    counter!("healthwatch_hub_delivery_failures_total").increment(1);
}

pub fn record_failover(action: &'static str, outcome: &'static str) {
    counter!(
        "healthwatch_failover_actions_total",
        "action" => action,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_tick_error() {
    counter!("healthwatch_tick_errors_total").increment(1);
}
