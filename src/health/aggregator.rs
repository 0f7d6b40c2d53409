//! Concurrent multi-component health aggregation.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use chrono::Utc;
use futures_util::future::{join_all, BoxFuture};

use crate::failover::executor::PostActionCheck;
use crate::health::probe::{HealthCheck, Probe};
use crate::health::types::{AggregateHealth, ComponentHealth, HealthStatus};
use crate::observability::metrics;

/// Runs registered probes concurrently and folds them into one [`AggregateHealth`].
///
/// Constructed once at startup and shared via `Arc`; there is no global
/// accessor.
#[derive(Default)]
pub struct HealthAggregator {
    /// Registration order is report order.
    probes: RwLock<Vec<Probe>>,
    last: ArcSwapOption<AggregateHealth>,
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe. Re-registering a name replaces the probe in place.
    pub fn register_probe(
        &self,
        name: impl Into<String>,
        timeout: Duration,
        check: Arc<dyn HealthCheck>,
    ) {
        self.register(Probe::new(name, timeout, check));
    }

    /// Register an already-built probe.
    pub fn register(&self, probe: Probe) {
        let mut probes = self.probes.write().expect("probe registry lock poisoned");
        match probes.iter_mut().find(|p| p.name() == probe.name()) {
            Some(existing) => {
                tracing::debug!(probe = %probe.name(), "Replacing registered probe");
                *existing = probe;
            }
            None => {
                tracing::debug!(
                    probe = %probe.name(),
                    timeout = ?probe.timeout(),
                    "Registered probe"
                );
                probes.push(probe);
            }
        }
    }

    /// Names of registered probes, in registration order.
    pub fn probe_names(&self) -> Vec<String> {
        self.probes
            .read()
            .expect("probe registry lock poisoned")
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Run every probe concurrently and aggregate by worst case.
    ///
    /// Never fails: probe errors and timeouts become Unhealthy checks.
    pub async fn check_all(&self) -> AggregateHealth {
        let probes = self.snapshot_probes();
        let started = Instant::now();

        let checks: Vec<ComponentHealth> = join_all(probes.iter().map(|p| p.run())).await;

        let aggregate = AggregateHealth::from_checks(
            checks,
            Utc::now(),
            started.elapsed().as_secs_f64() * 1000.0,
        );

        self.record(&aggregate);
        aggregate
    }

    /// Run a single probe. `None` if no probe has that name.
    pub async fn check_one(&self, name: &str) -> Option<ComponentHealth> {
        let probe = self
            .probes
            .read()
            .expect("probe registry lock poisoned")
            .iter()
            .find(|p| p.name() == name)
            .cloned()?;

        Some(probe.run().await)
    }

    /// Most recent result of [`check_all`](Self::check_all).
    pub fn last(&self) -> Option<Arc<AggregateHealth>> {
        self.last.load_full()
    }

    fn snapshot_probes(&self) -> Vec<Probe> {
        self.probes
            .read()
            .expect("probe registry lock poisoned")
            .clone()
    }

    fn record(&self, aggregate: &AggregateHealth) {
        let previous = self.last.load().as_ref().map(|a| a.status);
        if previous != Some(aggregate.status) {
            tracing::info!(
                status = %aggregate.status,
                previous = ?previous,
                healthy = aggregate.summary.healthy,
                degraded = aggregate.summary.degraded,
                unhealthy = aggregate.summary.unhealthy,
                "Aggregate health changed"
            );
        }
        metrics::record_aggregate_status(aggregate.status);
        self.last.store(Some(Arc::new(aggregate.clone())));
    }
}

impl PostActionCheck for HealthAggregator {
    /// Re-run probes and require the named components to be serving.
    fn verify<'a>(&'a self, components: &'a [String]) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let aggregate = self.check_all().await;
            if components.is_empty() {
                return aggregate.status != HealthStatus::Unhealthy;
            }
            components.iter().all(|name| {
                aggregate
                    .check(name)
                    .map(|c| !c.status.is_failing())
                    .unwrap_or(false)
            })
        })
    }
}
