//! In-process counter registry.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;

use crate::sampling::source::{MetricSnapshot, MetricSource, SampleError};

/// Thread-safe gauges and counters written by application code
/// (request rate, cache hit rate) and sampled by the monitor.
///
/// Cloning shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct CounterRegistry {
    inner: Arc<DashMap<String, f64>>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a gauge to an absolute value.
    pub fn set(&self, name: impl Into<String>, value: f64) {
        self.inner.insert(name.into(), value);
    }

    /// Add to a counter, creating it at zero.
    pub fn increment(&self, name: impl Into<String>, by: f64) {
        *self.inner.entry(name.into()).or_insert(0.0) += by;
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.inner.get(name).map(|r| *r.value())
    }

    pub fn remove(&self, name: &str) -> Option<f64> {
        self.inner.remove(name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.inner
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect()
    }
}

impl MetricSource for CounterRegistry {
    fn name(&self) -> &str {
        "counters"
    }

    fn sample(&self) -> BoxFuture<'_, Result<MetricSnapshot, SampleError>> {
        let snapshot = self.snapshot();
        Box::pin(async move { Ok(snapshot) })
    }
}
