//! Metric source capability and per-tick merging.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use thiserror::Error;

use crate::resilience::{with_deadline, DeadlineError};

/// Metric name → value for one tick.
pub type MetricSnapshot = HashMap<String, f64>;

/// Errors a source may fail with while sampling.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no sample within {0:?}")]
    Timeout(Duration),
}

/// Anything that can yield a metric snapshot for the current tick.
pub trait MetricSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn sample(&self) -> BoxFuture<'_, Result<MetricSnapshot, SampleError>>;
}

/// Outcome of sampling every source for one tick.
#[derive(Debug, Default)]
pub struct MergedSample {
    pub snapshot: MetricSnapshot,
    /// `(source name, error)` for every source that failed.
    pub failures: Vec<(String, SampleError)>,
}

/// Sample all sources concurrently and merge their snapshots.
///
/// Later sources win on name collisions. A failing source, or one that
/// misses `deadline`, is recorded and skipped; the others still contribute.
pub async fn sample_all(sources: &[Box<dyn MetricSource>], deadline: Duration) -> MergedSample {
    let results = join_all(sources.iter().map(|s| async move {
        with_deadline(deadline, s.sample()).await.map_err(|e| match e {
            DeadlineError::Elapsed(limit) => SampleError::Timeout(limit),
            DeadlineError::Inner(e) => e,
        })
    }))
    .await;

    let mut merged = MergedSample::default();
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(snapshot) => merged.snapshot.extend(snapshot),
            Err(e) => {
                tracing::warn!(source = source.name(), error = %e, "Metric source failed");
                merged.failures.push((source.name().to_string(), e));
            }
        }
    }
    merged
}
