//! Probe definition and guarded execution.
//!
//! # Responsibilities
//! - Define the check-function capability ([`HealthCheck`])
//! - Run one check on its own task under a deadline
//! - Turn every outcome (report, error, timeout, panic) into a [`ComponentHealth`]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::health::types::{ComponentHealth, HealthStatus};
use crate::observability::metrics;

/// What a check function reports when it completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: HealthStatus,
    pub message: String,
    pub details: Map<String, Value>,
}

impl ProbeReport {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Degraded, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    /// Attach a supplementary detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Errors a check function may fail with.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Failed(String),

    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),
}

/// Boxed future returned by a check function.
pub type ProbeFuture = BoxFuture<'static, Result<ProbeReport, ProbeError>>;

/// Capability: attempt a health check and return a report or fail.
///
/// The returned future is `'static` so it can run on its own task; checks
/// clone whatever handles they need out of `self`.
pub trait HealthCheck: Send + Sync {
    fn check(&self) -> ProbeFuture;
}

impl<F, Fut> HealthCheck for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProbeReport, ProbeError>> + Send + 'static,
{
    fn check(&self) -> ProbeFuture {
        Box::pin(self())
    }
}

/// A named check with its deadline.
#[derive(Clone)]
pub struct Probe {
    name: String,
    timeout: Duration,
    check: Arc<dyn HealthCheck>,
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Probe {
    pub fn new(name: impl Into<String>, timeout: Duration, check: Arc<dyn HealthCheck>) -> Self {
        Self {
            name: name.into(),
            timeout,
            check,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the check on a dedicated task and always produce a result.
    ///
    /// The deadline is enforced here, not by the check: an overrunning task
    /// is aborted and an Unhealthy result is synthesized. Building the check
    /// future happens on the blocking pool, so a check function that does
    /// synchronous work before returning its future is still bounded by the
    /// deadline and never holds up sibling probes.
    pub async fn run(&self) -> ComponentHealth {
        let started = Instant::now();
        let check = Arc::clone(&self.check);
        let mut handle = tokio::spawn(async move {
            let future = tokio::task::spawn_blocking(move || check.check())
                .await
                .map_err(|e| ProbeError::Failed(format!("probe task failed: {}", e)))?;
            future.await
        });

        let outcome = tokio::time::timeout(self.timeout, &mut handle).await;
        let (status, message, details) = match outcome {
            Ok(Ok(Ok(report))) => (report.status, report.message, report.details),
            Ok(Ok(Err(e))) => {
                tracing::warn!(probe = %self.name, error = %e, "Probe failed");
                failure_result(e.to_string())
            }
            Ok(Err(join_error)) => {
                tracing::error!(probe = %self.name, error = %join_error, "Probe task panicked");
                failure_result(format!("probe task failed: {}", join_error))
            }
            Err(_) => {
                handle.abort();
                let message = format!("timed out after {}s", self.timeout.as_secs_f64());
                tracing::warn!(probe = %self.name, timeout = ?self.timeout, "Probe timed out");
                let mut details = Map::new();
                details.insert("error".into(), Value::String(message.clone()));
                details.insert(
                    "timeout_ms".into(),
                    Value::from(self.timeout.as_millis() as u64),
                );
                (HealthStatus::Unhealthy, message, details)
            }
        };

        let elapsed = started.elapsed();
        metrics::record_probe(&self.name, status, elapsed);

        ComponentHealth {
            name: self.name.clone(),
            status,
            message,
            response_time_ms: elapsed.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
            details,
        }
    }
}

fn failure_result(message: String) -> (HealthStatus, String, Map<String, Value>) {
    let mut details = Map::new();
    details.insert("error".into(), Value::String(message.clone()));
    (HealthStatus::Unhealthy, message, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe<F, Fut>(name: &str, timeout: Duration, f: F) -> Probe
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeReport, ProbeError>> + Send + 'static,
    {
        Probe::new(name, timeout, Arc::new(f))
    }

    #[tokio::test]
    async fn test_report_passes_through() {
        let p = probe("cache", Duration::from_secs(1), || async {
            Ok(ProbeReport::degraded("slow").with_detail("latency_ms", 250))
        });

        let result = p.run().await;
        assert_eq!(result.name, "cache");
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.message, "slow");
        assert_eq!(result.details["latency_ms"], 250);
        assert!(result.response_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_error_becomes_unhealthy_with_detail() {
        let p = probe("db", Duration::from_secs(1), || async {
            Err(ProbeError::Failed("connection refused".into()))
        });

        let result = p.run().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.message, "connection refused");
        assert_eq!(result.details["error"], "connection refused");
    }

    #[tokio::test]
    async fn test_timeout_is_enforced_by_runner() {
        let p = probe("model", Duration::from_millis(10), || async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(ProbeReport::healthy("late"))
        });

        let started = Instant::now();
        let result = p.run().await;

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.starts_with("timed out after"));
        assert!(result.details.contains_key("error"));
    }

    #[tokio::test]
    async fn test_synchronous_check_work_is_bounded_by_deadline() {
        let checks: Vec<Probe> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                probe(name, Duration::from_millis(10), || {
                    std::thread::sleep(Duration::from_millis(300));
                    async { Ok(ProbeReport::healthy("late")) }
                })
            })
            .collect();

        let started = Instant::now();
        let results = futures_util::future::join_all(checks.iter().map(|p| p.run())).await;

        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(250), "took {:?}", elapsed);
        for result in results {
            assert_eq!(result.status, HealthStatus::Unhealthy);
            assert!(result.message.starts_with("timed out after"));
        }
    }

    #[tokio::test]
    async fn test_panic_while_building_check_is_captured() {
        fn eager() -> std::future::Ready<Result<ProbeReport, ProbeError>> {
            panic!("bad config")
        }
        let p = probe("eager", Duration::from_secs(1), eager);

        let result = p.run().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.starts_with("probe task failed"));
    }

    #[tokio::test]
    async fn test_panicking_check_is_captured() {
        let p = probe("flaky", Duration::from_secs(1), || async {
            if true {
                panic!("boom");
            }
            Ok(ProbeReport::healthy("unreachable"))
        });

        let result = p.run().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.details.contains_key("error"));
    }
}
