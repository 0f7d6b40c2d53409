//! Health result types shared by probes, the aggregator and the hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status reported for a single component or for the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    /// Rank used by worst-case aggregation.
    ///
    /// Unknown ranks with Unhealthy: a component we cannot vouch for must
    /// not be reported as fine.
    pub fn severity_rank(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy | HealthStatus::Unknown => 2,
        }
    }

    /// Unhealthy or Unknown.
    pub fn is_failing(self) -> bool {
        self.severity_rank() >= 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one probe execution. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub response_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// Per-status counts of an aggregation run.
///
/// Unknown checks are counted as unhealthy so the counts always add up to
/// the number of checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
}

impl HealthSummary {
    pub fn total(&self) -> usize {
        self.healthy + self.degraded + self.unhealthy
    }
}

/// Output of [`HealthAggregator::check_all`].
///
/// [`HealthAggregator::check_all`]: crate::health::aggregator::HealthAggregator::check_all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    /// In probe registration order.
    pub checks: Vec<ComponentHealth>,
    pub summary: HealthSummary,
    pub timestamp: DateTime<Utc>,
    pub total_response_time_ms: f64,
}

impl AggregateHealth {
    /// Build an aggregate from finished checks.
    pub fn from_checks(
        checks: Vec<ComponentHealth>,
        timestamp: DateTime<Utc>,
        total_response_time_ms: f64,
    ) -> Self {
        let status = worst_status(checks.iter().map(|c| c.status));
        let summary = summarize(&checks);
        Self {
            status,
            checks,
            summary,
            timestamp,
            total_response_time_ms,
        }
    }

    /// Look up a check by component name.
    pub fn check(&self, name: &str) -> Option<&ComponentHealth> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Worst-case status over a set of component statuses.
///
/// Ordered comparison, never an average: a single failing component makes
/// the whole aggregate unhealthy. An empty set is healthy.
pub fn worst_status<I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = HealthStatus>,
{
    let worst = statuses
        .into_iter()
        .map(HealthStatus::severity_rank)
        .max()
        .unwrap_or(0);

    match worst {
        0 => HealthStatus::Healthy,
        1 => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

fn summarize(checks: &[ComponentHealth]) -> HealthSummary {
    let mut summary = HealthSummary::default();
    for check in checks {
        match check.status {
            HealthStatus::Healthy => summary.healthy += 1,
            HealthStatus::Degraded => summary.degraded += 1,
            HealthStatus::Unhealthy | HealthStatus::Unknown => summary.unhealthy += 1,
        }
    }
    summary
}
