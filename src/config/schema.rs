//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for healthwatch.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HealthwatchConfig {
    /// Monitoring loop settings.
    pub monitor: MonitorConfig,

    /// Subscriber delivery settings.
    pub hub: HubConfig,

    /// Probe definitions, in report order.
    pub probes: Vec<ProbeConfig>,

    /// Alert rule definitions.
    pub alert_rules: Vec<AlertRuleConfig>,

    /// Automated failover settings.
    pub failover: FailoverConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Monitoring loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Tick interval in seconds.
    pub interval_secs: u64,

    /// Base delay after a failed tick in milliseconds.
    pub error_backoff_base_ms: u64,

    /// Maximum delay after repeated failed ticks in milliseconds.
    pub error_backoff_max_ms: u64,

    /// Per-source deadline for one metric sample in milliseconds.
    pub sample_timeout_ms: u64,

    /// Sample OS resources (Linux only).
    pub system_metrics: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            error_backoff_base_ms: 500,
            error_backoff_max_ms: 10_000,
            sample_timeout_ms: 5000,
            system_metrics: true,
        }
    }
}

/// Subscription hub configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-subscriber send deadline in milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 1000,
        }
    }
}

/// Kind of built-in probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Tcp,
    Http,
}

/// A single probe definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Component name, unique across probes.
    pub name: String,

    /// Probe implementation.
    pub kind: ProbeKind,

    /// `host:port` for tcp, URL for http.
    pub target: String,

    /// Deadline in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,

    /// Successful checks slower than this are reported degraded.
    #[serde(default)]
    pub degraded_after_ms: Option<u64>,
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

/// An alert rule as written in the config file.
///
/// Converted into a validated [`AlertRule`](crate::alerting::AlertRule)
/// before use; unknown operators and severities are rejected then.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertRuleConfig {
    pub name: String,
    pub metric: String,
    pub threshold: f64,
    pub operator: String,

    #[serde(default)]
    pub sustained_secs: u64,

    #[serde(default = "default_severity")]
    pub severity: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_severity() -> String {
    "warning".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Automated failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Enable the decision machine.
    pub enabled: bool,

    /// Consecutive unhealthy cycles before acting.
    pub threshold: u32,

    /// Probes that make up the serving layer.
    pub serving_checks: Vec<String>,

    /// Probes that make up the data layer.
    pub data_checks: Vec<String>,

    /// Slot currently receiving traffic ("blue" or "green").
    pub active_slot: String,

    /// Replicas to scale the standby slot to before switching.
    pub slot_replicas: u32,

    /// Current data-layer primary.
    pub data_primary: String,

    /// Replica promoted on data-layer failover.
    pub data_replica: String,

    /// Upper bound on one failover action, rollback included, in seconds.
    pub action_timeout_secs: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 3,
            serving_checks: Vec::new(),
            data_checks: Vec::new(),
            active_slot: "blue".to_string(),
            slot_replicas: 3,
            data_primary: "primary".to_string(),
            data_replica: "replica".to_string(),
            action_timeout_secs: 300,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: HealthwatchConfig = toml::from_str("").unwrap();
        assert_eq!(config.monitor.interval_secs, 15);
        assert_eq!(config.hub.send_timeout_ms, 1000);
        assert_eq!(config.monitor.sample_timeout_ms, 5000);
        assert_eq!(config.failover.action_timeout_secs, 300);
        assert!(!config.failover.enabled);
        assert!(config.probes.is_empty());
    }

    #[test]
    fn test_probe_and_rule_defaults() {
        let config: HealthwatchConfig = toml::from_str(
            r#"
            [[probes]]
            name = "database"
            kind = "tcp"
            target = "127.0.0.1:5432"

            [[alert_rules]]
            name = "high_cpu"
            metric = "cpu_percent"
            operator = ">"
            threshold = 85.0
            "#,
        )
        .unwrap();

        assert_eq!(config.probes[0].kind, ProbeKind::Tcp);
        assert_eq!(config.probes[0].timeout_ms, 5000);
        assert!(config.probes[0].degraded_after_ms.is_none());

        let rule = &config.alert_rules[0];
        assert_eq!(rule.severity, "warning");
        assert!(rule.enabled);
        assert_eq!(rule.sustained_secs, 0);
    }
}
