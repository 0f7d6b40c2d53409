//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (failover checks reference existing probes)
//! - Validate value ranges (intervals > 0, timeouts > 0)
//! - Convert alert rules so bad operators fail at load, not at evaluation
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HealthwatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::alerting::rule::AlertRule;
use crate::config::schema::{HealthwatchConfig, ProbeKind};
use crate::failover::executor::Slot;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &HealthwatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.monitor.interval_secs == 0 {
        errors.push(ValidationError::new("monitor.interval_secs", "must be greater than 0"));
    }
    if config.monitor.error_backoff_base_ms > config.monitor.error_backoff_max_ms {
        errors.push(ValidationError::new(
            "monitor.error_backoff_base_ms",
            "must not exceed error_backoff_max_ms",
        ));
    }
    if config.monitor.sample_timeout_ms == 0 {
        errors.push(ValidationError::new("monitor.sample_timeout_ms", "must be greater than 0"));
    }
    if config.hub.send_timeout_ms == 0 {
        errors.push(ValidationError::new("hub.send_timeout_ms", "must be greater than 0"));
    }

    let mut probe_names = HashSet::new();
    for (i, probe) in config.probes.iter().enumerate() {
        let field = format!("probes[{}]", i);
        if probe.name.trim().is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !probe_names.insert(probe.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate probe name '{}'", probe.name),
            ));
        }
        if probe.timeout_ms == 0 {
            errors.push(ValidationError::new(
                format!("{}.timeout_ms", field),
                "must be greater than 0",
            ));
        }
        match probe.kind {
            ProbeKind::Tcp => {
                if probe.target.parse::<SocketAddr>().is_err()
                    && !looks_like_host_port(&probe.target)
                {
                    errors.push(ValidationError::new(
                        format!("{}.target", field),
                        format!("'{}' is not a host:port address", probe.target),
                    ));
                }
            }
            ProbeKind::Http => {
                if !(probe.target.starts_with("http://") || probe.target.starts_with("https://")) {
                    errors.push(ValidationError::new(
                        format!("{}.target", field),
                        format!("'{}' is not an http(s) URL", probe.target),
                    ));
                }
            }
        }
    }

    let mut rule_names = HashSet::new();
    for (i, rule) in config.alert_rules.iter().enumerate() {
        let field = format!("alert_rules[{}]", i);
        if let Err(e) = AlertRule::from_config(rule) {
            errors.push(ValidationError::new(&field, e.to_string()));
        }
        if !rule.name.is_empty() && !rule_names.insert(rule.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate rule name '{}'", rule.name),
            ));
        }
    }

    let failover = &config.failover;
    if failover.enabled {
        if failover.threshold == 0 {
            errors.push(ValidationError::new("failover.threshold", "must be at least 1"));
        }
        if failover.action_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "failover.action_timeout_secs",
                "must be greater than 0",
            ));
        }
        if failover.active_slot.parse::<Slot>().is_err() {
            errors.push(ValidationError::new(
                "failover.active_slot",
                format!("'{}' is not 'blue' or 'green'", failover.active_slot),
            ));
        }
        for name in failover.serving_checks.iter().chain(&failover.data_checks) {
            if !probe_names.contains(name.as_str()) {
                errors.push(ValidationError::new(
                    "failover",
                    format!("check '{}' does not match any probe", name),
                ));
            }
        }
        if failover.serving_checks.is_empty() && failover.data_checks.is_empty() {
            errors.push(ValidationError::new(
                "failover",
                "at least one serving or data check is required",
            ));
        }
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", other),
        )),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn looks_like_host_port(target: &str) -> bool {
    match target.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
