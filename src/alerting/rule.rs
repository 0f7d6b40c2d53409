//! Alert rules: declarative threshold conditions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AlertRuleConfig;

/// Errors detected when a rule is registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("rule '{rule}' has unknown operator '{operator}'")]
    UnknownOperator { rule: String, operator: String },

    #[error("rule '{rule}' has unknown severity '{severity}'")]
    UnknownSeverity { rule: String, severity: String },

    #[error("rule name must not be empty")]
    EmptyName,

    #[error("rule '{0}' does not name a metric")]
    EmptyMetric(String),

    #[error("rule '{0}' has a non-finite threshold")]
    InvalidThreshold(String),

    #[error("rule '{0}' is already registered")]
    DuplicateRule(String),
}

/// Threshold comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
}

impl Comparator {
    /// `value <op> threshold`.
    ///
    /// Plain IEEE comparison, no epsilon: `==` only holds for exactly equal
    /// values and NaN never satisfies any operator.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Lt => value < threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Le => value <= threshold,
            Comparator::Eq => value == threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
            Comparator::Eq => "==",
        }
    }
}

impl FromStr for Comparator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Comparator::Gt),
            "<" => Ok(Comparator::Lt),
            ">=" => Ok(Comparator::Ge),
            "<=" => Ok(Comparator::Le),
            "==" => Ok(Comparator::Eq),
            _ => Err(()),
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(()),
        }
    }
}

/// A validated alert rule. Shared read-only once registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    pub name: String,
    pub metric: String,
    pub threshold: f64,
    pub operator: Comparator,
    /// Seconds the condition must hold continuously before firing.
    pub sustained_secs: u64,
    pub severity: Severity,
    pub enabled: bool,
    pub description: String,
}

impl AlertRule {
    /// Build an enabled rule with a generated description.
    pub fn new(
        name: impl Into<String>,
        metric: impl Into<String>,
        operator: Comparator,
        threshold: f64,
        sustained_secs: u64,
        severity: Severity,
    ) -> Self {
        let metric = metric.into();
        let description = default_description(&metric, operator, threshold);
        Self {
            name: name.into(),
            metric,
            threshold,
            operator,
            sustained_secs,
            severity,
            enabled: true,
            description,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Convert a config entry, rejecting unknown operators and severities.
    pub fn from_config(config: &AlertRuleConfig) -> Result<Self, RuleError> {
        let operator = config
            .operator
            .parse::<Comparator>()
            .map_err(|_| RuleError::UnknownOperator {
                rule: config.name.clone(),
                operator: config.operator.clone(),
            })?;
        let severity = config
            .severity
            .parse::<Severity>()
            .map_err(|_| RuleError::UnknownSeverity {
                rule: config.name.clone(),
                severity: config.severity.clone(),
            })?;

        let mut rule = AlertRule::new(
            config.name.clone(),
            config.metric.clone(),
            operator,
            config.threshold,
            config.sustained_secs,
            severity,
        );
        if let Some(description) = &config.description {
            rule.description = description.clone();
        }
        rule.enabled = config.enabled;
        rule.validate()?;
        Ok(rule)
    }

    /// Structural checks applied at registration.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }
        if self.metric.trim().is_empty() {
            return Err(RuleError::EmptyMetric(self.name.clone()));
        }
        if !self.threshold.is_finite() {
            return Err(RuleError::InvalidThreshold(self.name.clone()));
        }
        Ok(())
    }

    /// Whether `value` satisfies this rule's condition.
    pub fn is_breached(&self, value: f64) -> bool {
        self.operator.holds(value, self.threshold)
    }
}

fn default_description(metric: &str, operator: Comparator, threshold: f64) -> String {
    format!("{} {} {}", metric, operator.symbol(), threshold)
}
