//! Wire messages delivered to subscribers.
//!
//! Every message is a JSON object with a `type` discriminator:
//! `health_update`, `alert_fired`, `alert_cleared`, `active_alerts`,
//! `failover_update`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerting::{ActiveAlert, AlertEvent, AlertState, AlertTransition, Severity};
use crate::health::types::{AggregateHealth, ComponentHealth, HealthStatus, HealthSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    HealthUpdate(HealthUpdate),
    AlertFired(AlertNotice),
    AlertCleared(AlertNotice),
    ActiveAlerts(ActiveAlertsView),
    FailoverUpdate(FailoverNotice),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthUpdate {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
    pub summary: HealthSummary,
    pub total_response_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotice {
    pub rule_name: String,
    pub severity: Severity,
    pub description: String,
    pub current_value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlertsView {
    pub timestamp: DateTime<Utc>,
    pub alerts: Vec<ActiveAlertSummary>,
}

/// Dashboard view of one armed or firing alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlertSummary {
    pub rule_name: String,
    pub metric: String,
    pub severity: Severity,
    pub state: AlertState,
    pub current_value: f64,
    pub threshold: f64,
    pub condition_since: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverNotice {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub outcome: String,
    pub detail: String,
}

impl HubMessage {
    /// Serialize for delivery.
    pub fn to_json(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HubMessage::HealthUpdate(_) => "health_update",
            HubMessage::AlertFired(_) => "alert_fired",
            HubMessage::AlertCleared(_) => "alert_cleared",
            HubMessage::ActiveAlerts(_) => "active_alerts",
            HubMessage::FailoverUpdate(_) => "failover_update",
        }
    }

    /// A critical alert not backed by a rule (failover escalations).
    pub fn critical_alert(rule_name: &str, description: impl Into<String>) -> Self {
        HubMessage::AlertFired(AlertNotice {
            rule_name: rule_name.to_string(),
            severity: Severity::Critical,
            description: description.into(),
            current_value: 1.0,
            threshold: 1.0,
            timestamp: Utc::now(),
        })
    }

    /// Clears an alert raised with [`HubMessage::critical_alert`].
    pub fn critical_cleared(rule_name: &str, description: impl Into<String>) -> Self {
        HubMessage::AlertCleared(AlertNotice {
            rule_name: rule_name.to_string(),
            severity: Severity::Critical,
            description: description.into(),
            current_value: 0.0,
            threshold: 1.0,
            timestamp: Utc::now(),
        })
    }
}

impl From<&AggregateHealth> for HubMessage {
    fn from(health: &AggregateHealth) -> Self {
        HubMessage::HealthUpdate(HealthUpdate {
            timestamp: health.timestamp,
            status: health.status,
            checks: health.checks.clone(),
            summary: health.summary,
            total_response_time_ms: health.total_response_time_ms,
        })
    }
}

impl From<&AlertEvent> for HubMessage {
    fn from(event: &AlertEvent) -> Self {
        let notice = AlertNotice {
            rule_name: event.rule.name.clone(),
            severity: event.rule.severity,
            description: event.rule.description.clone(),
            current_value: event.value,
            threshold: event.rule.threshold,
            timestamp: event.at,
        };
        match event.transition {
            AlertTransition::Fired => HubMessage::AlertFired(notice),
            AlertTransition::Cleared => HubMessage::AlertCleared(notice),
        }
    }
}

impl From<&ActiveAlert> for ActiveAlertSummary {
    fn from(alert: &ActiveAlert) -> Self {
        Self {
            rule_name: alert.rule.name.clone(),
            metric: alert.rule.metric.clone(),
            severity: alert.rule.severity,
            state: alert.state,
            current_value: alert.last_value,
            threshold: alert.rule.threshold,
            condition_since: alert.condition_since,
            fired_at: alert.fired_at,
        }
    }
}
