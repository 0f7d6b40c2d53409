//! Alert state-transition events.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::alerting::rule::AlertRule;

/// Which transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    Fired,
    Cleared,
}

impl AlertTransition {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertTransition::Fired => "fired",
            AlertTransition::Cleared => "cleared",
        }
    }
}

/// Emitted when a rule starts or stops firing.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub transition: AlertTransition,
    pub rule: Arc<AlertRule>,
    /// Metric value observed on the tick that caused the transition.
    pub value: f64,
    pub at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn fired(rule: Arc<AlertRule>, value: f64, at: DateTime<Utc>) -> Self {
        Self {
            transition: AlertTransition::Fired,
            rule,
            value,
            at,
        }
    }

    pub fn cleared(rule: Arc<AlertRule>, value: f64, at: DateTime<Utc>) -> Self {
        Self {
            transition: AlertTransition::Cleared,
            rule,
            value,
            at,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.transition == AlertTransition::Fired
    }
}
