//! Threshold evaluation with sustain-duration hysteresis.
//!
//! # State Transitions
//! ```text
//! (none)  → Armed:   condition becomes true
//! Armed   → Firing:  condition held for sustained_secs   (emits Fired)
//! Firing  → Firing:  condition still true                (no event)
//! Armed   → (none):  condition false before sustaining   (no event)
//! Firing  → (none):  condition false                     (emits Cleared)
//! ```
//!
//! A metric missing from a snapshot leaves the rule's state untouched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::alerting::event::{AlertEvent, AlertTransition};
use crate::alerting::rule::{AlertRule, RuleError};
use crate::observability::metrics;
use crate::sampling::MetricSnapshot;

/// Lifecycle state of an active alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// Condition true, waiting out the sustain duration.
    Armed,
    /// Sustain duration elapsed and the fired event was emitted.
    Firing,
}

/// Runtime state for a rule whose condition currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAlert {
    pub rule: Arc<AlertRule>,
    pub condition_since: DateTime<Utc>,
    pub last_value: f64,
    pub state: AlertState,
    pub fired_at: Option<DateTime<Utc>>,
}

/// Per-rule alert state machine, driven once per tick.
///
/// Owned by the monitoring loop; `&mut self` on [`evaluate`](Self::evaluate)
/// keeps transitions linearizable.
#[derive(Debug, Default)]
pub struct AlertEvaluator {
    rules: Vec<Arc<AlertRule>>,
    active: HashMap<String, ActiveAlert>,
}

impl AlertEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an evaluator from a rule set, failing on the first bad rule.
    pub fn with_rules<I>(rules: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = AlertRule>,
    {
        let mut evaluator = Self::new();
        for rule in rules {
            evaluator.register(rule)?;
        }
        Ok(evaluator)
    }

    /// Register a rule. Names are unique.
    pub fn register(&mut self, rule: AlertRule) -> Result<(), RuleError> {
        rule.validate()?;
        if self.rules.iter().any(|r| r.name == rule.name) {
            return Err(RuleError::DuplicateRule(rule.name));
        }
        tracing::debug!(rule = %rule.name, metric = %rule.metric, "Registered alert rule");
        self.rules.push(Arc::new(rule));
        Ok(())
    }

    pub fn rules(&self) -> &[Arc<AlertRule>] {
        &self.rules
    }

    /// Swap in a new rule set.
    ///
    /// Alerts for rules that survive by name keep their state. Alerts whose
    /// rule was removed or disabled are dropped, emitting Cleared if firing.
    /// On error the current rule set is kept.
    pub fn replace_rules(
        &mut self,
        rules: Vec<AlertRule>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlertEvent>, RuleError> {
        let replacement = Self::with_rules(rules)?;
        let mut events = Vec::new();

        let active = std::mem::take(&mut self.active);
        for (name, mut alert) in active {
            match replacement.rules.iter().find(|r| r.name == name && r.enabled) {
                Some(rule) => {
                    alert.rule = rule.clone();
                    self.active.insert(name, alert);
                }
                None if alert.state == AlertState::Firing => {
                    tracing::info!(rule = %name, "Alert cleared by rule removal");
                    metrics::record_alert_transition(&name, AlertTransition::Cleared);
                    events.push(AlertEvent::cleared(alert.rule, alert.last_value, now));
                }
                None => {}
            }
        }

        self.rules = replacement.rules;
        metrics::record_alerts_firing(self.firing_count());
        tracing::info!(rules = self.rules.len(), "Alert rules replaced");
        Ok(events)
    }

    /// Evaluate one snapshot at `now` and return the resulting transitions.
    ///
    /// Deterministic: the same snapshot, instant and prior state always
    /// produce the same events.
    pub fn evaluate(&mut self, snapshot: &MetricSnapshot, now: DateTime<Utc>) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        for rule in &self.rules {
            if !rule.enabled {
                continue;
            }
            let Some(&value) = snapshot.get(&rule.metric) else {
                continue;
            };

            if rule.is_breached(value) {
                let alert = self.active.entry(rule.name.clone()).or_insert_with(|| {
                    tracing::debug!(rule = %rule.name, value, "Alert armed");
                    ActiveAlert {
                        rule: rule.clone(),
                        condition_since: now,
                        last_value: value,
                        state: AlertState::Armed,
                        fired_at: None,
                    }
                });
                alert.last_value = value;

                if alert.state == AlertState::Armed
                    && sustained(alert.condition_since, now, rule.sustained_secs)
                {
                    alert.state = AlertState::Firing;
                    alert.fired_at = Some(now);
                    tracing::warn!(
                        rule = %rule.name,
                        metric = %rule.metric,
                        value,
                        threshold = rule.threshold,
                        severity = rule.severity.as_str(),
                        "Alert fired"
                    );
                    events.push(AlertEvent::fired(rule.clone(), value, now));
                }
            } else if let Some(alert) = self.active.remove(&rule.name) {
                match alert.state {
                    AlertState::Firing => {
                        tracing::info!(rule = %rule.name, value, "Alert cleared");
                        events.push(AlertEvent::cleared(rule.clone(), value, now));
                    }
                    AlertState::Armed => {
                        tracing::debug!(
                            rule = %rule.name,
                            value,
                            "Alert disarmed before sustaining"
                        );
                    }
                }
            }
        }

        for event in &events {
            metrics::record_alert_transition(&event.rule.name, event.transition);
        }
        metrics::record_alerts_firing(self.firing_count());
        events
    }

    /// Snapshot of armed and firing alerts, ordered by rule registration.
    pub fn active_alerts(&self) -> Vec<ActiveAlert> {
        self.rules
            .iter()
            .filter_map(|rule| self.active.get(&rule.name).cloned())
            .collect()
    }

    /// Only the alerts that have fired and not cleared.
    pub fn firing_alerts(&self) -> Vec<ActiveAlert> {
        self.active_alerts()
            .into_iter()
            .filter(|a| a.state == AlertState::Firing)
            .collect()
    }

    fn firing_count(&self) -> usize {
        self.active
            .values()
            .filter(|a| a.state == AlertState::Firing)
            .count()
    }
}

fn sustained(since: DateTime<Utc>, now: DateTime<Utc>, secs: u64) -> bool {
    let required = i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds);
    match required {
        Some(required) => now.signed_duration_since(since) >= required,
        None => false,
    }
}
