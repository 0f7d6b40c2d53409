//! The monitoring loop.
//!
//! One task, one tick at a time:
//! ```text
//! probe all → publish health → sample metrics → evaluate rules
//!     → publish alert transitions + active alert view → failover observe
//! ```
//! A failed or panicking tick is logged and followed by a jittered
//! backoff; the loop itself only ends on shutdown.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alerting::{AlertEvaluator, AlertRule, RuleError};
use crate::config::{HealthwatchConfig, MonitorConfig};
use crate::failover::{ActionOutcome, ActionReport, Decision, FailoverMachine};
use crate::health::types::{AggregateHealth, HealthStatus};
use crate::health::HealthAggregator;
use crate::hub::{FailoverNotice, HubMessage, SubscriptionHub};
use crate::observability::metrics;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::resilience::{panic_message, TickBackoff};
use crate::sampling::{sample_all, MergedSample, MetricSource, SampleError};

pub const MANUAL_INTERVENTION_ALERT: &str = "failover_manual_intervention";
pub const ROLLBACK_FAILED_ALERT: &str = "failover_rollback_failed";

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("every metric source failed, first was '{source_name}': {error}")]
    Sampling {
        source_name: String,
        error: SampleError,
    },

    #[error("tick panicked: {0}")]
    Panicked(String),
}

/// What one successful tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub status: HealthStatus,
    pub alert_events: usize,
    pub decision: Option<Decision>,
}

pub struct Monitor {
    aggregator: Arc<HealthAggregator>,
    hub: Arc<SubscriptionHub>,
    evaluator: AlertEvaluator,
    sources: Vec<Box<dyn MetricSource>>,
    failover: Option<Arc<FailoverMachine>>,
    interval: Duration,
    sample_timeout: Duration,
    backoff: TickBackoff,
    config_updates: Option<mpsc::UnboundedReceiver<HealthwatchConfig>>,
    in_flight: Option<JoinHandle<()>>,
    /// A manual-intervention alert was published and not yet cleared.
    escalated: bool,
}

impl Monitor {
    pub fn new(
        aggregator: Arc<HealthAggregator>,
        hub: Arc<SubscriptionHub>,
        evaluator: AlertEvaluator,
    ) -> Self {
        let defaults = MonitorConfig::default();
        Self {
            aggregator,
            hub,
            evaluator,
            sources: Vec::new(),
            failover: None,
            interval: Duration::from_secs(defaults.interval_secs),
            sample_timeout: Duration::from_millis(defaults.sample_timeout_ms),
            backoff: TickBackoff::new(
                defaults.error_backoff_base_ms,
                defaults.error_backoff_max_ms,
            ),
            config_updates: None,
            in_flight: None,
            escalated: false,
        }
    }

    pub fn with_config(mut self, config: &MonitorConfig) -> Self {
        self.interval = Duration::from_secs(config.interval_secs.max(1));
        self.sample_timeout = Duration::from_millis(config.sample_timeout_ms);
        self.backoff = TickBackoff::new(config.error_backoff_base_ms, config.error_backoff_max_ms);
        self
    }

    /// Deadline for each metric source on every tick.
    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_source(mut self, source: Box<dyn MetricSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_failover(mut self, machine: Arc<FailoverMachine>) -> Self {
        self.failover = Some(machine);
        self
    }

    /// Apply alert rules (and the tick interval) from reloaded configs.
    pub fn with_config_updates(mut self, rx: mpsc::UnboundedReceiver<HealthwatchConfig>) -> Self {
        self.config_updates = Some(rx);
        self
    }

    pub fn evaluator(&self) -> &AlertEvaluator {
        &self.evaluator
    }

    /// Run until `shutdown` fires. Shutdown is observed between ticks.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut ticker = ticker(self.interval);
        info!(
            interval_secs = self.interval.as_secs_f64(),
            probes = self.aggregator.probe_names().len(),
            rules = self.evaluator.rules().len(),
            sources = self.sources.len(),
            failover = self.failover.is_some(),
            "Monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    info!("Monitor shutting down");
                    break;
                }
            }

            if let Some(new_interval) = self.apply_config_updates().await {
                ticker = ticker_after_first(new_interval);
            }

            match self.guarded_tick().await {
                Ok(summary) => {
                    self.backoff.record_success();
                    debug!(
                        status = %summary.status,
                        alert_events = summary.alert_events,
                        "Tick complete"
                    );
                }
                Err(e) => {
                    metrics::record_tick_error();
                    let delay = self.backoff.record_failure();
                    error!(
                        error = %e,
                        consecutive = self.backoff.failures(),
                        backoff_ms = delay.as_millis() as u64,
                        "Monitor tick failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => {
                            info!("Monitor shutting down");
                            break;
                        }
                    }
                }
            }
        }

        if let Some(handle) = self.in_flight.take() {
            if !handle.is_finished() {
                info!("Waiting for in-flight failover action");
            }
            if let Err(e) = handle.await {
                error!(error = %e, "Failover action task failed");
            }
        }
    }

    /// Run one tick with panics converted to errors.
    pub async fn guarded_tick(&mut self) -> Result<TickSummary, MonitorError> {
        match AssertUnwindSafe(self.tick()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(MonitorError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    async fn tick(&mut self) -> Result<TickSummary, MonitorError> {
        let health = self.aggregator.check_all().await;
        self.hub.publish_health(&health).await;

        let MergedSample { snapshot, failures } =
            sample_all(&self.sources, self.sample_timeout).await;
        let all_failed = !self.sources.is_empty() && failures.len() == self.sources.len();

        let events = if all_failed {
            Vec::new()
        } else {
            self.evaluator.evaluate(&snapshot, Utc::now())
        };
        for event in &events {
            self.hub.publish_alert(event).await;
        }
        self.hub.set_active_alerts(&self.evaluator.active_alerts());

        let decision = match self.failover.clone() {
            Some(machine) => Some(self.handle_failover(machine, &health).await),
            None => None,
        };

        if all_failed {
            if let Some((source_name, error)) = failures.into_iter().next() {
                return Err(MonitorError::Sampling { source_name, error });
            }
        }

        Ok(TickSummary {
            status: health.status,
            alert_events: events.len(),
            decision,
        })
    }

    async fn handle_failover(
        &mut self,
        machine: Arc<FailoverMachine>,
        health: &AggregateHealth,
    ) -> Decision {
        let decision = machine.observe(health);
        let still_escalated = matches!(
            decision,
            Decision::ManualInterventionRequired { .. } | Decision::AwaitingReset
        );
        if self.escalated && !still_escalated {
            info!("Failover re-armed after operator reset");
            let message = HubMessage::critical_cleared(
                MANUAL_INTERVENTION_ALERT,
                "Failover state reset; automated failover re-enabled",
            );
            self.hub.publish(&message).await;
            self.escalated = false;
        }

        match &decision {
            Decision::Act { plan } => {
                let plan = plan.clone();
                let hub = Arc::clone(&self.hub);
                self.in_flight = Some(tokio::spawn(async move {
                    let report = machine.execute(plan).await;
                    publish_report(&hub, &report).await;
                }));
            }
            Decision::ManualInterventionRequired { failing } => {
                let message = HubMessage::critical_alert(
                    MANUAL_INTERVENTION_ALERT,
                    format!(
                        "Serving and data layers are both down ({}); \
                         automated failover disabled until reset",
                        failing.join(", ")
                    ),
                );
                self.hub.publish(&message).await;
                self.escalated = true;
            }
            _ => {}
        }
        decision
    }

    /// Drain pending config reloads and apply the newest one.
    ///
    /// Returns the new tick interval when it changed.
    async fn apply_config_updates(&mut self) -> Option<Duration> {
        let rx = self.config_updates.as_mut()?;
        let mut latest = None;
        while let Ok(config) = rx.try_recv() {
            latest = Some(config);
        }
        let config = latest?;

        match build_rules(&config) {
            Ok(rules) => match self.evaluator.replace_rules(rules, Utc::now()) {
                Ok(cleared) => {
                    for event in &cleared {
                        self.hub.publish_alert(event).await;
                    }
                    self.hub.set_active_alerts(&self.evaluator.active_alerts());
                    info!(rules = self.evaluator.rules().len(), "Reloaded alert rules applied");
                }
                Err(e) => warn!(error = %e, "Reloaded alert rules rejected"),
            },
            Err(e) => warn!(error = %e, "Reloaded alert rules rejected"),
        }

        self.backoff.set_limits(
            config.monitor.error_backoff_base_ms,
            config.monitor.error_backoff_max_ms,
        );
        self.sample_timeout = Duration::from_millis(config.monitor.sample_timeout_ms);

        let interval = Duration::from_secs(config.monitor.interval_secs.max(1));
        if interval != self.interval {
            info!(
                from_secs = self.interval.as_secs(),
                to_secs = interval.as_secs(),
                "Tick interval changed"
            );
            self.interval = interval;
            return Some(interval);
        }
        None
    }
}

fn build_rules(config: &HealthwatchConfig) -> Result<Vec<AlertRule>, RuleError> {
    config.alert_rules.iter().map(AlertRule::from_config).collect()
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Ticker whose first tick is one full period away.
fn ticker_after_first(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn publish_report(hub: &SubscriptionHub, report: &ActionReport) {
    let (detail, escalation) = match &report.outcome {
        ActionOutcome::Succeeded => (report.plan.summary(), None),
        ActionOutcome::Aborted { reason } | ActionOutcome::RolledBack { reason } => {
            (reason.clone(), None)
        }
        ActionOutcome::RollbackFailed { reason } => (
            reason.clone(),
            Some(HubMessage::critical_alert(
                ROLLBACK_FAILED_ALERT,
                format!("Failover rollback failed: {}", reason),
            )),
        ),
    };

    hub.publish(&HubMessage::FailoverUpdate(FailoverNotice {
        timestamp: report.finished_at,
        action: report.plan.kind().as_str().to_string(),
        outcome: report.outcome.as_str().to_string(),
        detail,
    }))
    .await;

    if let Some(message) = escalation {
        hub.publish(&message).await;
    }
}
