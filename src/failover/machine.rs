//! Failover decision state machine.
//!
//! # State Transitions
//! ```text
//! Normal / Degrading --(healthy or degraded)--> Normal, count = 0
//! Normal             --(unhealthy)----------> Degrading, count = 1
//! Degrading          --(unhealthy, count < threshold)--> Degrading, count + 1
//! Degrading          --(unhealthy, count >= threshold)-->
//!     serving down, data up   → ActionInFlight (traffic switch)
//!     data down, serving up   → ActionInFlight (data-layer failover)
//!     both down               → ManualInterventionRequired
//!     neither layer down      → Normal (nothing to remediate)
//! ActionInFlight     --(action finished, any outcome)--> Normal, count = 0
//!     (a panicking or overrunning action counts as RollbackFailed)
//! ManualInterventionRequired --(reset)--> Normal
//! ```
//!
//! Observations during `ActionInFlight` or `ManualInterventionRequired`
//! are recorded but never start another action.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::FailoverConfig;
use crate::failover::action::{self, ActionOutcome, ActionPlan, ActionReport};
use crate::failover::executor::{FailoverExecutor, ParseSlotError, PostActionCheck, Slot};
use crate::health::types::{AggregateHealth, HealthStatus};
use crate::observability::metrics;
use crate::resilience::{guarded, GuardError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPhase {
    Normal,
    Degrading,
    ActionInFlight,
    ManualInterventionRequired,
}

/// Result of one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Aggregate not unhealthy; counter reset.
    Healthy,
    /// Unhealthy but below the threshold.
    Counting { consecutive: u32 },
    /// Threshold reached; the caller must run this plan via `execute`.
    Act { plan: ActionPlan },
    /// Both layers down; automated action refused until `reset`.
    ManualInterventionRequired { failing: Vec<String> },
    /// Threshold reached but no configured layer is failing.
    Unremediable { failing: Vec<String> },
    /// An action is already running; the observation was only recorded.
    Suppressed,
    /// Waiting for operator reset; the observation was only recorded.
    AwaitingReset,
}

/// Static inputs to the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverSettings {
    pub threshold: u32,
    pub serving_checks: Vec<String>,
    pub data_checks: Vec<String>,
    pub slot_replicas: u32,
    /// Upper bound on one action, rollback included.
    pub action_timeout: Duration,
}

impl FailoverSettings {
    pub fn new(threshold: u32, serving_checks: Vec<String>, data_checks: Vec<String>) -> Self {
        Self {
            threshold: threshold.max(1),
            serving_checks,
            data_checks,
            slot_replicas: 3,
            action_timeout: Duration::from_secs(300),
        }
    }
}

/// Deployment topology the actions switch between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub active_slot: Slot,
    pub data_primary: String,
    pub data_replica: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            active_slot: Slot::Blue,
            data_primary: "primary".into(),
            data_replica: "replica".into(),
        }
    }
}

/// Point-in-time view of the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailoverState {
    pub phase: FailoverPhase,
    pub consecutive_failures: u32,
    pub failover_in_progress: bool,
    pub last_decision: Option<Decision>,
    pub last_observation: Option<HealthStatus>,
    pub topology: Topology,
}

#[derive(Debug)]
struct Inner {
    phase: FailoverPhase,
    consecutive_failures: u32,
    last_decision: Option<Decision>,
    last_observation: Option<HealthStatus>,
    topology: Topology,
}

pub struct FailoverMachine {
    settings: FailoverSettings,
    inner: Mutex<Inner>,
    executor: Arc<dyn FailoverExecutor>,
    verifier: Arc<dyn PostActionCheck>,
}

impl FailoverMachine {
    pub fn new(
        settings: FailoverSettings,
        topology: Topology,
        executor: Arc<dyn FailoverExecutor>,
        verifier: Arc<dyn PostActionCheck>,
    ) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner {
                phase: FailoverPhase::Normal,
                consecutive_failures: 0,
                last_decision: None,
                last_observation: None,
                topology,
            }),
            executor,
            verifier,
        }
    }

    pub fn from_config(
        config: &FailoverConfig,
        executor: Arc<dyn FailoverExecutor>,
        verifier: Arc<dyn PostActionCheck>,
    ) -> Result<Self, ParseSlotError> {
        let mut settings = FailoverSettings::new(
            config.threshold,
            config.serving_checks.clone(),
            config.data_checks.clone(),
        );
        settings.slot_replicas = config.slot_replicas;
        settings.action_timeout = Duration::from_secs(config.action_timeout_secs);

        let topology = Topology {
            active_slot: config.active_slot.parse()?,
            data_primary: config.data_primary.clone(),
            data_replica: config.data_replica.clone(),
        };
        Ok(Self::new(settings, topology, executor, verifier))
    }

    /// Feed one aggregate health result.
    ///
    /// Only an Unhealthy aggregate counts as a failure. When this returns
    /// [`Decision::Act`] the machine is in `ActionInFlight` until the plan
    /// is passed to [`execute`](Self::execute).
    pub fn observe(&self, health: &AggregateHealth) -> Decision {
        let mut inner = self.inner.lock().expect("failover state lock poisoned");
        inner.last_observation = Some(health.status);

        let decision = match inner.phase {
            FailoverPhase::ActionInFlight => return Decision::Suppressed,
            FailoverPhase::ManualInterventionRequired => return Decision::AwaitingReset,
            FailoverPhase::Normal | FailoverPhase::Degrading => self.decide(&mut inner, health),
        };

        inner.last_decision = Some(decision.clone());
        decision
    }

    fn decide(&self, inner: &mut Inner, health: &AggregateHealth) -> Decision {
        if health.status != HealthStatus::Unhealthy {
            if inner.consecutive_failures > 0 {
                info!(
                    status = %health.status,
                    after = inner.consecutive_failures,
                    "Health recovered, failover counter reset"
                );
            }
            inner.consecutive_failures = 0;
            inner.phase = FailoverPhase::Normal;
            return Decision::Healthy;
        }

        inner.consecutive_failures += 1;
        if inner.consecutive_failures < self.settings.threshold {
            inner.phase = FailoverPhase::Degrading;
            warn!(
                consecutive = inner.consecutive_failures,
                threshold = self.settings.threshold,
                "Unhealthy cycle counted"
            );
            return Decision::Counting {
                consecutive: inner.consecutive_failures,
            };
        }

        let serving_down = layer_down(health, &self.settings.serving_checks);
        let data_down = layer_down(health, &self.settings.data_checks);
        let failing = failing_checks(health);

        match (serving_down, data_down) {
            (true, true) => {
                inner.phase = FailoverPhase::ManualInterventionRequired;
                error!(
                    failing = ?failing,
                    "Serving and data layers down, manual intervention required"
                );
                Decision::ManualInterventionRequired { failing }
            }
            (_, true) => {
                inner.phase = FailoverPhase::ActionInFlight;
                let plan = ActionPlan::DataLayerFailover {
                    primary: inner.topology.data_primary.clone(),
                    replica: inner.topology.data_replica.clone(),
                    verify: self.settings.data_checks.clone(),
                };
                warn!(plan = %plan.summary(), "Failover threshold reached");
                Decision::Act { plan }
            }
            (true, false) => {
                inner.phase = FailoverPhase::ActionInFlight;
                let from = inner.topology.active_slot;
                let plan = ActionPlan::TrafficSwitch {
                    from,
                    to: from.other(),
                    replicas: self.settings.slot_replicas,
                    verify: self.settings.serving_checks.clone(),
                };
                warn!(plan = %plan.summary(), "Failover threshold reached");
                Decision::Act { plan }
            }
            (false, false) => {
                inner.phase = FailoverPhase::Normal;
                inner.consecutive_failures = 0;
                warn!(
                    failing = ?failing,
                    "Failover threshold reached but no remediable layer is down"
                );
                Decision::Unremediable { failing }
            }
        }
    }

    /// Run a plan handed out by [`observe`](Self::observe).
    ///
    /// Whatever the outcome, the machine returns to `Normal` with the
    /// counter reset. A successful action updates the topology. An action
    /// that panics or outlives `action_timeout` leaves the deployment in an
    /// unknown state and is reported as `RollbackFailed`.
    pub async fn execute(&self, plan: ActionPlan) -> ActionReport {
        let started_at = Utc::now();
        let run = action::run_plan(&plan, self.executor.as_ref(), self.verifier.as_ref());
        let outcome = match guarded(self.settings.action_timeout, run).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(plan = %plan.summary(), error = %e, "Failover action did not finish");
                ActionOutcome::RollbackFailed {
                    reason: match e {
                        GuardError::Elapsed(limit) => {
                            format!("action did not finish within {}s", limit.as_secs())
                        }
                        GuardError::Panicked(message) => format!("action panicked: {}", message),
                    },
                }
            }
        };

        {
            let mut inner = self.inner.lock().expect("failover state lock poisoned");
            if outcome.is_success() {
                apply(&mut inner.topology, &plan);
            }
            inner.phase = FailoverPhase::Normal;
            inner.consecutive_failures = 0;
        }

        metrics::record_failover(plan.kind().as_str(), outcome.as_str());
        match &outcome {
            ActionOutcome::Succeeded => info!(plan = %plan.summary(), "Failover action succeeded"),
            ActionOutcome::Aborted { reason } | ActionOutcome::RolledBack { reason } => warn!(
                plan = %plan.summary(),
                outcome = outcome.as_str(),
                reason = %reason,
                "Failover action did not complete"
            ),
            ActionOutcome::RollbackFailed { reason } => {
                error!(plan = %plan.summary(), reason = %reason, "Failover rollback failed")
            }
        }

        ActionReport {
            plan,
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Operator acknowledgment.
    ///
    /// Clears `ManualInterventionRequired` and the failure counter. Refused
    /// (returns false) while an action is in flight.
    pub fn reset(&self) -> bool {
        let mut inner = self.inner.lock().expect("failover state lock poisoned");
        if inner.phase == FailoverPhase::ActionInFlight {
            warn!("Reset refused while a failover action is in flight");
            return false;
        }
        info!(phase = ?inner.phase, "Failover state reset");
        inner.phase = FailoverPhase::Normal;
        inner.consecutive_failures = 0;
        true
    }

    pub fn state(&self) -> FailoverState {
        let inner = self.inner.lock().expect("failover state lock poisoned");
        FailoverState {
            phase: inner.phase,
            consecutive_failures: inner.consecutive_failures,
            failover_in_progress: inner.phase == FailoverPhase::ActionInFlight,
            last_decision: inner.last_decision.clone(),
            last_observation: inner.last_observation,
            topology: inner.topology.clone(),
        }
    }
}

fn apply(topology: &mut Topology, plan: &ActionPlan) {
    match plan {
        ActionPlan::TrafficSwitch { to, .. } => topology.active_slot = *to,
        ActionPlan::DataLayerFailover { .. } => {
            std::mem::swap(&mut topology.data_primary, &mut topology.data_replica);
        }
    }
}

/// A layer is down when any of its checks is failing or missing.
fn layer_down(health: &AggregateHealth, checks: &[String]) -> bool {
    checks.iter().any(|name| {
        health
            .check(name)
            .map(|c| c.status.is_failing())
            .unwrap_or(true)
    })
}

fn failing_checks(health: &AggregateHealth) -> Vec<String> {
    health
        .checks
        .iter()
        .filter(|c| c.status.is_failing())
        .map(|c| c.name.clone())
        .collect()
}
