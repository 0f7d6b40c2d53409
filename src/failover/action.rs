//! Remedial action plans and their step-by-step execution.
//!
//! # Steps
//! ```text
//! Traffic switch:
//!     inspect → scale target slot (readiness) → switch traffic → verify serving checks
//!     verification failed → switch back to the previous slot
//!
//! Data-layer failover:
//!     inspect → replica readiness → promote replica → verify data checks
//!     verification failed → promote the previous primary back
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::failover::executor::{FailoverExecutor, PostActionCheck, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    TrafficSwitch,
    DataLayerFailover,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::TrafficSwitch => "traffic_switch",
            ActionKind::DataLayerFailover => "data_layer_failover",
        }
    }
}

/// A concrete action chosen by the decision machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPlan {
    TrafficSwitch {
        from: Slot,
        to: Slot,
        replicas: u32,
        verify: Vec<String>,
    },
    DataLayerFailover {
        primary: String,
        replica: String,
        verify: Vec<String>,
    },
}

impl ActionPlan {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPlan::TrafficSwitch { .. } => ActionKind::TrafficSwitch,
            ActionPlan::DataLayerFailover { .. } => ActionKind::DataLayerFailover,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            ActionPlan::TrafficSwitch { from, to, .. } => {
                format!("switch traffic from {} to {}", from, to)
            }
            ActionPlan::DataLayerFailover { primary, replica, .. } => {
                format!("promote {} in place of {}", replica, primary)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    /// Failed before anything changed.
    Aborted { reason: String },
    /// The change was undone after a failure.
    RolledBack { reason: String },
    /// The change failed and could not be undone.
    RollbackFailed { reason: String },
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Succeeded => "succeeded",
            ActionOutcome::Aborted { .. } => "aborted",
            ActionOutcome::RolledBack { .. } => "rolled_back",
            ActionOutcome::RollbackFailed { .. } => "rollback_failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub plan: ActionPlan,
    pub outcome: ActionOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Carry out `plan`. Never fails; failures are reported in the outcome.
pub async fn run_plan(
    plan: &ActionPlan,
    executor: &dyn FailoverExecutor,
    verifier: &dyn PostActionCheck,
) -> ActionOutcome {
    match plan {
        ActionPlan::TrafficSwitch { from, to, replicas, verify } => {
            traffic_switch(*from, *to, *replicas, verify, executor, verifier).await
        }
        ActionPlan::DataLayerFailover { primary, replica, verify } => {
            data_layer_failover(primary, replica, verify, executor, verifier).await
        }
    }
}

async fn traffic_switch(
    from: Slot,
    to: Slot,
    replicas: u32,
    verify: &[String],
    executor: &dyn FailoverExecutor,
    verifier: &dyn PostActionCheck,
) -> ActionOutcome {
    info!(from = %from, to = %to, replicas, "Starting traffic switch");

    if !executor.scale_slot(to, replicas).await {
        warn!(slot = %to, "Target slot failed readiness, aborting traffic switch");
        return ActionOutcome::Aborted {
            reason: format!("slot {} did not become ready", to),
        };
    }

    let reason = if !executor.switch_traffic(to).await {
        format!("switching traffic to {} failed", to)
    } else if !verifier.verify(verify).await {
        format!("serving checks still failing after switch to {}", to)
    } else {
        info!(active = %to, "Traffic switch verified");
        return ActionOutcome::Succeeded;
    };

    warn!(reason = %reason, rollback_to = %from, "Rolling back traffic switch");
    if executor.switch_traffic(from).await {
        ActionOutcome::RolledBack { reason }
    } else {
        error!(slot = %from, "Rollback of traffic switch failed");
        ActionOutcome::RollbackFailed {
            reason: format!("{}; switching back to {} also failed", reason, from),
        }
    }
}

async fn data_layer_failover(
    primary: &str,
    replica: &str,
    verify: &[String],
    executor: &dyn FailoverExecutor,
    verifier: &dyn PostActionCheck,
) -> ActionOutcome {
    info!(primary, replica, "Starting data-layer failover");

    if !executor.replica_ready(replica).await {
        warn!(replica, "Replica not ready, aborting data-layer failover");
        return ActionOutcome::Aborted {
            reason: format!("replica {} is not ready", replica),
        };
    }

    if !executor.promote_replica(replica).await {
        warn!(replica, "Replica promotion failed, aborting data-layer failover");
        return ActionOutcome::Aborted {
            reason: format!("promoting {} failed", replica),
        };
    }

    if verifier.verify(verify).await {
        info!(primary = replica, "Data-layer failover verified");
        return ActionOutcome::Succeeded;
    }

    let reason = format!("data checks still failing after promoting {}", replica);
    warn!(reason = %reason, rollback_to = primary, "Rolling back data-layer failover");
    if executor.promote_replica(primary).await {
        ActionOutcome::RolledBack { reason }
    } else {
        error!(primary, "Rollback of data-layer failover failed");
        ActionOutcome::RollbackFailed {
            reason: format!("{}; restoring {} as primary also failed", reason, primary),
        }
    }
}
