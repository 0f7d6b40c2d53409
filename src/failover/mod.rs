//! Automated failover decisions.
//!
//! # Data Flow
//! ```text
//! Monitor tick:
//!     AggregateHealth → machine.rs observe()
//!         → Healthy / Counting / Suppressed / AwaitingReset (no action)
//!         → ManualInterventionRequired (hub alert, wait for reset)
//!         → Act(plan) → spawned: machine.rs execute()
//!             → action.rs (readiness → switch → verify → rollback on failure)
//!             → executor.rs (FailoverExecutor, PostActionCheck)
//!             → ActionReport published through the hub
//! ```
//!
//! # Design Decisions
//! - Deciding is synchronous and lock-guarded; acting is async and separate
//! - At most one action in flight; later signals are recorded only
//! - Every action ends back in Normal, even when rollback fails
//! - Both layers down is never auto-remediated

pub mod action;
pub mod executor;
pub mod machine;

pub use action::{ActionKind, ActionOutcome, ActionPlan, ActionReport};
pub use executor::{DryRunExecutor, FailoverExecutor, PostActionCheck, Slot};
pub use machine::{
    Decision, FailoverMachine, FailoverPhase, FailoverSettings, FailoverState, Topology,
};
