//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Monitor tick / on-demand check
//!     → aggregator.rs (snapshot registered probes)
//!     → probe.rs (one task per probe, each under its own deadline)
//!         - report    → status from the check
//!         - error     → Unhealthy, details.error
//!         - timeout   → Unhealthy, "timed out after Ns"
//!     → types.rs (worst-case fold into AggregateHealth)
//!     → cached as last result, returned to caller
//! ```
//!
//! # Design Decisions
//! - Probes run in parallel; total wall time tracks the slowest probe
//! - Deadlines are enforced by the runner, never trusted to the probe
//! - Aggregation is an ordered comparison, never an average
//! - Unknown counts as Unhealthy for the aggregate only

pub mod aggregator;
pub mod probe;
pub mod probes;
pub mod types;

pub use aggregator::HealthAggregator;
pub use probe::{HealthCheck, Probe, ProbeError, ProbeReport};
pub use types::{AggregateHealth, ComponentHealth, HealthStatus, HealthSummary};
