//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Monitor (monitor.rs):
//!     interval tick → probe → publish → sample → evaluate → failover
//!     config reload → new alert rules applied before the next tick
//!
//! Shutdown (shutdown.rs):
//!     Signal received → latch set → monitor stops between ticks
//!     → in-flight failover action drained
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - A single monitor task; ticks never overlap
//! - Tick failures back off and retry; only shutdown ends the loop
//! - Shutdown has a deadline in the binary: forced exit after it

pub mod monitor;
pub mod shutdown;
pub mod signals;

pub use monitor::{Monitor, MonitorError, TickSummary};
pub use shutdown::{Shutdown, ShutdownSignal};
