//! Alert evaluation subsystem.
//!
//! # Data Flow
//! ```text
//! config alert_rules
//!     → rule.rs (operator/severity parsed, fail fast on unknown values)
//!     → evaluator.rs (registered, shared read-only via Arc)
//!
//! Each monitor tick:
//!     MetricSnapshot + now
//!     → evaluator.rs (per-rule Armed/Firing state, sustain hysteresis)
//!     → event.rs (Fired / Cleared transitions only)
//!     → hub broadcast
//! ```
//!
//! # Design Decisions
//! - Events are emitted on transitions, never on every firing tick
//! - An alert that never sustained is dropped silently (no Cleared)
//! - Armed alerts stay visible through `active_alerts()` for diagnostics
//! - Float comparisons are exact; no epsilon is applied to `==`

pub mod evaluator;
pub mod event;
pub mod rule;

pub use evaluator::{ActiveAlert, AlertEvaluator, AlertState};
pub use event::{AlertEvent, AlertTransition};
pub use rule::{AlertRule, Comparator, RuleError, Severity};
