//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Subscriber delivery:
//!     → timeouts.rs (bounded send; expiry prunes the subscriber)
//!
//! Monitor tick failure:
//!     → backoff.rs (failure count → exponential delay with jitter before the next tick)
//!
//! Failover action / monitor tick:
//!     → guard.rs (panic and overrun become errors; state is always restored)
//! ```
//!
//! # Design Decisions
//! - Every outbound call has a deadline
//! - Repeated failures slow the loop down instead of spinning

pub mod backoff;
pub mod guard;
pub mod timeouts;

pub use backoff::TickBackoff;
pub use guard::{guarded, panic_message, GuardError};
pub use timeouts::{with_deadline, DeadlineError};
