//! Metric sampling subsystem.
//!
//! # Data Flow
//! ```text
//! Each monitor tick:
//!     counters.rs (application gauges/counters)  ─┐
//!     derived.rs  (last AggregateHealth)          ├→ source.rs sample_all → MetricSnapshot
//!     system.rs   (/proc cpu, memory, load)       ─┘
//!     → alert evaluator
//! ```
//!
//! # Design Decisions
//! - Sources are sampled concurrently and merged by metric name
//! - One failing source never hides the others' metrics
//! - How numbers are produced is the source's business; the evaluator
//!   only sees names and floats

pub mod counters;
pub mod derived;
pub mod source;
pub mod system;

pub use counters::CounterRegistry;
pub use derived::HealthDerivedSource;
pub use source::{sample_all, MergedSample, MetricSnapshot, MetricSource, SampleError};
pub use system::SystemSource;
