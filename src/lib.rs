//! Health aggregation and alert evaluation engine.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────── Monitor tick ────────────────────────────────┐
//!   │                                                                              │
//!   │  ┌──────────┐   AggregateHealth   ┌──────────┐                               │
//!   │  │  health  │────────────────────▶│   hub    │──▶ subscribers (dashboards)    │
//!   │  │ probes + │        │            │ fan-out  │◀──────────────┐               │
//!   │  │aggregator│        │            └──────────┘               │               │
//!   │  └──────────┘        │                 ▲                     │               │
//!   │       │              ▼                 │ AlertEvent          │ ActionReport  │
//!   │       │        ┌──────────┐      ┌──────────┐          ┌──────────┐          │
//!   │       └───────▶│ sampling │─────▶│ alerting │          │ failover │          │
//!   │    derived     │ sources  │ snap │evaluator │          │ machine  │          │
//!   │    metrics     └──────────┘ shot └──────────┘          └──────────┘          │
//!   │                                                             ▲                │
//!   │                              AggregateHealth ───────────────┘                │
//!   └──────────────────────────────────────────────────────────────────────────────┘
//!
//!   Cross-cutting: config (load, validate, hot reload) · observability (logs, metrics)
//!                  resilience (deadlines, backoff) · lifecycle (monitor loop, shutdown)
//! ```

pub mod alerting;
pub mod config;
pub mod failover;
pub mod health;
pub mod hub;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod sampling;

pub use alerting::{AlertEvaluator, AlertRule};
pub use config::schema::HealthwatchConfig;
pub use failover::FailoverMachine;
pub use health::HealthAggregator;
pub use hub::SubscriptionHub;
pub use lifecycle::{Monitor, Shutdown};
