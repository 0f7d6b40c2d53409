//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, alert rule conversion)
//!     → HealthwatchConfig (validated, immutable)
//!     → handed to subsystems at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → monitor applies new alert rules between ticks
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only alert rules are hot-reloaded; probes and failover need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AlertRuleConfig, FailoverConfig, HealthwatchConfig, HubConfig, MonitorConfig,
    ObservabilityConfig, ProbeConfig, ProbeKind,
};
