//! Capabilities the failover machine drives.
//!
//! Infrastructure mechanics (orchestrator API calls, database promotion)
//! live behind these traits. Every operation reports plain success or
//! failure; nothing is expected to cross this boundary as an error.

use std::fmt;
use std::str::FromStr;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Blue/green deployment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Blue,
    Green,
}

impl Slot {
    /// The slot traffic would move to.
    pub fn other(self) -> Self {
        match self {
            Slot::Blue => Slot::Green,
            Slot::Green => Slot::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Blue => "blue",
            Slot::Green => "green",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown deployment slot '{0}', expected 'blue' or 'green'")]
pub struct ParseSlotError(String);

impl FromStr for Slot {
    type Err = ParseSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blue" => Ok(Slot::Blue),
            "green" => Ok(Slot::Green),
            _ => Err(ParseSlotError(s.to_string())),
        }
    }
}

/// Remedial operations against the deployment.
pub trait FailoverExecutor: Send + Sync {
    /// Route all serving traffic to `target`.
    fn switch_traffic(&self, target: Slot) -> BoxFuture<'_, bool>;

    /// Whether the named replica is reachable and caught up enough to take
    /// over as primary.
    fn replica_ready<'a>(&'a self, replica: &'a str) -> BoxFuture<'a, bool>;

    /// Promote the named replica to primary.
    fn promote_replica<'a>(&'a self, target: &'a str) -> BoxFuture<'a, bool>;

    /// Scale `slot` to `replicas` and wait until it is ready.
    fn scale_slot(&self, slot: Slot, replicas: u32) -> BoxFuture<'_, bool>;
}

/// Post-switch verification.
pub trait PostActionCheck: Send + Sync {
    /// Whether the named components are serving again. An empty list means
    /// "the system as a whole".
    fn verify<'a>(&'a self, components: &'a [String]) -> BoxFuture<'a, bool>;
}

/// Logs every requested operation and reports success.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

impl FailoverExecutor for DryRunExecutor {
    fn switch_traffic(&self, target: Slot) -> BoxFuture<'_, bool> {
        info!(target_slot = %target, "Dry run: would switch traffic");
        Box::pin(async { true })
    }

    fn replica_ready<'a>(&'a self, replica: &'a str) -> BoxFuture<'a, bool> {
        info!(replica, "Dry run: would check replica readiness");
        Box::pin(async { true })
    }

    fn promote_replica<'a>(&'a self, target: &'a str) -> BoxFuture<'a, bool> {
        info!(replica = %target, "Dry run: would promote replica");
        Box::pin(async { true })
    }

    fn scale_slot(&self, slot: Slot, replicas: u32) -> BoxFuture<'_, bool> {
        info!(slot = %slot, replicas, "Dry run: would scale slot");
        Box::pin(async { true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_parse_and_other() {
        assert_eq!("blue".parse::<Slot>(), Ok(Slot::Blue));
        assert_eq!("GREEN".parse::<Slot>(), Ok(Slot::Green));
        assert!("purple".parse::<Slot>().is_err());
        assert_eq!(Slot::Blue.other(), Slot::Green);
        assert_eq!(Slot::Green.other().other(), Slot::Green);
    }

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        let executor = DryRunExecutor;
        assert!(executor.scale_slot(Slot::Green, 3).await);
        assert!(executor.switch_traffic(Slot::Green).await);
        assert!(executor.replica_ready("db-replica").await);
        assert!(executor.promote_replica("db-replica").await);
    }
}
