//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use healthwatch::failover::{FailoverExecutor, Slot};
use healthwatch::health::{
    AggregateHealth, ComponentHealth, HealthCheck, HealthStatus, ProbeError, ProbeReport,
};
use healthwatch::hub::{DeliveryError, EventSink};

/// Sink that keeps every message it receives, parsed as JSON.
#[derive(Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<Value>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }

    /// The `type` field of every message, in arrival order.
    pub fn types(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| m["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn of_type(&self, kind: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|m| m["type"] == kind)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn deliver(&self, message: Arc<str>) -> BoxFuture<'_, Result<(), DeliveryError>> {
        let parsed: Value = serde_json::from_str(&message).unwrap();
        self.messages.lock().unwrap().push(parsed);
        Box::pin(async { Ok(()) })
    }
}

/// Sink that accepts its initial snapshot and fails every delivery after.
#[derive(Default)]
pub struct FailingSink {
    pub attempts: AtomicUsize,
    accept_first: usize,
}

impl FailingSink {
    pub fn after(accept_first: usize) -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            accept_first,
        }
    }
}

impl EventSink for FailingSink {
    fn deliver(&self, _message: Arc<str>) -> BoxFuture<'_, Result<(), DeliveryError>> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        let accept = n < self.accept_first;
        Box::pin(async move {
            if accept {
                Ok(())
            } else {
                Err(DeliveryError::Closed)
            }
        })
    }
}

/// A check that reports `status` after `delay`.
pub fn probe_after(delay: Duration, status: HealthStatus) -> Arc<dyn HealthCheck> {
    Arc::new(move || async move {
        tokio::time::sleep(delay).await;
        Ok::<_, ProbeError>(ProbeReport::new(status, "scripted"))
    })
}

/// A check that walks through `statuses`, repeating the last one.
pub fn scripted_probe(statuses: Vec<HealthStatus>) -> Arc<dyn HealthCheck> {
    let calls = Arc::new(AtomicUsize::new(0));
    Arc::new(move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let status = statuses
            .get(n)
            .or_else(|| statuses.last())
            .copied()
            .unwrap_or(HealthStatus::Healthy);
        async move { Ok::<_, ProbeError>(ProbeReport::new(status, format!("call {}", n))) }
    })
}

pub fn aggregate(checks: &[(&str, HealthStatus)]) -> AggregateHealth {
    let checks = checks
        .iter()
        .map(|(name, status)| ComponentHealth {
            name: name.to_string(),
            status: *status,
            message: String::new(),
            response_time_ms: 1.0,
            timestamp: Utc::now(),
            details: Map::new(),
        })
        .collect();
    AggregateHealth::from_checks(checks, Utc::now(), 1.0)
}

/// Executor that records calls, tracks concurrency and can be slowed down.
pub struct RecordingExecutor {
    pub calls: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    delay: Duration,
    succeed: bool,
}

impl RecordingExecutor {
    pub fn new(delay: Duration, succeed: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
            succeed,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, name: String) -> BoxFuture<'_, bool> {
        self.calls.lock().unwrap().push(name);
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.succeed
        })
    }
}

impl FailoverExecutor for RecordingExecutor {
    fn switch_traffic(&self, target: Slot) -> BoxFuture<'_, bool> {
        self.call(format!("switch:{}", target))
    }

    fn replica_ready<'a>(&'a self, replica: &'a str) -> BoxFuture<'a, bool> {
        self.call(format!("ready:{}", replica))
    }

    fn promote_replica<'a>(&'a self, target: &'a str) -> BoxFuture<'a, bool> {
        self.call(format!("promote:{}", target))
    }

    fn scale_slot(&self, slot: Slot, replicas: u32) -> BoxFuture<'_, bool> {
        self.call(format!("scale:{}:{}", slot, replicas))
    }
}
