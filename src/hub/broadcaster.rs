//! Subscriber registry and fan-out.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerting::{ActiveAlert, AlertEvent};
use crate::config::HubConfig;
use crate::health::types::AggregateHealth;
use crate::hub::message::{ActiveAlertSummary, ActiveAlertsView, HubMessage};
use crate::hub::sink::{DeliveryError, EventSink};
use crate::observability::metrics;
use crate::resilience::{with_deadline, DeadlineError};

/// Opaque handle returned by [`SubscriptionHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Subscribers removed because delivery failed or timed out.
    pub pruned: Vec<SubscriberId>,
}

/// Pushes health updates and alert transitions to live subscribers.
///
/// Publishes are serialized so every subscriber observes messages in
/// publish order. Within a publish, deliveries run concurrently, each
/// bounded by the send timeout; a subscriber whose delivery fails is
/// removed before `publish` returns and is never attempted again.
pub struct SubscriptionHub {
    subscribers: DashMap<SubscriberId, Arc<dyn EventSink>>,
    publish_lock: Mutex<()>,
    send_timeout: Duration,
    latest_health: ArcSwapOption<AggregateHealth>,
    active_alerts: ArcSwap<Vec<ActiveAlertSummary>>,
}

impl SubscriptionHub {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: DashMap::new(),
            publish_lock: Mutex::new(()),
            send_timeout,
            latest_health: ArcSwapOption::empty(),
            active_alerts: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn from_config(config: &HubConfig) -> Self {
        Self::new(Duration::from_millis(config.send_timeout_ms))
    }

    /// Register a sink.
    ///
    /// The sink first receives the latest health update (if any) and the
    /// current active alerts. If that initial delivery fails the sink is
    /// not registered.
    pub async fn subscribe(&self, sink: Arc<dyn EventSink>) -> Result<SubscriberId, DeliveryError> {
        let _guard = self.publish_lock.lock().await;

        for message in self.initial_messages() {
            let payload = match message.to_json() {
                Ok(p) => p,
                Err(e) => {
                    error!(kind = message.kind(), error = %e, "Failed to serialize hub message");
                    continue;
                }
            };
            self.deliver(sink.as_ref(), payload).await?;
        }

        let id = SubscriberId::new();
        self.subscribers.insert(id, sink);
        metrics::record_hub_subscribers(self.subscribers.len());
        info!(subscriber = %id, total = self.subscribers.len(), "Subscriber connected");
        Ok(id)
    }

    /// Remove a subscriber. Unknown or already-removed ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            metrics::record_hub_subscribers(self.subscribers.len());
            info!(subscriber = %id, "Subscriber disconnected");
        }
        removed
    }

    pub async fn publish(&self, message: &HubMessage) -> PublishReport {
        let _guard = self.publish_lock.lock().await;
        self.fan_out(message).await
    }

    /// Cache `health` for new subscribers and publish it.
    pub async fn publish_health(&self, health: &AggregateHealth) -> PublishReport {
        let _guard = self.publish_lock.lock().await;
        self.latest_health.store(Some(Arc::new(health.clone())));
        self.fan_out(&HubMessage::from(health)).await
    }

    pub async fn publish_alert(&self, event: &AlertEvent) -> PublishReport {
        self.publish(&HubMessage::from(event)).await
    }

    /// Replace the active-alert view sent to new subscribers.
    pub fn set_active_alerts(&self, alerts: &[ActiveAlert]) {
        let view: Vec<ActiveAlertSummary> = alerts.iter().map(ActiveAlertSummary::from).collect();
        self.active_alerts.store(Arc::new(view));
    }

    pub fn active_alerts(&self) -> Arc<Vec<ActiveAlertSummary>> {
        self.active_alerts.load_full()
    }

    pub fn latest_health(&self) -> Option<Arc<AggregateHealth>> {
        self.latest_health.load_full()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn initial_messages(&self) -> Vec<HubMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(health) = self.latest_health.load_full() {
            messages.push(HubMessage::from(health.as_ref()));
        }
        messages.push(HubMessage::ActiveAlerts(ActiveAlertsView {
            timestamp: Utc::now(),
            alerts: self.active_alerts.load().as_ref().clone(),
        }));
        messages
    }

    /// Deliver to every current subscriber. Caller holds `publish_lock`.
    async fn fan_out(&self, message: &HubMessage) -> PublishReport {
        let payload = match message.to_json() {
            Ok(p) => p,
            Err(e) => {
                error!(kind = message.kind(), error = %e, "Failed to serialize hub message");
                return PublishReport::default();
            }
        };

        let targets: Vec<(SubscriberId, Arc<dyn EventSink>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let results = join_all(targets.iter().map(|(id, sink)| {
            let payload = Arc::clone(&payload);
            async move { (*id, self.deliver(sink.as_ref(), payload).await) }
        }))
        .await;

        let mut report = PublishReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    self.subscribers.remove(&id);
                    metrics::record_delivery_failure();
                    warn!(
                        subscriber = %id,
                        kind = message.kind(),
                        error = %e,
                        "Delivery failed, removing subscriber"
                    );
                    report.pruned.push(id);
                }
            }
        }

        if !report.pruned.is_empty() {
            metrics::record_hub_subscribers(self.subscribers.len());
        }
        debug!(
            kind = message.kind(),
            delivered = report.delivered,
            pruned = report.pruned.len(),
            "Published"
        );
        report
    }

    async fn deliver(&self, sink: &dyn EventSink, payload: Arc<str>) -> Result<(), DeliveryError> {
        with_deadline(self.send_timeout, sink.deliver(payload))
            .await
            .map_err(|e| match e {
                DeadlineError::Elapsed(d) => DeliveryError::Timeout(d),
                DeadlineError::Inner(e) => e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::sink::ChannelSink;
    use futures_util::future::BoxFuture;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RejectingSink {
        attempts: AtomicUsize,
    }

    impl EventSink for RejectingSink {
        fn deliver(&self, _message: Arc<str>) -> BoxFuture<'_, Result<(), DeliveryError>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(DeliveryError::Rejected("socket reset".into())) })
        }
    }

    /// Accepts the first `accept` deliveries, then stalls forever.
    struct StallingSink {
        accept: usize,
        seen: AtomicUsize,
    }

    impl EventSink for StallingSink {
        fn deliver(&self, _message: Arc<str>) -> BoxFuture<'_, Result<(), DeliveryError>> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst);
            let accept = self.accept;
            Box::pin(async move {
                if n >= accept {
                    std::future::pending::<()>().await;
                }
                Ok(())
            })
        }
    }

    fn json(payload: &str) -> Value {
        serde_json::from_str(payload).unwrap()
    }

    fn notice(i: usize) -> HubMessage {
        HubMessage::critical_alert(&format!("rule_{}", i), "test")
    }

    #[tokio::test]
    async fn test_subscribe_receives_current_state() {
        let hub = SubscriptionHub::new(Duration::from_secs(1));
        let health = AggregateHealth::from_checks(Vec::new(), Utc::now(), 0.0);
        hub.publish_health(&health).await;

        let (sink, mut rx) = ChannelSink::new(8);
        hub.subscribe(Arc::new(sink)).await.unwrap();

        assert_eq!(json(&rx.recv().await.unwrap())["type"], "health_update");
        let alerts = json(&rx.recv().await.unwrap());
        assert_eq!(alerts["type"], "active_alerts");
        assert!(alerts["alerts"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_initial_delivery_is_not_registered() {
        let hub = SubscriptionHub::new(Duration::from_secs(1));
        let rejecting = Arc::new(RejectingSink { attempts: AtomicUsize::new(0) });

        let result = hub.subscribe(rejecting.clone()).await;
        assert!(matches!(result, Err(DeliveryError::Rejected(_))));
        assert_eq!(rejecting.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_subscriber_is_pruned_and_never_retried() {
        // Accepts the initial active_alerts message, then stalls.
        let flaky = Arc::new(StallingSink { accept: 1, seen: AtomicUsize::new(0) });

        let hub = SubscriptionHub::new(Duration::from_millis(20));
        let (good, mut rx) = ChannelSink::new(16);
        hub.subscribe(Arc::new(good)).await.unwrap();
        let _ = rx.recv().await;
        let flaky_id = hub.subscribe(flaky.clone()).await.unwrap();
        assert_eq!(hub.subscriber_count(), 2);

        let report = hub.publish(&notice(1)).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec![flaky_id]);
        assert_eq!(hub.subscriber_count(), 1);

        let report = hub.publish(&notice(2)).await;
        assert_eq!(report.delivered, 1);
        assert!(report.pruned.is_empty());
        assert_eq!(flaky.seen.load(Ordering::SeqCst), 2);

        assert_eq!(json(&rx.recv().await.unwrap())["rule_name"], "rule_1");
        assert_eq!(json(&rx.recv().await.unwrap())["rule_name"], "rule_2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_does_not_stall_others() {
        let hub = SubscriptionHub::new(Duration::from_millis(100));
        let (fast, mut rx) = ChannelSink::new(16);
        hub.subscribe(Arc::new(fast)).await.unwrap();
        hub.subscribe(Arc::new(StallingSink { accept: 1, seen: AtomicUsize::new(0) }))
            .await
            .unwrap();
        let _ = rx.recv().await;

        let started = tokio::time::Instant::now();
        let report = hub.publish(&notice(1)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned.len(), 1);
        assert_eq!(json(&rx.recv().await.unwrap())["rule_name"], "rule_1");
    }

    #[tokio::test]
    async fn test_concurrent_publishes_arrive_in_the_same_order_everywhere() {
        let hub = Arc::new(SubscriptionHub::new(Duration::from_secs(1)));
        let (a, mut rx_a) = ChannelSink::new(64);
        let (b, mut rx_b) = ChannelSink::new(64);
        hub.subscribe(Arc::new(a)).await.unwrap();
        hub.subscribe(Arc::new(b)).await.unwrap();
        let _ = rx_a.recv().await;
        let _ = rx_b.recv().await;

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move { hub.publish(&notice(i)).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().delivered, 2);
        }

        let mut seen_a = Vec::new();
        let mut seen_b = Vec::new();
        for _ in 0..20 {
            seen_a.push(json(&rx_a.recv().await.unwrap())["rule_name"].clone());
            seen_b.push(json(&rx_b.recv().await.unwrap())["rule_name"].clone());
        }
        assert_eq!(seen_a, seen_b);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let hub = SubscriptionHub::new(Duration::from_secs(1));
        let (sink, _rx) = ChannelSink::new(8);
        let id = hub.subscribe(Arc::new(sink)).await.unwrap();

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.publish(&notice(0)).await, PublishReport::default());
    }

    #[tokio::test]
    async fn test_closed_channel_is_pruned() {
        let hub = SubscriptionHub::new(Duration::from_secs(1));
        let (sink, rx) = ChannelSink::new(8);
        let id = hub.subscribe(Arc::new(sink)).await.unwrap();
        drop(rx);

        let report = hub.publish(&notice(0)).await;
        assert_eq!(report.pruned, vec![id]);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
