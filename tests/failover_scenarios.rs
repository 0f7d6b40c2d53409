//! Failover decision scenarios against scripted probes and executors.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use healthwatch::alerting::AlertEvaluator;
use healthwatch::failover::{
    ActionOutcome, Decision, FailoverMachine, FailoverPhase, FailoverSettings, Slot, Topology,
};
use healthwatch::health::{HealthAggregator, HealthStatus};
use healthwatch::hub::SubscriptionHub;
use healthwatch::lifecycle::monitor::MANUAL_INTERVENTION_ALERT;
use healthwatch::lifecycle::Monitor;

mod common;

use common::{aggregate, probe_after, scripted_probe, RecordingExecutor, RecordingSink};

fn settings(threshold: u32) -> FailoverSettings {
    FailoverSettings::new(threshold, vec!["api".into()], vec!["db".into()])
}

/// Register a healthy data layer so only the serving layer can fail.
fn register_healthy_db(aggregator: &HealthAggregator) {
    aggregator.register_probe(
        "db",
        Duration::from_secs(1),
        probe_after(Duration::ZERO, HealthStatus::Healthy),
    );
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[test]
fn test_three_unhealthy_cycles_trigger_one_switch() {
    let executor = Arc::new(RecordingExecutor::new(Duration::ZERO, true));
    let verifier = Arc::new(HealthAggregator::new());
    let machine = FailoverMachine::new(settings(3), Topology::default(), executor, verifier);

    let down = aggregate(&[("api", HealthStatus::Unhealthy), ("db", HealthStatus::Healthy)]);
    let up = aggregate(&[("api", HealthStatus::Healthy), ("db", HealthStatus::Healthy)]);

    // Two failures, a recovery, then two more: never reaches three in a row.
    assert_eq!(machine.observe(&down), Decision::Counting { consecutive: 1 });
    assert_eq!(machine.observe(&down), Decision::Counting { consecutive: 2 });
    assert_eq!(machine.observe(&up), Decision::Healthy);
    assert_eq!(machine.observe(&down), Decision::Counting { consecutive: 1 });
    assert_eq!(machine.observe(&down), Decision::Counting { consecutive: 2 });

    match machine.observe(&down) {
        Decision::Act { plan } => assert_eq!(plan.summary(), "switch traffic from blue to green"),
        other => panic!("expected a plan, got {:?}", other),
    }
    assert!(machine.state().failover_in_progress);
}

#[tokio::test]
async fn test_switch_verified_by_fresh_health_run() {
    let verifier = Arc::new(HealthAggregator::new());
    verifier.register_probe(
        "api",
        Duration::from_secs(1),
        scripted_probe(vec![
            HealthStatus::Unhealthy,
            HealthStatus::Unhealthy,
            HealthStatus::Healthy,
        ]),
    );
    register_healthy_db(&verifier);
    let executor = Arc::new(RecordingExecutor::new(Duration::ZERO, true));
    let machine = FailoverMachine::new(
        settings(2),
        Topology::default(),
        executor.clone(),
        verifier.clone(),
    );

    assert!(matches!(
        machine.observe(&verifier.check_all().await),
        Decision::Counting { consecutive: 1 }
    ));
    let Decision::Act { plan } = machine.observe(&verifier.check_all().await) else {
        panic!("expected a plan");
    };

    let report = machine.execute(plan).await;

    assert_eq!(report.outcome, ActionOutcome::Succeeded);
    assert_eq!(executor.calls(), vec!["scale:green:3", "switch:green"]);
    let state = machine.state();
    assert_eq!(state.topology.active_slot, Slot::Green);
    assert_eq!(state.phase, FailoverPhase::Normal);
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test]
async fn test_switch_rolled_back_when_serving_checks_stay_down() {
    let verifier = Arc::new(HealthAggregator::new());
    verifier.register_probe(
        "api",
        Duration::from_secs(1),
        probe_after(Duration::ZERO, HealthStatus::Unhealthy),
    );
    register_healthy_db(&verifier);
    let executor = Arc::new(RecordingExecutor::new(Duration::ZERO, true));
    let machine = FailoverMachine::new(
        settings(1),
        Topology::default(),
        executor.clone(),
        verifier.clone(),
    );

    let Decision::Act { plan } = machine.observe(&verifier.check_all().await) else {
        panic!("expected a plan");
    };
    let report = machine.execute(plan).await;

    assert!(matches!(report.outcome, ActionOutcome::RolledBack { .. }));
    assert_eq!(executor.calls(), vec!["scale:green:3", "switch:green", "switch:blue"]);
    assert_eq!(machine.state().topology.active_slot, Slot::Blue);
}

#[tokio::test]
async fn test_unready_replica_aborts_without_changes() {
    let executor = Arc::new(RecordingExecutor::new(Duration::ZERO, false));
    let machine = FailoverMachine::new(
        settings(1),
        Topology::default(),
        executor.clone(),
        Arc::new(HealthAggregator::new()),
    );

    let down = aggregate(&[("api", HealthStatus::Healthy), ("db", HealthStatus::Unhealthy)]);
    let Decision::Act { plan } = machine.observe(&down) else {
        panic!("expected a plan");
    };
    let report = machine.execute(plan).await;

    assert!(matches!(report.outcome, ActionOutcome::Aborted { .. }));
    assert_eq!(executor.calls(), vec!["ready:replica"]);
    let topology = machine.state().topology;
    assert_eq!(topology.data_primary, "primary");
    assert_eq!(topology.data_replica, "replica");
}

#[tokio::test]
async fn test_monitor_runs_one_action_at_a_time() {
    let aggregator = Arc::new(HealthAggregator::new());
    aggregator.register_probe(
        "api",
        Duration::from_secs(1),
        probe_after(Duration::ZERO, HealthStatus::Unhealthy),
    );
    register_healthy_db(&aggregator);
    let hub = Arc::new(SubscriptionHub::new(Duration::from_secs(1)));
    let sink = RecordingSink::new();
    hub.subscribe(Arc::new(sink.clone())).await.unwrap();

    let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(100), true));
    let machine = Arc::new(FailoverMachine::new(
        settings(2),
        Topology::default(),
        executor.clone(),
        aggregator.clone(),
    ));

    let mut monitor = Monitor::new(Arc::clone(&aggregator), Arc::clone(&hub), AlertEvaluator::new())
        .with_failover(Arc::clone(&machine));

    let mut decisions = Vec::new();
    for _ in 0..4 {
        decisions.push(monitor.guarded_tick().await.unwrap().decision.unwrap());
    }

    assert_eq!(decisions[0], Decision::Counting { consecutive: 1 });
    assert!(matches!(decisions[1], Decision::Act { .. }));
    assert_eq!(decisions[2], Decision::Suppressed);
    assert_eq!(decisions[3], Decision::Suppressed);

    wait_until(|| !sink.of_type("failover_update").is_empty()).await;

    assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(
        executor.calls().iter().filter(|c| c.starts_with("scale")).count(),
        1
    );
    let updates = sink.of_type("failover_update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["action"], "traffic_switch");
    assert_eq!(updates[0]["outcome"], "rolled_back");
    assert_eq!(machine.state().phase, FailoverPhase::Normal);
}

#[tokio::test]
async fn test_monitor_escalates_when_both_layers_fail() {
    let aggregator = Arc::new(HealthAggregator::new());
    for name in ["api", "db"] {
        aggregator.register_probe(
            name,
            Duration::from_secs(1),
            probe_after(Duration::ZERO, HealthStatus::Unhealthy),
        );
    }
    let hub = Arc::new(SubscriptionHub::new(Duration::from_secs(1)));
    let sink = RecordingSink::new();
    hub.subscribe(Arc::new(sink.clone())).await.unwrap();

    let executor = Arc::new(RecordingExecutor::new(Duration::ZERO, true));
    let machine = Arc::new(FailoverMachine::new(
        settings(1),
        Topology::default(),
        executor.clone(),
        aggregator.clone(),
    ));
    let mut monitor = Monitor::new(Arc::clone(&aggregator), Arc::clone(&hub), AlertEvaluator::new())
        .with_failover(Arc::clone(&machine));

    let first = monitor.guarded_tick().await.unwrap();
    let second = monitor.guarded_tick().await.unwrap();

    assert!(matches!(
        first.decision,
        Some(Decision::ManualInterventionRequired { .. })
    ));
    assert_eq!(second.decision, Some(Decision::AwaitingReset));

    let alerts = sink.of_type("alert_fired");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["rule_name"], MANUAL_INTERVENTION_ALERT);
    assert_eq!(alerts[0]["severity"], "critical");
    assert!(executor.calls().is_empty());

    assert!(machine.reset());
    assert_eq!(machine.state().phase, FailoverPhase::Normal);
}

#[tokio::test]
async fn test_reset_clears_the_escalation_alert() {
    let aggregator = Arc::new(HealthAggregator::new());
    aggregator.register_probe(
        "api",
        Duration::from_secs(1),
        scripted_probe(vec![
            HealthStatus::Unhealthy,
            HealthStatus::Unhealthy,
            HealthStatus::Healthy,
        ]),
    );
    aggregator.register_probe(
        "db",
        Duration::from_secs(1),
        scripted_probe(vec![
            HealthStatus::Unhealthy,
            HealthStatus::Unhealthy,
            HealthStatus::Healthy,
        ]),
    );
    let hub = Arc::new(SubscriptionHub::new(Duration::from_secs(1)));
    let sink = RecordingSink::new();
    hub.subscribe(Arc::new(sink.clone())).await.unwrap();

    let executor = Arc::new(RecordingExecutor::new(Duration::ZERO, true));
    let machine = Arc::new(FailoverMachine::new(
        settings(1),
        Topology::default(),
        executor.clone(),
        aggregator.clone(),
    ));
    let mut monitor = Monitor::new(Arc::clone(&aggregator), Arc::clone(&hub), AlertEvaluator::new())
        .with_failover(Arc::clone(&machine));

    monitor.guarded_tick().await.unwrap();
    monitor.guarded_tick().await.unwrap();
    assert_eq!(sink.of_type("alert_fired").len(), 1);
    assert!(sink.of_type("alert_cleared").is_empty());

    assert!(machine.reset());
    let after = monitor.guarded_tick().await.unwrap();
    assert_eq!(after.decision, Some(Decision::Healthy));

    let cleared = sink.of_type("alert_cleared");
    assert_eq!(cleared.len(), 1);
    assert_eq!(cleared[0]["rule_name"], MANUAL_INTERVENTION_ALERT);
    assert_eq!(cleared[0]["severity"], "critical");

    // Only cleared once.
    monitor.guarded_tick().await.unwrap();
    assert_eq!(sink.of_type("alert_cleared").len(), 1);
    assert!(executor.calls().is_empty());
}
