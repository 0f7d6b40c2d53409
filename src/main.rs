//! healthwatch daemon and one-shot CLI.
//!
//! ```text
//! healthwatch --config healthwatch.toml run                 # monitor until SIGINT/SIGTERM
//! healthwatch --config healthwatch.toml check [--probe db]  # probe once, print JSON
//! healthwatch --config healthwatch.toml validate            # report every config error
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use healthwatch::alerting::{AlertEvaluator, AlertRule};
use healthwatch::config::{load_config, ConfigError, HealthwatchConfig};
use healthwatch::config::watcher::ConfigWatcher;
use healthwatch::failover::{DryRunExecutor, FailoverMachine};
use healthwatch::health::{probes, HealthAggregator, HealthStatus};
use healthwatch::hub::{LogSink, SubscriptionHub};
use healthwatch::lifecycle::{signals, Monitor, Shutdown};
use healthwatch::observability::{logging, metrics};
use healthwatch::sampling::{HealthDerivedSource, SystemSource};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "healthwatch", version)]
#[command(about = "Health aggregation, alerting and failover decisions", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "healthwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loop until interrupted
    Run,
    /// Run the configured probes once and print the result as JSON
    Check {
        /// Only run the named probe
        #[arg(long)]
        probe: Option<String>,
    },
    /// Validate the configuration file and report every problem
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate => validate(&cli.config),
        Commands::Check { probe } => check(&cli.config, probe.as_deref()).await,
        Commands::Run => run(&cli.config).await,
    }
}

fn validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match load_config(path) {
        Ok(config) => {
            println!(
                "Configuration is valid: {} probes, {} alert rules",
                config.probes.len(),
                config.alert_rules.len()
            );
            Ok(())
        }
        Err(ConfigError::Validation(errors)) => {
            for error in &errors {
                eprintln!("  - {}", error);
            }
            eprintln!("{} validation error(s) in {}", errors.len(), path.display());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

async fn check(path: &Path, probe: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    let aggregator = build_aggregator(&config);

    let failing = match probe {
        Some(name) => {
            let Some(result) = aggregator.check_one(name).await else {
                eprintln!("No probe named '{}'", name);
                std::process::exit(2);
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
            result.status.is_failing()
        }
        None => {
            let result = aggregator.check_all().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            result.status == HealthStatus::Unhealthy
        }
    };

    if failing {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    logging::init_logging(&config.observability);

    tracing::info!("healthwatch v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %path.display(),
        probes = config.probes.len(),
        alert_rules = config.alert_rules.len(),
        interval_secs = config.monitor.interval_secs,
        failover = config.failover.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let aggregator = Arc::new(build_aggregator(&config));
    let hub = Arc::new(SubscriptionHub::from_config(&config.hub));
    hub.subscribe(Arc::new(LogSink)).await?;

    let rules = config
        .alert_rules
        .iter()
        .map(AlertRule::from_config)
        .collect::<Result<Vec<_>, _>>()?;
    let evaluator = AlertEvaluator::with_rules(rules)?;

    let mut monitor = Monitor::new(Arc::clone(&aggregator), Arc::clone(&hub), evaluator)
        .with_config(&config.monitor)
        .with_source(Box::new(HealthDerivedSource::new(Arc::clone(&aggregator))));

    if config.monitor.system_metrics {
        let system = SystemSource::new();
        if system.is_supported() {
            monitor = monitor.with_source(Box::new(system));
        } else {
            tracing::warn!("System metrics unavailable on this platform");
        }
    }

    if config.failover.enabled {
        let machine = FailoverMachine::from_config(
            &config.failover,
            Arc::new(DryRunExecutor),
            aggregator.clone(),
        )?;
        tracing::warn!(
            threshold = config.failover.threshold,
            "Failover enabled with the dry-run executor; actions are logged, not performed"
        );
        monitor = monitor.with_failover(Arc::new(machine));
    }

    let (watcher, updates) = ConfigWatcher::new(path);
    let _watch_handle = match watcher.run() {
        Ok(handle) => {
            monitor = monitor.with_config_updates(updates);
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            None
        }
    };

    let shutdown = Shutdown::new();
    let monitor_task = tokio::spawn(monitor.run(shutdown.subscribe()));

    signals::shutdown_signal().await;
    shutdown.trigger();

    match tokio::time::timeout(SHUTDOWN_GRACE, monitor_task).await {
        Ok(Ok(())) => tracing::info!("Shutdown complete"),
        Ok(Err(e)) => tracing::error!(error = %e, "Monitor task failed"),
        Err(_) => tracing::warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Monitor did not stop in time, exiting anyway"
        ),
    }
    Ok(())
}

fn build_aggregator(config: &HealthwatchConfig) -> HealthAggregator {
    let aggregator = HealthAggregator::new();
    for probe in &config.probes {
        aggregator.register(probes::from_config(probe));
    }
    aggregator
}
