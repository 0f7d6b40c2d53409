//! Hot reload of the configuration file.
//!
//! Raw filesystem events are coalesced: after the first event of a burst
//! the watcher waits out the debounce window, then reloads once. A reload
//! is forwarded only when the file text changed since the last accepted
//! config and the new config passes validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::HealthwatchConfig;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<HealthwatchConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver that accepted configs arrive on.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<HealthwatchConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
            update_tx,
        };
        (watcher, update_rx)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a Tokio runtime.
    ///
    /// Reloads stop once the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        info!(
            path = ?self.path,
            debounce_ms = self.debounce.as_millis() as u64,
            "Config watcher started"
        );
        let accepted = std::fs::read_to_string(&self.path).ok();
        tokio::spawn(reload_loop(
            self.path,
            self.debounce,
            accepted,
            event_rx,
            self.update_tx,
        ));
        Ok(watcher)
    }
}

async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut accepted: Option<String>,
    mut events: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<HealthwatchConfig>,
) {
    while events.recv().await.is_some() {
        tokio::time::sleep(debounce).await;
        while events.try_recv().is_ok() {}

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                error!(path = ?path, error = %e, "Config file unreadable, keeping current config");
                continue;
            }
        };
        if accepted.as_deref() == Some(text.as_str()) {
            debug!(path = ?path, "Config file touched without changes");
            continue;
        }

        match parse_config(&text) {
            Ok(config) => {
                info!(path = ?path, "Config reloaded");
                accepted = Some(text);
                if updates.send(config).is_err() {
                    break;
                }
            }
            Err(ConfigError::Validation(problems)) => {
                for problem in &problems {
                    warn!(
                        field = %problem.field,
                        problem = %problem.message,
                        "Rejected config value"
                    );
                }
                error!(
                    path = ?path,
                    problems = problems.len(),
                    "Reloaded config failed validation, keeping current config"
                );
            }
            Err(e) => {
                error!(path = ?path, error = %e, "Failed to reload config, keeping current config")
            }
        }
    }
    debug!(path = ?path, "Config watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_update(
        updates: &mut mpsc::UnboundedReceiver<HealthwatchConfig>,
        within: Duration,
    ) -> Option<HealthwatchConfig> {
        tokio::time::timeout(within, updates.recv()).await.ok().flatten()
    }

    fn start(path: &Path) -> (RecommendedWatcher, mpsc::UnboundedReceiver<HealthwatchConfig>) {
        let (watcher, updates) = ConfigWatcher::new(path);
        let handle = watcher.with_debounce(Duration::from_millis(50)).run().unwrap();
        (handle, updates)
    }

    #[tokio::test]
    async fn test_edit_delivers_one_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healthwatch.toml");
        std::fs::write(&path, "[monitor]\ninterval_secs = 10\n").unwrap();
        let (_handle, mut updates) = start(&path);

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, "[monitor]\ninterval_secs = 3\n").unwrap();

        let config = next_update(&mut updates, Duration::from_secs(5))
            .await
            .expect("reload should arrive");
        assert_eq!(config.monitor.interval_secs, 3);
        assert!(next_update(&mut updates, Duration::from_millis(500)).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_edit_is_skipped_until_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healthwatch.toml");
        std::fs::write(&path, "[monitor]\ninterval_secs = 10\n").unwrap();
        let (_handle, mut updates) = start(&path);

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, "[monitor]\ninterval_secs = 0\n").unwrap();
        assert!(next_update(&mut updates, Duration::from_millis(500)).await.is_none());

        std::fs::write(&path, "[monitor]\ninterval_secs = 7\n").unwrap();
        let config = next_update(&mut updates, Duration::from_secs(5))
            .await
            .expect("fixed config should arrive");
        assert_eq!(config.monitor.interval_secs, 7);
    }

    #[tokio::test]
    async fn test_rewrite_with_same_text_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healthwatch.toml");
        let text = "[monitor]\ninterval_secs = 10\n";
        std::fs::write(&path, text).unwrap();
        let (_handle, mut updates) = start(&path);

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, text).unwrap();

        assert!(next_update(&mut updates, Duration::from_millis(500)).await.is_none());
    }
}
