//! OS resource sampling from `/proc`.
//!
//! # Metrics
//! - `cpu_percent`: busy share of CPU time since the previous sample
//!   (since boot on the first sample)
//! - `memory_percent`: `1 - MemAvailable / MemTotal`, as a percentage
//! - `load_average_1m`: first field of `/proc/loadavg`
//!
//! On platforms without `/proc` every sample fails with `Unavailable`.

use std::path::PathBuf;
use std::sync::Mutex;

use futures_util::future::BoxFuture;

use crate::sampling::source::{MetricSnapshot, MetricSource, SampleError};

/// Cumulative CPU jiffies: `(total, idle)`.
type CpuTimes = (u64, u64);

pub struct SystemSource {
    proc_root: PathBuf,
    previous_cpu: Mutex<Option<CpuTimes>>,
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSource {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Read from an alternate procfs mount.
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
            previous_cpu: Mutex::new(None),
        }
    }

    /// Whether this host exposes the files we read.
    pub fn is_supported(&self) -> bool {
        self.proc_root.join("stat").exists()
    }

    async fn collect(&self) -> Result<MetricSnapshot, SampleError> {
        if !self.is_supported() {
            return Err(SampleError::Unavailable(format!(
                "{} not found",
                self.proc_root.join("stat").display()
            )));
        }

        let stat = tokio::fs::read_to_string(self.proc_root.join("stat")).await?;
        let meminfo = tokio::fs::read_to_string(self.proc_root.join("meminfo")).await?;
        let loadavg = tokio::fs::read_to_string(self.proc_root.join("loadavg")).await?;

        let current = parse_cpu_times(&stat)?;
        let previous = {
            let mut guard = self.previous_cpu.lock().expect("cpu sample lock poisoned");
            guard.replace(current)
        };

        let mut snapshot = MetricSnapshot::new();
        snapshot.insert("cpu_percent".into(), cpu_percent(previous, current));
        snapshot.insert("memory_percent".into(), parse_memory_percent(&meminfo)?);
        snapshot.insert("load_average_1m".into(), parse_load_average(&loadavg)?);
        Ok(snapshot)
    }
}

impl MetricSource for SystemSource {
    fn name(&self) -> &str {
        "system"
    }

    fn sample(&self) -> BoxFuture<'_, Result<MetricSnapshot, SampleError>> {
        Box::pin(self.collect())
    }
}

fn parse_cpu_times(stat: &str) -> Result<CpuTimes, SampleError> {
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SampleError::Parse("no aggregate cpu line in stat".into()))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| {
            f.parse::<u64>()
                .map_err(|e| SampleError::Parse(format!("cpu field '{}': {}", f, e)))
        })
        .collect::<Result<_, _>>()?;

    if fields.len() < 4 {
        return Err(SampleError::Parse("cpu line has too few fields".into()));
    }

    // user nice system idle iowait irq softirq steal; guest time is already
    // included in user/nice.
    let total: u64 = fields.iter().take(8).sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Ok((total, idle))
}

fn cpu_percent(previous: Option<CpuTimes>, current: CpuTimes) -> f64 {
    let (total, idle) = match previous {
        Some((prev_total, prev_idle)) => (
            current.0.saturating_sub(prev_total),
            current.1.saturating_sub(prev_idle),
        ),
        None => current,
    };
    if total == 0 {
        return 0.0;
    }
    (total.saturating_sub(idle) as f64 / total as f64) * 100.0
}

fn parse_memory_percent(meminfo: &str) -> Result<f64, SampleError> {
    let field = |name: &str| -> Result<f64, SampleError> {
        meminfo
            .lines()
            .find_map(|l| l.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| SampleError::Parse(format!("{} missing from meminfo", name)))
    };

    let total = field("MemTotal")?;
    let available = field("MemAvailable")?;
    if total <= 0.0 {
        return Err(SampleError::Parse("MemTotal is zero".into()));
    }
    Ok((1.0 - available / total) * 100.0)
}

fn parse_load_average(loadavg: &str) -> Result<f64, SampleError> {
    loadavg
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| SampleError::Parse("malformed loadavg".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 50 0 50 350 50 0 0 0 0 0\n";
    const MEMINFO: &str = concat!(
        "MemTotal:       16000000 kB\n",
        "MemFree:         2000000 kB\n",
        "MemAvailable:    4000000 kB\n",
    );

    #[test]
    fn test_parse_cpu_and_delta() {
        let first = parse_cpu_times(STAT).unwrap();
        assert_eq!(first, (1000, 800));
        assert!((cpu_percent(None, first) - 20.0).abs() < 1e-9);

        let second = (1100, 850);
        assert!((cpu_percent(Some(first), second) - 50.0).abs() < 1e-9);
        assert_eq!(cpu_percent(Some(second), second), 0.0);
    }

    #[test]
    fn test_parse_memory_and_load() {
        assert!((parse_memory_percent(MEMINFO).unwrap() - 75.0).abs() < 1e-9);
        assert_eq!(parse_load_average("0.52 0.58 0.59 1/467 12345\n").unwrap(), 0.52);
        assert!(parse_memory_percent("MemTotal: 1 kB\n").is_err());
    }

    #[tokio::test]
    async fn test_sample_from_fake_proc() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stat"), STAT).unwrap();
        std::fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();
        std::fs::write(dir.path().join("loadavg"), "1.50 1.00 0.50 2/100 1\n").unwrap();

        let source = SystemSource::with_proc_root(dir.path());
        let snapshot = source.sample().await.unwrap();

        assert!((snapshot["cpu_percent"] - 20.0).abs() < 1e-9);
        assert!((snapshot["memory_percent"] - 75.0).abs() < 1e-9);
        assert_eq!(snapshot["load_average_1m"], 1.5);
    }

    #[tokio::test]
    async fn test_missing_proc_is_unavailable() {
        let source = SystemSource::with_proc_root("/nonexistent/proc");
        assert!(!source.is_supported());
        assert!(matches!(source.sample().await, Err(SampleError::Unavailable(_))));
    }
}
