//! Built-in network probes.
//!
//! # Responsibilities
//! - TCP reachability checks for data stores and caches
//! - HTTP status checks for model runtimes and remote APIs
//! - Build probes from [`ProbeConfig`] entries
//!
//! # Design Decisions
//! - Probes never enforce their own overall deadline; the runner does
//! - A successful but slow check is reported Degraded, not Unhealthy
//! - 4xx/5xx from an HTTP target is Unhealthy with the status code in details

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::config::{ProbeConfig, ProbeKind};
use crate::health::probe::{HealthCheck, Probe, ProbeError, ProbeFuture, ProbeReport};

/// Checks that a TCP connection to `host:port` can be established.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: Arc<str>,
    degraded_after: Option<Duration>,
}

impl TcpProbe {
    pub fn new(target: impl Into<String>, degraded_after: Option<Duration>) -> Self {
        Self {
            target: Arc::from(target.into()),
            degraded_after,
        }
    }
}

impl HealthCheck for TcpProbe {
    fn check(&self) -> ProbeFuture {
        let target = self.target.clone();
        let degraded_after = self.degraded_after;

        Box::pin(async move {
            let started = Instant::now();
            let stream = TcpStream::connect(target.as_ref()).await?;
            let connect_time = started.elapsed();
            drop(stream);

            Ok(classify_latency(connect_time, degraded_after, "connection established")
                .with_detail("target", target.as_ref())
                .with_detail("connect_ms", connect_time.as_millis() as u64))
        })
    }
}

/// Issues a GET and expects a 2xx response.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: Arc<str>,
    degraded_after: Option<Duration>,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, degraded_after: Option<Duration>) -> Self {
        Self::with_client(reqwest::Client::new(), url, degraded_after)
    }

    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        degraded_after: Option<Duration>,
    ) -> Self {
        Self {
            client,
            url: Arc::from(url.into()),
            degraded_after,
        }
    }
}

impl HealthCheck for HttpProbe {
    fn check(&self) -> ProbeFuture {
        let client = self.client.clone();
        let url = self.url.clone();
        let degraded_after = self.degraded_after;

        Box::pin(async move {
            let started = Instant::now();
            let response = client
                .get(url.as_ref())
                .header("user-agent", "healthwatch-probe")
                .send()
                .await?;
            let elapsed = started.elapsed();
            let status = response.status();

            if !status.is_success() {
                return Ok(ProbeReport::unhealthy(format!("unexpected status {}", status))
                    .with_detail("target", url.as_ref())
                    .with_detail("error", ProbeError::UnexpectedStatus(status.as_u16()).to_string())
                    .with_detail("status_code", status.as_u16()));
            }

            Ok(classify_latency(elapsed, degraded_after, "endpoint responded")
                .with_detail("target", url.as_ref())
                .with_detail("status_code", status.as_u16()))
        })
    }
}

fn classify_latency(elapsed: Duration, degraded_after: Option<Duration>, ok: &str) -> ProbeReport {
    match degraded_after {
        Some(limit) if elapsed > limit => ProbeReport::degraded(format!(
            "slow response: {}ms exceeds {}ms",
            elapsed.as_millis(),
            limit.as_millis()
        )),
        _ => ProbeReport::healthy(ok),
    }
}

/// Build a runnable probe from its configuration entry.
pub fn from_config(config: &ProbeConfig) -> Probe {
    let degraded_after = config.degraded_after_ms.map(Duration::from_millis);
    let check: Arc<dyn HealthCheck> = match config.kind {
        ProbeKind::Tcp => Arc::new(TcpProbe::new(config.target.clone(), degraded_after)),
        ProbeKind::Http => Arc::new(HttpProbe::new(config.target.clone(), degraded_after)),
    };
    Probe::new(config.name.clone(), Duration::from_millis(config.timeout_ms), check)
}
