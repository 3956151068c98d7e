//! Reachability probes
//!
//! All probes of one scanner run concurrently and individually time out;
//! the scanner reports aggregates (reached share, mean latency, failures).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use sysinfo::Networks;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::{Instant, timeout};
use tracing::{debug, trace};

use crate::error::ScanError;
use crate::measurement::RawMeasurement;
use crate::scanner::{Group, ScanContext, ScanOutcome, Scanner};

use super::blocking;

/// Headroom on top of the probe timeout for the whole scanner
const SCANNER_SLACK: Duration = Duration::from_secs(2);

/// Latency of `probe` in milliseconds, or `None` if it failed or timed out
async fn timed<F, T, E>(label: &str, probe_timeout: Duration, probe: F) -> Option<f64>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    match timeout(probe_timeout, probe).await {
        Ok(Ok(_)) => Some(start.elapsed().as_secs_f64() * 1000.0),
        Ok(Err(e)) => {
            debug!("{label}: {e}");
            None
        }
        Err(_) => {
            debug!("{label}: no answer within {probe_timeout:?}");
            None
        }
    }
}

/// Run all `probes` unless `ctx` is cancelled first
async fn probe_all<F>(ctx: &ScanContext, probes: Vec<F>) -> Result<Vec<Option<f64>>, ScanError>
where
    F: Future<Output = Option<f64>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(ScanError::unexpected("probe cancelled")),
        latencies = join_all(probes) => Ok(latencies),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

fn successes(latencies: &[Option<f64>]) -> Vec<f64> {
    latencies.iter().flatten().copied().collect()
}

/// TCP reachability of configured `host:port` targets
#[derive(Debug, Clone)]
pub struct ConnectivityScanner {
    targets: Vec<String>,
    probe_timeout: Duration,
}

impl ConnectivityScanner {
    pub fn new(targets: Vec<String>, probe_timeout: Duration) -> Self {
        Self {
            targets,
            probe_timeout,
        }
    }
}

#[async_trait]
impl Scanner for ConnectivityScanner {
    fn name(&self) -> &str {
        "connectivity"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Network]
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.probe_timeout + SCANNER_SLACK)
    }

    async fn run(&self, ctx: ScanContext) -> ScanOutcome {
        if self.targets.is_empty() {
            return Err(ScanError::Unsupported("no connectivity targets configured".to_string()));
        }

        let probes = self
            .targets
            .iter()
            .map(|target| timed(target, self.probe_timeout, TcpStream::connect(target.as_str())))
            .collect();

        let latencies = probe_all(&ctx, probes).await?;
        let reached = successes(&latencies);
        trace!("connectivity: {}/{} reachable", reached.len(), self.targets.len());

        let mut measurements = vec![RawMeasurement::new(
            "reachable_percent",
            percent(reached.len(), self.targets.len()),
            "%",
        )];
        if let Some(latency) = mean(&reached) {
            measurements.push(RawMeasurement::new("latency_ms", latency, "ms"));
        }
        Ok(measurements)
    }
}

/// Name resolution time
#[derive(Debug, Clone)]
pub struct DnsScanner {
    names: Vec<String>,
    probe_timeout: Duration,
}

impl DnsScanner {
    pub fn new(names: Vec<String>, probe_timeout: Duration) -> Self {
        Self {
            names,
            probe_timeout,
        }
    }
}

#[async_trait]
impl Scanner for DnsScanner {
    fn name(&self) -> &str {
        "dns"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Network]
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.probe_timeout + SCANNER_SLACK)
    }

    async fn run(&self, ctx: ScanContext) -> ScanOutcome {
        if self.names.is_empty() {
            return Err(ScanError::Unsupported("no DNS names configured".to_string()));
        }

        let probes = self
            .names
            .iter()
            .map(|name| timed(name, self.probe_timeout, lookup_host((name.as_str(), 0))))
            .collect();

        let latencies = probe_all(&ctx, probes).await?;
        let resolved = successes(&latencies);

        let mut measurements = vec![RawMeasurement::new(
            "dns_failures",
            latencies.len() - resolved.len(),
            "",
        )];
        if let Some(latency) = mean(&resolved) {
            measurements.push(RawMeasurement::new("dns_resolve_ms", latency, "ms"));
        }
        Ok(measurements)
    }
}

/// HTTP reachability of configured URLs; any response counts as reached
#[derive(Debug, Clone)]
pub struct HttpScanner {
    urls: Vec<String>,
    probe_timeout: Duration,
}

impl HttpScanner {
    pub fn new(urls: Vec<String>, probe_timeout: Duration) -> Self {
        Self {
            urls,
            probe_timeout,
        }
    }
}

#[async_trait]
impl Scanner for HttpScanner {
    fn name(&self) -> &str {
        "http"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Network]
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.probe_timeout + SCANNER_SLACK)
    }

    async fn run(&self, ctx: ScanContext) -> ScanOutcome {
        if self.urls.is_empty() {
            return Err(ScanError::Unsupported("no HTTP targets configured".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(self.probe_timeout)
            .build()
            .map_err(ScanError::unexpected)?;

        let probes = self
            .urls
            .iter()
            .map(|url| timed(url, self.probe_timeout, client.get(url.as_str()).send()))
            .collect();

        let latencies = probe_all(&ctx, probes).await?;
        let reached = successes(&latencies);

        let mut measurements = vec![RawMeasurement::new(
            "http_failures",
            latencies.len() - reached.len(),
            "",
        )];
        if let Some(latency) = mean(&reached) {
            measurements.push(RawMeasurement::new("http_latency_ms", latency, "ms"));
        }
        Ok(measurements)
    }
}

/// Interface counts and cumulative transmission errors
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkAdaptersScanner;

fn is_loopback(interface: &str) -> bool {
    interface == "lo" || interface.starts_with("lo0") || interface.starts_with("Loopback")
}

/// (adapter count, total errors) over non-loopback interfaces
fn adapter_totals<'a>(interfaces: impl IntoIterator<Item = (&'a str, u64)>) -> (usize, u64) {
    interfaces
        .into_iter()
        .filter(|(name, _)| !is_loopback(name))
        .fold((0, 0), |(count, errors), (_, e)| (count + 1, errors + e))
}

#[async_trait]
impl Scanner for NetworkAdaptersScanner {
    fn name(&self) -> &str {
        "network_adapters"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Network]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        blocking(|| {
            let networks = Networks::new_with_refreshed_list();
            let interfaces = networks.list().iter().map(|(name, data)| {
                trace!(
                    "{name}: rx {} tx {} bytes",
                    data.total_received(),
                    data.total_transmitted()
                );
                (
                    name.as_str(),
                    data.total_errors_on_received() + data.total_errors_on_transmitted(),
                )
            });

            let (adapters, errors) = adapter_totals(interfaces);
            if errors > 0 {
                debug!("{errors} transmission errors across {adapters} adapters");
            }

            Ok(vec![
                RawMeasurement::new("network_adapters", adapters, ""),
                RawMeasurement::new("network_errors", errors, ""),
            ])
        })
        .await
    }
}
