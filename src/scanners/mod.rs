//! Built-in scanners
//!
//! Thin probes over `sysinfo`, `tokio::net` and `reqwest`. Every numeric
//! metric they emit has a default threshold, so a healthy host classifies
//! as OK rather than UNKNOWN.

mod hardware;
mod network;
mod security;
mod system;

pub use hardware::{BatteryScanner, CpuScanner, GpuScanner, MemoryScanner, StorageScanner};
pub use network::{ConnectivityScanner, DnsScanner, HttpScanner, NetworkAdaptersScanner};
pub use security::{PortsScanner, ProcessesScanner, UsersScanner};
pub use system::OsInfoScanner;

use std::sync::Arc;

use tokio::task::spawn_blocking;

use crate::config::Config;
use crate::error::ScanError;
use crate::scanner::Scanner;
use crate::stress::StressKind;

/// Registration table, in report order
pub fn builtin(config: &Config) -> Vec<Arc<dyn Scanner>> {
    let network = &config.network;

    vec![
        Arc::new(CpuScanner::new()),
        Arc::new(GpuScanner),
        Arc::new(MemoryScanner),
        Arc::new(StorageScanner),
        Arc::new(ConnectivityScanner::new(
            network.targets.clone(),
            network.probe_timeout(),
        )),
        Arc::new(DnsScanner::new(
            network.dns_names.clone(),
            network.probe_timeout(),
        )),
        Arc::new(HttpScanner::new(
            network.http_targets.clone(),
            network.probe_timeout(),
        )),
        Arc::new(NetworkAdaptersScanner),
        Arc::new(PortsScanner::new(network.risky_ports.clone())),
        Arc::new(UsersScanner),
        Arc::new(ProcessesScanner),
        Arc::new(OsInfoScanner),
        Arc::new(BatteryScanner),
    ]
}

/// Scanner sampled during a stress session of `kind`
pub fn stress_sampler(kind: StressKind) -> Arc<dyn Scanner> {
    match kind {
        StressKind::Cpu => Arc::new(CpuScanner::sampler()),
        StressKind::Gpu => Arc::new(GpuScanner),
        StressKind::Memory => Arc::new(MemoryScanner),
    }
}

/// Run a blocking OS query off the async workers
pub(crate) async fn blocking<F, T>(query: F) -> Result<T, ScanError>
where
    F: FnOnce() -> Result<T, ScanError> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(query).await?
}
