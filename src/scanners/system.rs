use async_trait::async_trait;
use sysinfo::System;
use tracing::debug;

use crate::error::ScanError;
use crate::measurement::RawMeasurement;
use crate::scanner::{Group, ScanContext, ScanOutcome, Scanner};

use super::blocking;

const SECONDS_PER_DAY: f64 = 86_400.0;

fn uptime_days(seconds: u64) -> f64 {
    seconds as f64 / SECONDS_PER_DAY
}

/// Operating system facts and time since the last boot
#[derive(Debug, Default, Clone, Copy)]
pub struct OsInfoScanner;

#[async_trait]
impl Scanner for OsInfoScanner {
    fn name(&self) -> &str {
        "os_info"
    }

    fn groups(&self) -> &[Group] {
        &[Group::System]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        let uptime = blocking(|| {
            debug!(
                name = ?System::name(),
                kernel = ?System::kernel_version(),
                os = ?System::long_os_version(),
                host = ?System::host_name(),
                arch = %System::cpu_arch(),
                "os info"
            );
            Ok(System::uptime())
        })
        .await?;

        if uptime == 0 {
            return Err(ScanError::Unsupported("uptime unavailable".to_string()));
        }

        Ok(vec![RawMeasurement::new("uptime_days", uptime_days(uptime), "days")])
    }
}
