use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use sysinfo::{ProcessesToUpdate, System, Users};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::ScanError;
use crate::measurement::RawMeasurement;
use crate::scanner::{Group, ScanContext, ScanOutcome, Scanner};

use super::blocking;

const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

async fn is_listening(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    matches!(timeout(PORT_PROBE_TIMEOUT, TcpStream::connect(addr)).await, Ok(Ok(_)))
}

/// Local listeners on ports commonly abused for lateral movement
#[derive(Debug, Clone)]
pub struct PortsScanner {
    ports: Vec<u16>,
}

impl PortsScanner {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl Scanner for PortsScanner {
    fn name(&self) -> &str {
        "ports"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Security]
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(5))
    }

    async fn run(&self, ctx: ScanContext) -> ScanOutcome {
        let probes = self.ports.iter().map(|port| async move {
            is_listening(*port).await.then_some(*port)
        });

        let open: Vec<u16> = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(ScanError::unexpected("port probe cancelled")),
            open = join_all(probes) => open.into_iter().flatten().collect(),
        };

        if !open.is_empty() {
            warn!("risky ports listening locally: {open:?}");
        }

        Ok(vec![RawMeasurement::new("risky_open_ports", open.len(), "")])
    }
}

/// Number of running processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessesScanner;

#[async_trait]
impl Scanner for ProcessesScanner {
    fn name(&self) -> &str {
        "processes"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Security, Group::System]
    }

    async fn run(&self, ctx: ScanContext) -> ScanOutcome {
        if !ctx.exec.elevated {
            debug!("not elevated, processes of other users may be hidden");
        }

        blocking(|| {
            let mut sys = System::new();
            sys.refresh_processes(ProcessesToUpdate::All, true);

            let count = sys.processes().len();
            if count == 0 {
                return Err(ScanError::Unsupported("process list unavailable".to_string()));
            }

            Ok(vec![RawMeasurement::new("process_count", count, "")])
        })
        .await
    }
}

const ADMIN_GROUPS: [&str; 5] = ["sudo", "wheel", "admin", "root", "administrators"];
const DEFAULT_ACCOUNT_NAMES: [&str; 4] = ["admin", "test", "guest", "user"];

fn is_admin_group(group: &str) -> bool {
    ADMIN_GROUPS.contains(&group.to_lowercase().as_str())
}

fn is_default_account(user: &str) -> bool {
    DEFAULT_ACCOUNT_NAMES.contains(&user.to_lowercase().as_str())
}

/// Administrator accounts and accounts with well-known default names
#[derive(Debug, Default, Clone, Copy)]
pub struct UsersScanner;

#[async_trait]
impl Scanner for UsersScanner {
    fn name(&self) -> &str {
        "users"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Security]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        blocking(|| {
            let users = Users::new_with_refreshed_list();
            if users.list().is_empty() {
                return Err(ScanError::Unsupported("user accounts unavailable".to_string()));
            }

            let mut admins = 0usize;
            let mut defaults = Vec::new();
            for user in users.list() {
                let admin = user.groups().iter().any(|g| is_admin_group(g.name()));
                trace!("{}: admin={admin}", user.name());

                if admin {
                    admins += 1;
                }
                if is_default_account(user.name()) {
                    defaults.push(user.name().to_string());
                }
            }

            if !defaults.is_empty() {
                warn!("accounts with default names: {defaults:?}");
            }

            Ok(vec![
                RawMeasurement::new("admin_accounts", admins, ""),
                RawMeasurement::new("default_name_accounts", defaults.len(), ""),
            ])
        })
        .await
    }
}
