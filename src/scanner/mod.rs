//! Scanner capability
//!
//! A scanner probes one aspect of the host. It knows nothing about
//! thresholds, ordering or concurrency: the engine owns all of that and only
//! asks for a name, group membership, a time budget and the raw data.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ScanError;
use crate::measurement::RawMeasurement;

/// Result of a single scanner invocation
pub type ScanOutcome = Result<Vec<RawMeasurement>, ScanError>;

/// Category a scanner is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Hardware,
    Security,
    Network,
    System,
}

impl Group {
    pub const ALL: [Group; 4] = [Group::Hardware, Group::Security, Group::Network, Group::System];

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Hardware => "hardware",
            Group::Security => "security",
            Group::Network => "network",
            Group::System => "system",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Group {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Group::ALL
            .into_iter()
            .find(|group| group.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown group '{s}'"))
    }
}

/// Privilege information, detected once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionContext {
    pub elevated: bool,
}

impl ExecutionContext {
    /// Best effort check whether the process runs with elevated rights
    pub fn detect() -> Self {
        #[cfg(unix)]
        let elevated = std::fs::metadata("/proc/self")
            .map(|meta| {
                use std::os::unix::fs::MetadataExt;
                meta.uid() == 0
            })
            .unwrap_or(false);

        #[cfg(not(unix))]
        let elevated = false;

        Self { elevated }
    }
}

/// Per-invocation context handed to a scanner
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Fired when the engine gives up on this invocation
    pub cancel: CancellationToken,
    pub exec: ExecutionContext,
}

impl ScanContext {
    pub fn new(exec: ExecutionContext) -> Self {
        Self {
            cancel: CancellationToken::new(),
            exec,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A probe that produces raw measurements
///
/// Implementations must be cheap to share (`Arc<dyn Scanner>`), hold no
/// mutable state across invocations and return promptly once
/// `ctx.cancel` fires. Blocking OS queries belong in `spawn_blocking`.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Unique registration name
    fn name(&self) -> &str;

    fn groups(&self) -> &[Group];

    /// Maximum execution time; `None` uses the engine default
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn run(&self, ctx: ScanContext) -> ScanOutcome;
}

impl fmt::Debug for dyn Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("name", &self.name())
            .field("groups", &self.groups())
            .finish()
    }
}

/// Placeholder for a name that was requested but never registered
pub(crate) struct Unregistered {
    name: String,
}

impl Unregistered {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Scanner for Unregistered {
    fn name(&self) -> &str {
        &self.name
    }

    fn groups(&self) -> &[Group] {
        &[]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        Err(ScanError::Unsupported("scanner not registered".to_string()))
    }
}
