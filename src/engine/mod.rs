//! Orchestration engine
//!
//! Owns the scanner registry, resolves run modes into an ordered scanner set
//! and hands that set to the [`Executor`]. Results always come back in
//! registration order, whatever order the scanners finish in.

mod executor;

pub use executor::{Executor, ScanEvent};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::EngineError;
use crate::report::Report;
use crate::result::ScanResult;
use crate::scanner::{ExecutionContext, Group, Scanner, Unregistered};
use crate::thresholds::ThresholdPolicy;

const EVENT_CAPACITY: usize = 64;

/// Which scanners a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanMode {
    /// Configured subset of fast scanners
    Quick,
    /// Every registered scanner
    Full,
    Group(Group),
    /// Explicit list of scanner names
    Names(Vec<String>),
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "quick" => return Ok(ScanMode::Quick),
            "full" => return Ok(ScanMode::Full),
            _ => {}
        }

        if let Ok(group) = s.parse::<Group>() {
            return Ok(ScanMode::Group(group));
        }

        let names: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        if names.is_empty() {
            return Err("mode must be quick, full, a group or a list of scanner names".to_string());
        }

        Ok(ScanMode::Names(names))
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Quick => f.write_str("quick"),
            ScanMode::Full => f.write_str("full"),
            ScanMode::Group(group) => write!(f, "{group}"),
            ScanMode::Names(names) => f.write_str(&names.join(",")),
        }
    }
}

/// Tunables of an [`Engine`]
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub workers: usize,
    pub default_timeout: Duration,
    pub grace: Duration,
    /// Membership of [`ScanMode::Quick`]
    pub quick: Vec<String>,
    pub exec: ExecutionContext,
}

impl EngineOptions {
    pub fn from_config(config: &Config, exec: ExecutionContext) -> Self {
        Self {
            workers: config.engine.workers(),
            default_timeout: config.engine.default_timeout(),
            grace: config.engine.grace(),
            quick: config.modes.quick.clone(),
            exec,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), ExecutionContext::default())
    }
}

pub struct Engine {
    registry: Vec<Arc<dyn Scanner>>,
    quick: Vec<String>,
    executor: Executor,
    events: broadcast::Sender<ScanEvent>,
}

impl Engine {
    pub fn new(policy: Arc<ThresholdPolicy>, options: EngineOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let executor = Executor::new(
            policy,
            options.workers,
            options.default_timeout,
            options.grace,
            options.exec,
        )
        .with_events(events.clone());

        debug!(
            "engine ready: {} workers, default timeout {:?}",
            options.workers, options.default_timeout
        );

        Self {
            registry: vec![],
            quick: options.quick,
            executor,
            events,
        }
    }

    /// Register `scanner`. A scanner with the same name is replaced in its
    /// original slot so ordering stays stable.
    pub fn register(&mut self, scanner: Arc<dyn Scanner>) {
        match self
            .registry
            .iter_mut()
            .find(|existing| existing.name() == scanner.name())
        {
            Some(existing) => {
                debug!("replacing scanner '{}'", scanner.name());
                *existing = scanner;
            }
            None => self.registry.push(scanner),
        }
    }

    pub fn register_all<I>(&mut self, scanners: I)
    where
        I: IntoIterator<Item = Arc<dyn Scanner>>,
    {
        scanners.into_iter().for_each(|scanner| self.register(scanner));
    }

    pub fn scanner(&self, name: &str) -> Option<Arc<dyn Scanner>> {
        self.registry.iter().find(|s| s.name() == name).cloned()
    }

    pub fn scanners(&self) -> impl Iterator<Item = &Arc<dyn Scanner>> {
        self.registry.iter()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn policy(&self) -> &Arc<ThresholdPolicy> {
        self.executor.policy()
    }

    /// Progress events of subsequent runs
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Scanner names `mode` resolves to, without running anything
    pub fn list(&self, mode: &ScanMode) -> Vec<String> {
        self.resolve(mode)
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Resolve `mode` into registration order.
    ///
    /// Requested names that are not registered are appended as placeholders
    /// so they show up in the report as unknown instead of vanishing.
    pub fn resolve(&self, mode: &ScanMode) -> Vec<Arc<dyn Scanner>> {
        let requested: &[String] = match mode {
            ScanMode::Full => return self.registry.clone(),
            ScanMode::Group(group) => {
                return self
                    .registry
                    .iter()
                    .filter(|s| s.groups().contains(group))
                    .cloned()
                    .collect();
            }
            ScanMode::Quick => &self.quick,
            ScanMode::Names(names) => names,
        };

        let mut resolved: Vec<Arc<dyn Scanner>> = self
            .registry
            .iter()
            .filter(|s| requested.iter().any(|name| name == s.name()))
            .cloned()
            .collect();

        for name in requested.iter().filter(|name| self.scanner(name).is_none()) {
            if !resolved.iter().any(|s| s.name() == name.as_str()) {
                resolved.push(Arc::new(Unregistered::new(name.as_str())));
            }
        }

        resolved
    }

    /// Run every scanner of `mode` and assemble a report
    #[instrument(skip(self, mode), fields(mode = %mode))]
    pub async fn run(&self, mode: ScanMode) -> Result<Report, EngineError> {
        let scanners = self.resolve(&mode);
        info!("running {} scanners", scanners.len());

        let started_at = Utc::now();
        let results = self.executor.run_all(&scanners).await?;
        let finished_at = Utc::now();

        let report = Report::new(mode.to_string(), started_at, finished_at, results);
        info!("finished with overall severity {}", report.overall_severity());

        Ok(report)
    }

    /// Run a single scanner by name
    pub async fn run_one(&self, name: &str) -> Result<ScanResult, EngineError> {
        let scanner = self
            .scanner(name)
            .unwrap_or_else(|| Arc::new(Unregistered::new(name)) as Arc<dyn Scanner>);

        self.executor.run_one(scanner).await
    }

    /// Stop accepting runs
    pub fn shutdown(&self) {
        self.executor.close();
    }
}
