//! Stress runner
//!
//! Drives a load generator for a bounded duration while sampling a scanner
//! on a fixed cadence. The session moves through
//!
//! ```text
//! Idle ──► Running ──┬──► Completed   budget elapsed
//!                    ├──► Aborted     safety metric critical, or load failed
//!                    └──► Cancelled   external cancellation
//! ```
//!
//! The terminal state is decided in one place (the runner's select loop).
//! Load generation and sampling share a single stop token that is fired
//! exactly once, after which the load gets a grace period to wind down.

mod load;

pub use load::{CpuLoad, GpuLoad, LoadGenerator, MemoryLoad};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::StressConfig;
use crate::engine::Executor;
use crate::error::StressError;
use crate::measurement::{ClassifiedMeasurement, Measurement, MetricValue};
use crate::result::ScanResult;
use crate::scanner::Scanner;
use crate::severity::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressKind {
    Cpu,
    Gpu,
    Memory,
}

impl StressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StressKind::Cpu => "cpu",
            StressKind::Gpu => "gpu",
            StressKind::Memory => "memory",
        }
    }

    /// Scanner sampled while this kind of load runs
    pub fn sampler(&self) -> &'static str {
        self.as_str()
    }

    pub fn default_safety_metric(&self) -> &'static str {
        match self {
            StressKind::Cpu => "cpu_temp",
            StressKind::Gpu => "gpu_temp",
            StressKind::Memory => "swap_usage",
        }
    }

    /// Intensity used when none is given
    pub fn default_intensity(&self) -> u32 {
        match self {
            StressKind::Cpu => 0,
            StressKind::Gpu => 100,
            StressKind::Memory => 70,
        }
    }

    pub fn load(&self) -> Arc<dyn LoadGenerator> {
        match self {
            StressKind::Cpu => Arc::new(CpuLoad),
            StressKind::Gpu => Arc::new(GpuLoad),
            StressKind::Memory => Arc::new(MemoryLoad::default()),
        }
    }
}

impl fmt::Display for StressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StressKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(StressKind::Cpu),
            "gpu" => Ok(StressKind::Gpu),
            "memory" | "ram" => Ok(StressKind::Memory),
            other => Err(format!("unknown stress kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressState {
    Idle,
    Running,
    Completed,
    Aborted,
    Cancelled,
}

impl StressState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StressState::Completed | StressState::Aborted | StressState::Cancelled
        )
    }
}

/// Record of one stress run
#[derive(Debug, Clone, Serialize)]
pub struct StressSession {
    pub kind: StressKind,
    #[serde(with = "crate::util::duration_ms")]
    pub duration_budget: Duration,
    pub intensity: u32,
    pub samples: Vec<ClassifiedMeasurement>,
    pub state: StressState,
    pub abort_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether load generation stopped within the grace period
    pub load_stopped_in_grace: bool,
}

impl StressSession {
    fn new(kind: StressKind, duration_budget: Duration, intensity: u32) -> Self {
        Self {
            kind,
            duration_budget,
            intensity,
            samples: vec![],
            state: StressState::Idle,
            abort_reason: None,
            started_at: None,
            finished_at: None,
            load_stopped_in_grace: false,
        }
    }

    pub fn summary(&self) -> StressSummary {
        StressSummary::from_samples(&self.samples)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StressSummary {
    pub metrics: BTreeMap<String, MetricStats>,
    /// CPU frequency fell below 90% of its first sample
    pub throttling_detected: bool,
}

const THROTTLE_RATIO: f64 = 0.9;

impl StressSummary {
    pub fn from_samples(samples: &[ClassifiedMeasurement]) -> Self {
        let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for sample in samples {
            if let Some(v) = sample.value().as_f64().filter(|v| v.is_finite()) {
                values.entry(sample.metric_id().to_string()).or_default().push(v);
            }
        }

        let throttling_detected = values
            .get("cpu_freq_mhz")
            .and_then(|freqs| {
                let (first, rest) = freqs.split_first()?;
                Some(rest.iter().any(|f| *f < first * THROTTLE_RATIO))
            })
            .unwrap_or(false);

        let metrics = values
            .into_iter()
            .map(|(metric, vs)| {
                let stats = MetricStats {
                    min: vs.iter().copied().fold(f64::INFINITY, f64::min),
                    max: vs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    avg: vs.iter().sum::<f64>() / vs.len() as f64,
                    count: vs.len(),
                };
                (metric, stats)
            })
            .collect();

        Self {
            metrics,
            throttling_detected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StressOptions {
    pub duration: Duration,
    pub intensity: u32,
    pub sample_interval: Duration,
    pub grace: Duration,
    /// Metric whose critical classification aborts the session
    pub safety_metric: String,
}

impl StressOptions {
    pub fn from_config(
        config: &StressConfig,
        kind: StressKind,
        duration: Duration,
        intensity: Option<u32>,
    ) -> Self {
        Self {
            duration,
            intensity: intensity.unwrap_or_else(|| kind.default_intensity()),
            sample_interval: config.sample_interval(),
            grace: config.grace(),
            safety_metric: config.safety_metric(kind),
        }
    }
}

/// Outcome decided by the runner loop
enum Decision {
    Completed,
    Aborted(String),
    Cancelled,
}

pub struct StressRunner {
    kind: StressKind,
    sampler: Arc<dyn Scanner>,
    load: Arc<dyn LoadGenerator>,
    executor: Executor,
    options: StressOptions,
}

impl StressRunner {
    pub fn new(
        kind: StressKind,
        sampler: Arc<dyn Scanner>,
        load: Arc<dyn LoadGenerator>,
        executor: Executor,
        options: StressOptions,
    ) -> Self {
        Self {
            kind,
            sampler,
            load,
            executor,
            options,
        }
    }

    /// Sampling interval, never longer than the budget
    fn interval(&self) -> Duration {
        self.options
            .sample_interval
            .min(self.options.duration)
            .max(Duration::from_millis(1))
    }

    /// Run the session to a terminal state
    #[instrument(skip_all, fields(kind = %self.kind))]
    pub async fn run(self, cancel: CancellationToken) -> StressSession {
        let StressOptions {
            duration,
            intensity,
            grace,
            ref safety_metric,
            ..
        } = self.options;

        let mut session = StressSession::new(self.kind, duration, intensity);
        let interval = self.interval();
        // a sample may never outlast the cadence
        let sampler = self.executor.clone().with_timeout_cap(interval);

        let stop = CancellationToken::new();
        session.state = StressState::Running;
        session.started_at = Some(Utc::now());
        info!("running for {duration:?} at intensity {intensity}, sampling every {interval:?}");

        let mut load = tokio::spawn({
            let load = self.load.clone();
            let stop = stop.clone();
            async move { load.run(intensity, stop).await }
        });
        let mut load_finished = false;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        let decision = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break Decision::Cancelled,

                _ = &mut deadline => break Decision::Completed,

                joined = &mut load, if !load_finished => {
                    load_finished = true;
                    match joined {
                        Ok(Ok(())) => debug!("load generator returned early"),
                        Ok(Err(e)) => {
                            if let StressError::MemoryErrors(errors) = e {
                                session.samples.push(self.memory_error_sample(errors));
                            }
                            break Decision::Aborted(e.to_string());
                        }
                        Err(e) => break Decision::Aborted(format!("load task failed: {e}")),
                    }
                }

                _ = ticker.tick() => {
                    let result = sampler.run_single(self.sampler.clone()).await;
                    let critical = record_sample(&mut session, &result, safety_metric);
                    if let Some(value) = critical {
                        break Decision::Aborted(format!(
                            "{safety_metric} reached critical level ({value})"
                        ));
                    }
                }
            }
        };

        // single stop point for load and sampling
        stop.cancel();

        session.load_stopped_in_grace = if load_finished {
            true
        } else {
            match timeout(grace, &mut load).await {
                Ok(_) => true,
                Err(_) => {
                    warn!("load did not stop within {grace:?}, aborting");
                    load.abort();
                    false
                }
            }
        };

        session.state = match decision {
            Decision::Completed => StressState::Completed,
            Decision::Cancelled => StressState::Cancelled,
            Decision::Aborted(reason) => {
                warn!("aborted: {reason}");
                session.abort_reason = Some(reason);
                StressState::Aborted
            }
        };
        session.finished_at = Some(Utc::now());

        info!(
            "finished as {:?} with {} samples",
            session.state,
            session.samples.len()
        );
        session
    }

    fn memory_error_sample(&self, errors: u64) -> ClassifiedMeasurement {
        let measurement = Measurement {
            metric_id: "memory_errors".to_string(),
            value: MetricValue::from(errors),
            unit: String::new(),
            collected_at: Utc::now(),
        };
        self.executor.policy().classify_measurement(measurement)
    }
}

/// Append the measurements of one sample to the session.
///
/// Returns the safety metric's value when it classified critical. A failed
/// sample is kept as an unknown placeholder.
fn record_sample(
    session: &mut StressSession,
    result: &ScanResult,
    safety_metric: &str,
) -> Option<MetricValue> {
    if let Some(error) = result.error() {
        debug!("sample failed: {}", error.message);
        session.samples.push(ClassifiedMeasurement {
            measurement: Measurement {
                metric_id: safety_metric.to_string(),
                value: MetricValue::Text(format!("{}: {}", error.kind, error.message)),
                unit: String::new(),
                collected_at: Utc::now(),
            },
            severity: Severity::Unknown,
        });
        return None;
    }

    session.samples.extend_from_slice(result.measurements());

    result
        .measurement(safety_metric)
        .filter(|m| m.severity == Severity::Critical)
        .map(|m| m.value().clone())
}
