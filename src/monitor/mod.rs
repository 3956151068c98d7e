//! Live monitor loop
//!
//! Samples a fixed set of lightweight scanners on every tick and pushes a
//! transient [`Snapshot`] into a channel. Nothing is persisted; the only
//! state carried between ticks is the previous numeric value of each
//! `(scanner, metric)` pair, used for the rate-of-change column.

#[cfg(feature = "dashboard")]
pub mod dashboard;
pub mod plain;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace};

use crate::config::MonitorConfig;
use crate::engine::Executor;
use crate::measurement::MetricValue;
use crate::result::{FailureRecord, ScanResult};
use crate::scanner::Scanner;
use crate::severity::{Severity, rollup};

/// One metric of one scanner at one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub metric_id: String,
    pub value: MetricValue,
    pub unit: String,
    pub severity: Severity,
    /// Change since the previous tick, per second
    pub delta_per_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannerSnapshot {
    pub scanner: String,
    pub severity: Severity,
    pub entries: Vec<SnapshotEntry>,
    pub error: Option<FailureRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub taken_at: DateTime<Utc>,
    pub scanners: Vec<ScannerSnapshot>,
}

impl Snapshot {
    pub fn overall_severity(&self) -> Severity {
        rollup(self.scanners.iter().map(|s| s.severity))
    }

    pub fn entry(&self, scanner: &str, metric_id: &str) -> Option<&SnapshotEntry> {
        self.scanners
            .iter()
            .find(|s| s.scanner == scanner)?
            .entries
            .iter()
            .find(|e| e.metric_id == metric_id)
    }
}

/// Previous value per `(scanner, metric)`
#[derive(Debug, Default)]
struct DeltaTracker {
    previous: HashMap<(String, String), (f64, Instant)>,
}

impl DeltaTracker {
    fn delta(&mut self, scanner: &str, metric_id: &str, value: &MetricValue, now: Instant) -> Option<f64> {
        let key = (scanner.to_string(), metric_id.to_string());

        let Some(current) = value.as_f64().filter(|v| v.is_finite()) else {
            self.previous.remove(&key);
            return None;
        };

        let delta = self.previous.get(&key).and_then(|(prev, at)| {
            let elapsed = now.duration_since(*at).as_secs_f64();
            (elapsed > 0.0).then(|| (current - prev) / elapsed)
        });

        self.previous.insert(key, (current, now));
        delta
    }
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub interval: Duration,
    pub tick_timeout: Duration,
    /// Stop after this long; `None` runs until cancelled
    pub max_duration: Option<Duration>,
}

impl MonitorOptions {
    pub fn from_config(config: &MonitorConfig, max_duration: Option<Duration>) -> Self {
        Self {
            interval: config.interval(),
            tick_timeout: config.tick_timeout(),
            max_duration,
        }
    }
}

pub struct LiveMonitor {
    scanners: Vec<Arc<dyn Scanner>>,
    executor: Executor,
    options: MonitorOptions,
    deltas: DeltaTracker,
}

impl LiveMonitor {
    pub fn new(scanners: Vec<Arc<dyn Scanner>>, executor: Executor, options: MonitorOptions) -> Self {
        let executor = executor.with_timeout_cap(options.tick_timeout);
        Self {
            scanners,
            executor,
            options,
            deltas: DeltaTracker::default(),
        }
    }

    /// Tick until `cancel` fires, the optional maximum duration elapses or
    /// the receiving side of `sink` goes away. Returns the number of ticks.
    #[instrument(skip_all)]
    pub async fn run(mut self, cancel: CancellationToken, sink: mpsc::Sender<Snapshot>) -> u64 {
        debug!(
            "monitoring {} scanners every {:?}",
            self.scanners.len(),
            self.options.interval
        );

        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let max_duration = self.options.max_duration;
        let expired = async move {
            match max_duration {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        let mut tick = 0u64;
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("cancelled after {tick} ticks");
                    break;
                }

                _ = &mut expired => {
                    debug!("maximum duration reached after {tick} ticks");
                    break;
                }

                _ = ticker.tick() => {
                    let results = match self.executor.run_all(&self.scanners).await {
                        Ok(results) => results,
                        Err(e) => {
                            error!("monitor tick failed: {e}");
                            break;
                        }
                    };

                    tick += 1;
                    let snapshot = self.snapshot(tick, &results);
                    trace!("tick {tick}: {}", snapshot.overall_severity());

                    if sink.send(snapshot).await.is_err() {
                        debug!("snapshot receiver closed");
                        break;
                    }
                }
            }
        }

        tick
    }

    fn snapshot(&mut self, tick: u64, results: &[ScanResult]) -> Snapshot {
        let now = Instant::now();
        let scanners = results
            .iter()
            .map(|result| {
                let entries = result
                    .measurements()
                    .iter()
                    .map(|m| SnapshotEntry {
                        metric_id: m.metric_id().to_string(),
                        value: m.value().clone(),
                        unit: m.measurement.unit.clone(),
                        severity: m.severity,
                        delta_per_sec: self.deltas.delta(
                            result.scanner_name(),
                            m.metric_id(),
                            m.value(),
                            now,
                        ),
                    })
                    .collect();

                ScannerSnapshot {
                    scanner: result.scanner_name().to_string(),
                    severity: result.severity(),
                    entries,
                    error: result.error().cloned(),
                }
            })
            .collect();

        Snapshot {
            tick,
            taken_at: Utc::now(),
            scanners,
        }
    }
}
