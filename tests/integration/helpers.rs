//! Synthetic scanners and builders shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tcpd::{
    Engine, EngineOptions, ExecutionContext, Executor, Group, RawMeasurement, ScanContext,
    ScanError, ScanOutcome, Scanner, Threshold, ThresholdPolicy,
};

/// Default policy plus a `test_metric` threshold (warn at 50, critical at 80)
pub fn test_policy() -> Arc<ThresholdPolicy> {
    let overrides = HashMap::from([("test_metric".to_string(), Threshold::above(50.0, 80.0))]);
    Arc::new(ThresholdPolicy::with_overrides(overrides).unwrap())
}

pub fn engine_options(workers: usize, default_timeout: Duration) -> EngineOptions {
    EngineOptions {
        workers,
        default_timeout,
        grace: Duration::from_millis(50),
        quick: vec!["fast".to_string(), "slow".to_string()],
        exec: ExecutionContext::default(),
    }
}

pub fn test_engine(workers: usize) -> Engine {
    Engine::new(test_policy(), engine_options(workers, Duration::from_secs(5)))
}

pub fn test_executor(workers: usize) -> Executor {
    Executor::new(
        test_policy(),
        workers,
        Duration::from_secs(5),
        Duration::from_millis(50),
        ExecutionContext::default(),
    )
}

/// Returns a fixed `test_metric` value after an optional delay
pub struct FixedScanner {
    pub name: &'static str,
    pub groups: Vec<Group>,
    pub value: f64,
    pub delay: Duration,
}

impl FixedScanner {
    pub fn new(name: &'static str, value: f64) -> Self {
        Self {
            name,
            groups: vec![Group::Hardware],
            value,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn in_groups(mut self, groups: Vec<Group>) -> Self {
        self.groups = groups;
        self
    }
}

#[async_trait]
impl Scanner for FixedScanner {
    fn name(&self) -> &str {
        self.name
    }

    fn groups(&self) -> &[Group] {
        &self.groups
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(vec![RawMeasurement::new("test_metric", self.value, "")])
    }
}

/// Always fails with the given error
pub struct FailingScanner {
    pub name: &'static str,
    pub error: ScanError,
}

#[async_trait]
impl Scanner for FailingScanner {
    fn name(&self) -> &str {
        self.name
    }

    fn groups(&self) -> &[Group] {
        &[Group::System]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        Err(self.error.clone())
    }
}

/// Sleeps far past its deadline; stops early only when `cooperative`
pub struct HangingScanner {
    pub name: &'static str,
    pub timeout: Duration,
    pub cooperative: bool,
}

#[async_trait]
impl Scanner for HangingScanner {
    fn name(&self) -> &str {
        self.name
    }

    fn groups(&self) -> &[Group] {
        &[Group::Network]
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn run(&self, ctx: ScanContext) -> ScanOutcome {
        if self.cooperative {
            tokio::select! {
                _ = ctx.cancel.cancelled() => Err(ScanError::unexpected("cancelled")),
                _ = tokio::time::sleep(Duration::from_secs(3600)) => Ok(vec![]),
            }
        } else {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }
}

/// Records how many instances run at the same time
pub struct CountingScanner {
    pub name: String,
    pub running: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub hold: Duration,
}

impl CountingScanner {
    pub fn fleet(count: usize, hold: Duration) -> (Vec<Arc<dyn Scanner>>, Arc<AtomicUsize>) {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let scanners = (0..count)
            .map(|i| {
                Arc::new(CountingScanner {
                    name: format!("counting-{i}"),
                    running: running.clone(),
                    peak: peak.clone(),
                    hold,
                }) as Arc<dyn Scanner>
            })
            .collect();

        (scanners, peak)
    }
}

#[async_trait]
impl Scanner for CountingScanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn groups(&self) -> &[Group] {
        &[Group::Hardware]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.hold).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![RawMeasurement::new("test_metric", 1.0, "")])
    }
}

/// Yields the next value of a script on every call, repeating the last one
pub struct ScriptedScanner {
    pub name: &'static str,
    pub metric: &'static str,
    pub values: Vec<f64>,
    pub calls: AtomicUsize,
}

impl ScriptedScanner {
    pub fn new(name: &'static str, metric: &'static str, values: Vec<f64>) -> Self {
        Self {
            name,
            metric,
            values,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Scanner for ScriptedScanner {
    fn name(&self) -> &str {
        self.name
    }

    fn groups(&self) -> &[Group] {
        &[Group::Hardware]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let value = self.values[call.min(self.values.len() - 1)];
        Ok(vec![RawMeasurement::new(self.metric, value, "")])
    }
}
