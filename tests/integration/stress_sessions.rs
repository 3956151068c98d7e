//! Stress sessions against synthetic load generators

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tcpd::stress::{LoadGenerator, StressKind, StressOptions, StressRunner, StressState};
use tcpd::{MetricValue, ScanError, Severity, StressError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

/// Runs until told to stop
struct IdleLoad;

#[async_trait]
impl LoadGenerator for IdleLoad {
    async fn run(&self, _intensity: u32, stop: CancellationToken) -> Result<(), StressError> {
        stop.cancelled().await;
        Ok(())
    }
}

/// Never looks at the stop token
struct StubbornLoad;

#[async_trait]
impl LoadGenerator for StubbornLoad {
    async fn run(&self, _intensity: u32, _stop: CancellationToken) -> Result<(), StressError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

struct BrokenLoad(StressError);

#[async_trait]
impl LoadGenerator for BrokenLoad {
    async fn run(&self, _intensity: u32, _stop: CancellationToken) -> Result<(), StressError> {
        Err(self.0.clone())
    }
}

fn options(duration: Duration) -> StressOptions {
    StressOptions {
        duration,
        intensity: 1,
        sample_interval: Duration::from_secs(1),
        grace: Duration::from_millis(100),
        safety_metric: "cpu_temp".to_string(),
    }
}

fn runner(temps: Vec<f64>, load: Arc<dyn LoadGenerator>, duration: Duration) -> StressRunner {
    StressRunner::new(
        StressKind::Cpu,
        Arc::new(ScriptedScanner::new("cpu", "cpu_temp", temps)),
        load,
        test_executor(2),
        options(duration),
    )
}

#[tokio::test(start_paused = true)]
async fn test_session_completes_after_budget() {
    let session = runner(vec![60.0, 62.0, 64.0], Arc::new(IdleLoad), Duration::from_secs(3))
        .run(CancellationToken::new())
        .await;

    assert_eq!(session.state, StressState::Completed);
    assert!(session.state.is_terminal());
    assert!(session.abort_reason.is_none());
    assert!(session.samples.len() >= 2);
    assert!(session.load_stopped_in_grace);
    assert!(session.started_at.unwrap() <= session.finished_at.unwrap());

    let summary = session.summary();
    let temps = summary.metrics.get("cpu_temp").unwrap();
    assert_eq!(temps.min, 60.0);
    assert!(!summary.throttling_detected);
}

#[tokio::test(start_paused = true)]
async fn test_critical_safety_metric_aborts() {
    let start = Instant::now();
    let session = runner(vec![60.0, 70.0, 90.0], Arc::new(IdleLoad), Duration::from_secs(30))
        .run(CancellationToken::new())
        .await;

    assert_eq!(session.state, StressState::Aborted);
    let reason = session.abort_reason.unwrap();
    assert!(reason.contains("cpu_temp"), "unexpected reason: {reason}");

    let last = session.samples.last().unwrap();
    assert_eq!(last.value(), &MetricValue::Number(90.0));
    assert_eq!(last.severity, Severity::Critical);

    assert!(session.load_stopped_in_grace);
    // third sample lands at t=2s; abort must follow within one interval
    assert!(start.elapsed() <= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_external_cancellation() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let session = runner(vec![60.0], Arc::new(IdleLoad), Duration::from_secs(60))
        .run(cancel)
        .await;

    assert_eq!(session.state, StressState::Cancelled);
    assert!(session.abort_reason.is_none());
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_aborts() {
    let load = Arc::new(BrokenLoad(StressError::Failed("no workers".to_string())));
    let session = runner(vec![60.0], load, Duration::from_secs(60))
        .run(CancellationToken::new())
        .await;

    assert_eq!(session.state, StressState::Aborted);
    assert!(session.abort_reason.unwrap().contains("no workers"));
}

#[tokio::test(start_paused = true)]
async fn test_memory_errors_are_recorded() {
    let load = Arc::new(BrokenLoad(StressError::MemoryErrors(3)));
    let session = runner(vec![60.0], load, Duration::from_secs(60))
        .run(CancellationToken::new())
        .await;

    assert_eq!(session.state, StressState::Aborted);
    let errors = session
        .samples
        .iter()
        .find(|s| s.metric_id() == "memory_errors")
        .unwrap();
    assert_eq!(errors.value(), &MetricValue::Number(3.0));
    assert_eq!(errors.severity, Severity::Critical);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_load_aborts_immediately() {
    let load = Arc::new(BrokenLoad(StressError::Unsupported("no backend".to_string())));
    let start = Instant::now();
    let session = runner(vec![60.0], load, Duration::from_secs(60))
        .run(CancellationToken::new())
        .await;

    assert_eq!(session.state, StressState::Aborted);
    assert!(session.abort_reason.unwrap().contains("unsupported"));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_gpu_session_generates_load() {
    let session = StressRunner::new(
        StressKind::Gpu,
        Arc::new(ScriptedScanner::new("gpu", "gpu_temp", vec![55.0, 58.0])),
        StressKind::Gpu.load(),
        test_executor(1),
        StressOptions {
            sample_interval: Duration::from_millis(200),
            grace: Duration::from_secs(2),
            safety_metric: "gpu_temp".to_string(),
            ..options(Duration::from_secs(1))
        },
    )
    .run(CancellationToken::new())
    .await;

    assert_eq!(session.state, StressState::Completed);
    assert!(session.abort_reason.is_none());
    assert!(session.load_stopped_in_grace);
    assert!(session.samples.iter().all(|s| s.metric_id() == "gpu_temp"));
}

#[tokio::test(start_paused = true)]
async fn test_stubborn_load_is_aborted_after_grace() {
    let session = runner(vec![60.0], Arc::new(StubbornLoad), Duration::from_secs(2))
        .run(CancellationToken::new())
        .await;

    assert_eq!(session.state, StressState::Completed);
    assert!(!session.load_stopped_in_grace);
}

#[tokio::test(start_paused = true)]
async fn test_failed_samples_do_not_abort() {
    let sampler = Arc::new(FailingScanner {
        name: "gpu",
        error: ScanError::Unsupported("no sensor".to_string()),
    });
    let session = StressRunner::new(
        StressKind::Gpu,
        sampler,
        Arc::new(IdleLoad),
        test_executor(1),
        StressOptions {
            safety_metric: "gpu_temp".to_string(),
            ..options(Duration::from_secs(2))
        },
    )
    .run(CancellationToken::new())
    .await;

    assert_eq!(session.state, StressState::Completed);
    assert!(!session.samples.is_empty());
    assert!(session.samples.iter().all(|s| s.severity == Severity::Unknown));
    assert!(session.samples.iter().all(|s| s.metric_id() == "gpu_temp"));
}
