//! End-to-end scenarios with synthetic hardware scanners

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tcpd::{
    Engine, EngineOptions, ExecutionContext, FailureKind, Group, ScanError, ScanMode, Severity,
    Threshold, ThresholdPolicy,
};
use tokio::time::Instant;

use crate::helpers::*;

#[tokio::test]
async fn test_hot_cpu_is_critical() {
    let overrides = HashMap::from([("cpu_temp".to_string(), Threshold::above(75.0, 85.0))]);
    let policy = Arc::new(ThresholdPolicy::with_overrides(overrides).unwrap());

    let mut engine = Engine::new(policy, engine_options(2, Duration::from_secs(5)));
    engine.register(Arc::new(ScriptedScanner::new("cpu", "cpu_temp", vec![90.0])));

    let report = engine.run(ScanMode::Full).await.unwrap();

    let cpu = report.result("cpu").unwrap();
    assert_eq!(cpu.severity(), Severity::Critical);
    assert_eq!(cpu.measurement("cpu_temp").unwrap().severity, Severity::Critical);
    assert_eq!(report.overall_severity(), Severity::Critical);
}

#[tokio::test]
async fn test_hardware_mode_with_missing_gpu() {
    let mut engine = test_engine(4);
    engine.register(Arc::new(ScriptedScanner::new("cpu", "cpu_temp", vec![50.0])));
    engine.register(Arc::new(FailingScanner {
        name: "gpu",
        error: ScanError::Unsupported("no discrete GPU".to_string()),
    }));
    engine.register(Arc::new(ScriptedScanner::new("memory", "memory_usage", vec![40.0])));
    engine.register(Arc::new(ScriptedScanner::new("storage", "disk_usage", vec![60.0])));
    engine.register(Arc::new(
        FixedScanner::new("dns", 1.0).in_groups(vec![Group::Network]),
    ));

    let mode: ScanMode = "hardware".parse().unwrap();
    let report = engine.run(mode).await.unwrap();

    let names: Vec<_> = report.results().iter().map(|r| r.scanner_name()).collect();
    assert_eq!(names, vec!["cpu", "gpu", "memory", "storage"]);

    let gpu = report.result("gpu").unwrap();
    assert_eq!(gpu.severity(), Severity::Unknown);
    assert_eq!(gpu.error().unwrap().kind, FailureKind::Unsupported);

    for name in ["cpu", "memory", "storage"] {
        assert_eq!(report.result(name).unwrap().severity(), Severity::Ok, "{name}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_quick_mode_under_cap_of_two() {
    let names = ["one", "two", "three", "four", "five"];
    let options = EngineOptions {
        quick: names.iter().map(|n| n.to_string()).collect(),
        ..engine_options(2, Duration::from_secs(30))
    };

    let mut engine = Engine::new(test_policy(), options);
    for (i, name) in names.into_iter().enumerate() {
        let delay = Duration::from_secs(i as u64 + 1);
        engine.register(Arc::new(FixedScanner::new(name, 1.0).delayed(delay)));
    }

    let start = Instant::now();
    let report = engine.run(ScanMode::Quick).await.unwrap();

    assert_eq!(report.results().len(), 5);
    // ceil(5 / 2) slots of at most five seconds each
    assert!(start.elapsed() <= Duration::from_secs(15));
    // and strictly more than one slot, so the cap was in effect
    assert!(start.elapsed() > Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_ordering_survives_shuffled_delays() {
    let delays = [700, 300, 900, 100, 500, 200, 800, 0];
    let names = ["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7"];

    let mut engine = Engine::new(
        test_policy(),
        EngineOptions {
            workers: 3,
            default_timeout: Duration::from_secs(5),
            grace: Duration::from_millis(50),
            quick: vec![],
            exec: ExecutionContext::default(),
        },
    );
    for (name, delay) in names.into_iter().zip(delays) {
        engine.register(Arc::new(
            FixedScanner::new(name, 1.0).delayed(Duration::from_millis(delay)),
        ));
    }

    let report = engine.run(ScanMode::Full).await.unwrap();

    let order: Vec<_> = report.results().iter().map(|r| r.scanner_name()).collect();
    assert_eq!(order, names.to_vec());
}
