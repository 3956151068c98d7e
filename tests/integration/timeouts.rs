//! Deadlines, cancellation and the worker cap

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tcpd::{FailureKind, ScanMode, Severity};
use tokio::time::Instant;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_worker_cap_is_respected() {
    let (fleet, peak) = CountingScanner::fleet(5, Duration::from_millis(500));

    let mut engine = test_engine(2);
    engine.register_all(fleet);

    let report = engine.run(ScanMode::Full).await.unwrap();

    assert_eq!(report.results().len(), 5);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    let names: Vec<_> = report.results().iter().map(|r| r.scanner_name()).collect();
    assert_eq!(
        names,
        vec!["counting-0", "counting-1", "counting-2", "counting-3", "counting-4"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_yields_unknown_and_others_finish() {
    let mut engine = test_engine(4);
    engine.register(Arc::new(FixedScanner::new("quick", 10.0)));
    engine.register(Arc::new(HangingScanner {
        name: "hanging",
        timeout: Duration::from_secs(2),
        cooperative: true,
    }));
    engine.register(Arc::new(FixedScanner::new("delayed", 10.0).delayed(Duration::from_secs(1))));

    let start = Instant::now();
    let report = engine.run(ScanMode::Full).await.unwrap();

    let hanging = report.result("hanging").unwrap();
    assert_eq!(hanging.severity(), Severity::Unknown);
    assert_eq!(hanging.error().unwrap().kind, FailureKind::Timeout);

    assert_eq!(report.result("quick").unwrap().severity(), Severity::Ok);
    assert_eq!(report.result("delayed").unwrap().severity(), Severity::Ok);

    // bounded by the declared timeout plus grace, not the hour-long sleep
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_uncooperative_scanner_is_abandoned() {
    let mut engine = test_engine(1);
    engine.register(Arc::new(HangingScanner {
        name: "stubborn",
        timeout: Duration::from_millis(200),
        cooperative: false,
    }));
    engine.register(Arc::new(FixedScanner::new("next", 10.0)));

    let start = Instant::now();
    let report = engine.run(ScanMode::Full).await.unwrap();

    assert_eq!(
        report.result("stubborn").unwrap().error().unwrap().kind,
        FailureKind::Timeout
    );
    // the single worker slot was released for the next scanner
    assert_eq!(report.result("next").unwrap().severity(), Severity::Ok);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_applies_without_declaration() {
    let mut engine = tcpd::Engine::new(
        test_policy(),
        engine_options(2, Duration::from_millis(300)),
    );
    engine.register(Arc::new(FixedScanner::new("sleepy", 10.0).delayed(Duration::from_secs(10))));

    let report = engine.run(ScanMode::Full).await.unwrap();

    let sleepy = report.result("sleepy").unwrap();
    assert_eq!(sleepy.error().unwrap().kind, FailureKind::Timeout);
    assert!(sleepy.duration() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_run_single_bypasses_the_cap() {
    let executor = test_executor(1);
    let (fleet, peak) = CountingScanner::fleet(3, Duration::from_millis(100));

    let runs = fleet.into_iter().map(|scanner| {
        let executor = executor.clone();
        async move { executor.run_single(scanner).await }
    });
    let results = futures::future::join_all(runs).await;

    assert_eq!(results.len(), 3);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
}
