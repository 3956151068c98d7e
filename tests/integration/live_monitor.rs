//! Live monitor loop with synthetic scanners

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tcpd::monitor::{LiveMonitor, MonitorOptions, Snapshot};
use tcpd::{FailureKind, MetricValue, ScanError, Scanner, Severity};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

fn options(max_duration: Option<Duration>) -> MonitorOptions {
    MonitorOptions {
        interval: Duration::from_secs(1),
        tick_timeout: Duration::from_millis(500),
        max_duration,
    }
}

fn drain(mut rx: mpsc::Receiver<Snapshot>) -> Vec<Snapshot> {
    let mut snapshots = vec![];
    while let Ok(snapshot) = rx.try_recv() {
        snapshots.push(snapshot);
    }
    snapshots
}

#[tokio::test(start_paused = true)]
async fn test_ticks_until_max_duration() {
    let scanners: Vec<Arc<dyn Scanner>> = vec![Arc::new(ScriptedScanner::new(
        "cpu",
        "cpu_usage",
        vec![10.0, 20.0, 40.0, 40.0],
    ))];
    let monitor = LiveMonitor::new(scanners, test_executor(2), options(Some(Duration::from_millis(3500))));

    let (tx, rx) = mpsc::channel(64);
    let ticks = monitor.run(CancellationToken::new(), tx).await;
    let snapshots = drain(rx);

    assert_eq!(ticks, 4);
    assert_eq!(snapshots.len(), 4);
    assert_eq!(
        snapshots.iter().map(|s| s.tick).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );

    let deltas: Vec<_> = snapshots
        .iter()
        .map(|s| s.entry("cpu", "cpu_usage").unwrap().delta_per_sec)
        .collect();
    assert_eq!(deltas, vec![None, Some(10.0), Some(20.0), Some(0.0)]);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_the_loop() {
    let scanners: Vec<Arc<dyn Scanner>> = vec![Arc::new(FixedScanner::new("fixed", 10.0))];
    let monitor = LiveMonitor::new(scanners, test_executor(1), options(None));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        trigger.cancel();
    });

    let (tx, rx) = mpsc::channel(64);
    let ticks = monitor.run(cancel, tx).await;

    assert_eq!(ticks, 3);
    assert_eq!(drain(rx).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_receiver_stops_the_loop() {
    let scanners: Vec<Arc<dyn Scanner>> = vec![Arc::new(FixedScanner::new("fixed", 10.0))];
    let monitor = LiveMonitor::new(scanners, test_executor(1), options(None));

    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let ticks = monitor.run(CancellationToken::new(), tx).await;
    assert_eq!(ticks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_and_slow_scanners_do_not_stall_ticks() {
    let scanners: Vec<Arc<dyn Scanner>> = vec![
        Arc::new(FixedScanner::new("healthy", 60.0)),
        Arc::new(FailingScanner {
            name: "broken",
            error: ScanError::Unsupported("no sensor".to_string()),
        }),
        Arc::new(FixedScanner::new("slow", 10.0).delayed(Duration::from_secs(5))),
    ];
    let monitor = LiveMonitor::new(scanners, test_executor(4), options(Some(Duration::from_millis(2500))));

    let (tx, rx) = mpsc::channel(64);
    let ticks = monitor.run(CancellationToken::new(), tx).await;
    let snapshots = drain(rx);

    assert!(ticks >= 2);
    for snapshot in &snapshots {
        let names: Vec<_> = snapshot.scanners.iter().map(|s| s.scanner.as_str()).collect();
        assert_eq!(names, vec!["healthy", "broken", "slow"]);

        assert_eq!(snapshot.scanners[0].severity, Severity::Warning);
        assert_eq!(
            snapshot.entry("healthy", "test_metric").unwrap().value,
            MetricValue::Number(60.0)
        );

        let broken = snapshot.scanners[1].error.as_ref().unwrap();
        assert_eq!(broken.kind, FailureKind::Unsupported);

        // capped by the tick timeout
        let slow = snapshot.scanners[2].error.as_ref().unwrap();
        assert_eq!(slow.kind, FailureKind::Timeout);

        assert_eq!(snapshot.overall_severity(), Severity::Unknown);
    }
}
