//! Configuration files driving engine behaviour

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tcpd::stress::{StressKind, StressOptions};
use tcpd::{
    Config, ConfigError, Engine, EngineOptions, ExecutionContext, MetricValue, ScanMode, Severity,
};

use crate::helpers::*;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_threshold_override_changes_classification() {
    let file = write_config(
        r#"
[modes]
quick = ["fast"]

[thresholds.test_metric]
warning = 5.0
critical = 8.0
"#,
    );
    let config = Config::load(Some(file.path())).unwrap();
    let policy = Arc::new(config.policy().unwrap());

    let mut engine = Engine::new(
        policy,
        EngineOptions::from_config(&config, ExecutionContext::default()),
    );
    engine.register(Arc::new(FixedScanner::new("fast", 10.0)));
    engine.register(Arc::new(FixedScanner::new("other", 1.0)));

    let report = engine.run(ScanMode::Quick).await.unwrap();

    assert_eq!(report.results().len(), 1);
    assert_eq!(report.overall_severity(), Severity::Critical);
}

#[test]
fn test_below_direction_from_file() {
    let file = write_config(
        r#"
[thresholds.disk_free_gb]
warning = 50.0
critical = 10.0
direction = "below"
"#,
    );
    let policy = Config::load(Some(file.path())).unwrap().policy().unwrap();

    assert_eq!(policy.classify("disk_free_gb", &MetricValue::Number(40.0)), Severity::Warning);
    assert_eq!(policy.classify("disk_free_gb", &MetricValue::Number(10.0)), Severity::Critical);
    assert_eq!(policy.classify("disk_free_gb", &MetricValue::Number(100.0)), Severity::Ok);
    // untouched defaults survive the merge
    assert_eq!(policy.classify("cpu_temp", &MetricValue::Number(50.0)), Severity::Ok);
}

#[test]
fn test_inverted_threshold_is_rejected() {
    let file = write_config(
        r#"
[thresholds.cpu_temp]
warning = 90.0
critical = 80.0
"#,
    );
    let config = Config::load(Some(file.path())).unwrap();

    assert_matches!(
        config.policy(),
        Err(ConfigError::InvalidThreshold { metric, .. }) if metric == "cpu_temp"
    );
}

#[test]
fn test_stress_section_feeds_options() {
    let file = write_config(
        r#"
[stress]
sample_interval_ms = 250
grace_ms = 100

[stress.safety_metrics]
cpu = "cpu_usage"
"#,
    );
    let config = Config::load(Some(file.path())).unwrap();

    let cpu = StressOptions::from_config(&config.stress, StressKind::Cpu, Duration::from_secs(5), None);
    assert_eq!(cpu.sample_interval, Duration::from_millis(250));
    assert_eq!(cpu.grace, Duration::from_millis(100));
    assert_eq!(cpu.safety_metric, "cpu_usage");
    assert_eq!(cpu.intensity, 0);

    let memory =
        StressOptions::from_config(&config.stress, StressKind::Memory, Duration::from_secs(5), Some(30));
    assert_eq!(memory.safety_metric, "swap_usage");
    assert_eq!(memory.intensity, 30);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    assert_matches!(Config::load(Some(missing.as_path())), Err(ConfigError::Read { .. }));
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = write_config("[engine\nworkers = ");
    assert_matches!(Config::load(Some(file.path())), Err(ConfigError::Parse { .. }));
}
