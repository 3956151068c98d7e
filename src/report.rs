//! Aggregate of a completed run

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::result::ScanResult;
use crate::severity::{Severity, rollup};

/// Ordered, immutable collection of scan results
///
/// Export-only: the overall severity is derived in [`Report::new`] and a
/// report is never rebuilt from serialized form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    mode: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    results: Vec<ScanResult>,
    overall_severity: Severity,
}

/// Counts per severity over a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub ok: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
    pub failed: usize,
}

impl Report {
    pub fn new(
        mode: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        results: Vec<ScanResult>,
    ) -> Self {
        let overall_severity = rollup(results.iter().map(ScanResult::severity));
        Self {
            mode: mode.into(),
            started_at,
            finished_at,
            results,
            overall_severity,
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn results(&self) -> &[ScanResult] {
        &self.results
    }

    pub fn overall_severity(&self) -> Severity {
        self.overall_severity
    }

    pub fn result(&self, scanner_name: &str) -> Option<&ScanResult> {
        self.results
            .iter()
            .find(|r| r.scanner_name() == scanner_name)
    }

    pub fn summary(&self) -> Summary {
        self.results
            .iter()
            .fold(Summary::default(), |mut summary, result| {
                match result.severity() {
                    Severity::Ok => summary.ok += 1,
                    Severity::Warning => summary.warning += 1,
                    Severity::Critical => summary.critical += 1,
                    Severity::Unknown => summary.unknown += 1,
                }
                if result.is_failure() {
                    summary.failed += 1;
                }
                summary
            })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_json(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let json = self.to_json().context("failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))
    }
}

/// Plain-text console rendering
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Diagnostic report ({}), started {}",
            self.mode,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(f)?;

        for result in &self.results {
            writeln!(
                f,
                "[{:<8}] {:<14} {:>6} ms",
                result.severity().label(),
                result.scanner_name(),
                result.duration().as_millis()
            )?;

            if let Some(error) = result.error() {
                writeln!(f, "    {}: {}", error.kind, error.message)?;
            }

            for m in result.measurements() {
                writeln!(
                    f,
                    "    {:<20} {:>10} {:<4} {}",
                    m.metric_id(),
                    m.value().to_string(),
                    m.measurement.unit,
                    m.severity.label()
                )?;
            }
        }

        let summary = self.summary();
        writeln!(f)?;
        writeln!(
            f,
            "Overall: {}  ({} ok, {} warning, {} critical, {} unknown, {} failed) in {:.1}s",
            self.overall_severity,
            summary.ok,
            summary.warning,
            summary.critical,
            summary.unknown,
            summary.failed,
            self.duration().as_secs_f64()
        )
    }
}
