//! Outcome of one scanner invocation

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, ScanError};
use crate::measurement::{ClassifiedMeasurement, Measurement};
use crate::scanner::{Group, ScanOutcome};
use crate::severity::{Severity, rollup};
use crate::thresholds::ThresholdPolicy;

/// Failure details attached to an `Unknown` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ScanError> for FailureRecord {
    fn from(err: &ScanError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Classified outcome of a single scanner run
///
/// Fields are read-only: the severity is always derived from the
/// measurements, so there is no way to build a result with a severity that
/// disagrees with its data. Export-only for the same reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    scanner_name: String,
    groups: Vec<Group>,
    measurements: Vec<ClassifiedMeasurement>,
    severity: Severity,
    #[serde(with = "crate::util::duration_ms")]
    duration: Duration,
    error: Option<FailureRecord>,
}

impl ScanResult {
    /// Classify a scanner outcome under `policy`
    pub fn from_outcome(
        scanner_name: impl Into<String>,
        groups: &[Group],
        outcome: ScanOutcome,
        policy: &ThresholdPolicy,
        duration: Duration,
    ) -> Self {
        let scanner_name = scanner_name.into();
        let groups = groups.to_vec();

        match outcome {
            Ok(raw) => {
                let collected_at = Utc::now();
                let measurements: Vec<_> = raw
                    .into_iter()
                    .map(|raw| policy.classify_measurement(Measurement::from_raw(raw, collected_at)))
                    .collect();
                let severity = rollup(measurements.iter().map(|m| m.severity));

                Self {
                    scanner_name,
                    groups,
                    measurements,
                    severity,
                    duration,
                    error: None,
                }
            }
            Err(err) => Self {
                scanner_name,
                groups,
                measurements: vec![],
                severity: Severity::Unknown,
                duration,
                error: Some(FailureRecord::from(&err)),
            },
        }
    }

    pub fn scanner_name(&self) -> &str {
        &self.scanner_name
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn measurements(&self) -> &[ClassifiedMeasurement] {
        &self.measurements
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error(&self) -> Option<&FailureRecord> {
        self.error.as_ref()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Measurement with the given metric id, if present
    pub fn measurement(&self, metric_id: &str) -> Option<&ClassifiedMeasurement> {
        self.measurements.iter().find(|m| m.metric_id() == metric_id)
    }
}
