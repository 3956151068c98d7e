//! Threshold policy
//!
//! Maps a metric identifier to its warning/critical boundaries and the
//! direction in which the metric becomes a problem:
//!
//! ```text
//! Direction::Above:
//!   value >= critical  → Critical
//!   value >= warning   → Warning
//!   otherwise          → Ok
//!
//! Direction::Below:
//!   value <= critical  → Critical
//!   value <= warning   → Warning
//!   otherwise          → Ok
//! ```
//!
//! Comparisons are inclusive on the trigger side. Metrics without an entry,
//! text values and NaN classify as `Unknown`; classification never fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ConfigError;
use crate::measurement::{ClassifiedMeasurement, Measurement, MetricValue};
use crate::severity::Severity;

/// Side on which a metric triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Larger is worse (temperatures, usage)
    Above,
    /// Smaller is worse (free space, reachable share of targets)
    Below,
}

/// Boundaries for a single metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub warning: f64,
    pub critical: f64,
    #[serde(default = "default_direction")]
    pub direction: Direction,
}

fn default_direction() -> Direction {
    Direction::Above
}

impl Threshold {
    pub const fn above(warning: f64, critical: f64) -> Self {
        Self {
            warning,
            critical,
            direction: Direction::Above,
        }
    }

    pub const fn below(warning: f64, critical: f64) -> Self {
        Self {
            warning,
            critical,
            direction: Direction::Below,
        }
    }

    pub fn evaluate(&self, value: f64) -> Severity {
        if value.is_nan() {
            return Severity::Unknown;
        }

        let (hits_critical, hits_warning) = match self.direction {
            Direction::Above => (value >= self.critical, value >= self.warning),
            Direction::Below => (value <= self.critical, value <= self.warning),
        };

        if hits_critical {
            Severity::Critical
        } else if hits_warning {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    fn validate(&self, metric: &str) -> Result<(), ConfigError> {
        if !self.warning.is_finite() || !self.critical.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                metric: metric.to_string(),
                reason: "bounds must be finite numbers".to_string(),
            });
        }

        let ordered = match self.direction {
            Direction::Above => self.critical >= self.warning,
            Direction::Below => self.critical <= self.warning,
        };

        if !ordered {
            return Err(ConfigError::InvalidThreshold {
                metric: metric.to_string(),
                reason: format!(
                    "critical bound {} is not beyond warning bound {} for direction {:?}",
                    self.critical, self.warning, self.direction
                ),
            });
        }

        Ok(())
    }
}

/// Read-only mapping of metric identifiers to thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    entries: HashMap<String, Threshold>,
}

impl ThresholdPolicy {
    /// Build a policy, rejecting inconsistent entries
    pub fn new(entries: HashMap<String, Threshold>) -> Result<Self, ConfigError> {
        for (metric, threshold) in &entries {
            threshold.validate(metric)?;
        }
        Ok(Self { entries })
    }

    /// Built-in defaults merged with `overrides` (overrides win)
    pub fn with_overrides(overrides: HashMap<String, Threshold>) -> Result<Self, ConfigError> {
        let mut entries = default_thresholds();
        entries.extend(overrides);
        Self::new(entries)
    }

    pub fn get(&self, metric_id: &str) -> Option<&Threshold> {
        self.entries.get(metric_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classify a value of `metric_id`
    pub fn classify(&self, metric_id: &str, value: &MetricValue) -> Severity {
        let Some(threshold) = self.entries.get(metric_id) else {
            trace!("no threshold for '{metric_id}'");
            return Severity::Unknown;
        };

        match value.as_f64() {
            Some(v) => threshold.evaluate(v),
            None => Severity::Unknown,
        }
    }

    pub fn classify_measurement(&self, measurement: Measurement) -> ClassifiedMeasurement {
        let severity = self.classify(&measurement.metric_id, &measurement.value);
        ClassifiedMeasurement {
            measurement,
            severity,
        }
    }
}

/// Thresholds used when the configuration does not override them
pub fn default_thresholds() -> HashMap<String, Threshold> {
    [
        ("cpu_temp", Threshold::above(75.0, 85.0)),
        ("cpu_usage", Threshold::above(80.0, 95.0)),
        ("gpu_temp", Threshold::above(80.0, 90.0)),
        ("memory_usage", Threshold::above(80.0, 90.0)),
        ("swap_usage", Threshold::above(50.0, 80.0)),
        ("disk_usage", Threshold::above(85.0, 95.0)),
        ("disk_free_gb", Threshold::below(20.0, 5.0)),
        ("battery_wear", Threshold::above(20.0, 40.0)),
        ("latency_ms", Threshold::above(200.0, 500.0)),
        ("dns_resolve_ms", Threshold::above(200.0, 1000.0)),
        ("dns_failures", Threshold::above(1.0, 3.0)),
        ("http_latency_ms", Threshold::above(1000.0, 3000.0)),
        ("http_failures", Threshold::above(1.0, 3.0)),
        ("reachable_percent", Threshold::below(99.0, 50.0)),
        ("network_adapters", Threshold::below(0.0, -1.0)),
        ("network_errors", Threshold::above(1.0, 1000.0)),
        ("risky_open_ports", Threshold::above(1.0, 3.0)),
        ("admin_accounts", Threshold::above(4.0, 8.0)),
        ("default_name_accounts", Threshold::above(1.0, 3.0)),
        ("process_count", Threshold::above(1000.0, 2500.0)),
        ("memory_errors", Threshold::above(1.0, 1.0)),
        ("uptime_days", Threshold::above(14.0, 60.0)),
    ]
    .into_iter()
    .map(|(metric, threshold)| (metric.to_string(), threshold))
    .collect()
}
