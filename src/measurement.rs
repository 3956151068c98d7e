//! Measurements produced by scanners
//!
//! A scanner returns [`RawMeasurement`]s. The engine stamps them with a
//! collection time and classifies them against the threshold policy, which
//! yields [`ClassifiedMeasurement`]s owned by a scan result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Value of a single data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl MetricValue {
    /// Numeric view used for threshold comparison.
    ///
    /// Flags compare as `1.0`/`0.0`; text is never comparable.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            MetricValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            MetricValue::Number(n) => write!(f, "{n:.1}"),
            MetricValue::Flag(b) => write!(f, "{}", if *b { "yes" } else { "no" }),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<f32> for MetricValue {
    fn from(value: f32) -> Self {
        MetricValue::Number(value as f64)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Number(value as f64)
    }
}

impl From<usize> for MetricValue {
    fn from(value: usize) -> Self {
        MetricValue::Number(value as f64)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Flag(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

/// Data point as returned by a scanner, before classification
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasurement {
    pub metric_id: String,
    pub value: MetricValue,
    pub unit: String,
}

impl RawMeasurement {
    pub fn new(
        metric_id: impl Into<String>,
        value: impl Into<MetricValue>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            metric_id: metric_id.into(),
            value: value.into(),
            unit: unit.into(),
        }
    }
}

/// Immutable, timestamped data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub metric_id: String,
    pub value: MetricValue,
    pub unit: String,
    pub collected_at: DateTime<Utc>,
}

impl Measurement {
    pub fn from_raw(raw: RawMeasurement, collected_at: DateTime<Utc>) -> Self {
        let RawMeasurement {
            metric_id,
            value,
            unit,
        } = raw;

        Self {
            metric_id,
            value,
            unit,
            collected_at,
        }
    }
}

/// Measurement together with its severity under the active policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedMeasurement {
    #[serde(flatten)]
    pub measurement: Measurement,
    pub severity: Severity,
}

impl ClassifiedMeasurement {
    pub fn metric_id(&self) -> &str {
        &self.measurement.metric_id
    }

    pub fn value(&self) -> &MetricValue {
        &self.measurement.value
    }
}
