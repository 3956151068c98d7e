//! Severity levels and rollup
//!
//! Severities are totally ordered: `Ok < Warning < Critical < Unknown`.
//! `Unknown` sorts last so that a plain `max` treats "no data" as the worst
//! case. Callers that want to ignore missing data use [`rollup_known`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a measurement or an aggregate of measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
    /// Scanner failed or produced no usable data
    Unknown,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }

    /// Process exit code used by the command surface
    pub fn exit_code(&self) -> i32 {
        match self {
            Severity::Ok | Severity::Warning => 0,
            Severity::Critical => 1,
            Severity::Unknown => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fold severities into the worst one. An empty input is `Unknown`.
pub fn rollup<I>(severities: I) -> Severity
where
    I: IntoIterator<Item = Severity>,
{
    severities.into_iter().max().unwrap_or(Severity::Unknown)
}

/// Like [`rollup`], but ignores `Unknown` entries.
///
/// Returns `Unknown` only if nothing else is left.
pub fn rollup_known<I>(severities: I) -> Severity
where
    I: IntoIterator<Item = Severity>,
{
    severities
        .into_iter()
        .filter(|s| *s != Severity::Unknown)
        .max()
        .unwrap_or(Severity::Unknown)
}
