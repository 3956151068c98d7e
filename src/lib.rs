//! Diagnostic orchestration engine
//!
//! Runs independent diagnostic scanners concurrently under per-scanner
//! deadlines, classifies their measurements against a threshold policy and
//! rolls the results up into a [`Report`]. On top of the engine sit a
//! bounded [`stress`] runner and a [`monitor`] loop for live sampling.

pub mod config;
pub mod engine;
pub mod error;
pub mod measurement;
pub mod monitor;
pub mod report;
pub mod result;
pub mod scanner;
pub mod scanners;
pub mod severity;
pub mod stress;
pub mod thresholds;
pub mod util;

pub use config::Config;
pub use engine::{Engine, EngineOptions, Executor, ScanEvent, ScanMode};
pub use error::{ConfigError, EngineError, FailureKind, ScanError, StressError};
pub use measurement::{ClassifiedMeasurement, Measurement, MetricValue, RawMeasurement};
pub use report::{Report, Summary};
pub use result::{FailureRecord, ScanResult};
pub use scanner::{ExecutionContext, Group, ScanContext, ScanOutcome, Scanner};
pub use severity::Severity;
pub use thresholds::{Direction, Threshold, ThresholdPolicy};
