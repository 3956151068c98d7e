use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::stress::StressKind;
use crate::thresholds::{Threshold, ThresholdPolicy};
use crate::util;

/// Top-level configuration, read from a TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub modes: ModesConfig,

    /// Per-metric overrides of the built-in thresholds
    pub thresholds: HashMap<String, Threshold>,

    pub stress: StressConfig,
    pub monitor: MonitorConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of scanners in flight (defaults to a modest share of the host)
    pub workers: Option<usize>,

    /// Timeout for scanners that do not declare their own
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// How long to wait for a cancelled scanner before abandoning it
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            default_timeout_secs: default_timeout_secs(),
            grace_ms: default_grace_ms(),
        }
    }
}

impl EngineConfig {
    /// Worker cap: env override, then config, then `min(4, cores)`
    pub fn workers(&self) -> usize {
        util::get_workers()
            .or(self.workers)
            .unwrap_or_else(default_workers)
            .max(1)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(4)
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_grace_ms() -> u64 {
    500
}

/// Scanner membership of the non-group modes
#[derive(Debug, Clone, Deserialize)]
pub struct ModesConfig {
    #[serde(default = "default_quick_mode")]
    pub quick: Vec<String>,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            quick: default_quick_mode(),
        }
    }
}

fn default_quick_mode() -> Vec<String> {
    ["cpu", "memory", "storage", "ports", "connectivity"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StressConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Upper bound for load generation to stop after the stop signal
    #[serde(default = "default_stress_grace_ms")]
    pub grace_ms: u64,

    /// Metric whose critical classification aborts the session, keyed by kind
    #[serde(default)]
    pub safety_metrics: HashMap<String, String>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            grace_ms: default_stress_grace_ms(),
            safety_metrics: HashMap::new(),
        }
    }
}

impl StressConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn safety_metric(&self, kind: StressKind) -> String {
        self.safety_metrics
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| kind.default_safety_metric().to_string())
    }
}

fn default_sample_interval_ms() -> u64 {
    1000
}

fn default_stress_grace_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval_ms")]
    pub interval_ms: u64,

    /// Per-scanner timeout within a single tick
    #[serde(default = "default_tick_timeout_ms")]
    pub tick_timeout_ms: u64,

    /// Lightweight scanners sampled on every tick
    #[serde(default = "default_monitor_scanners")]
    pub scanners: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_monitor_interval_ms(),
            tick_timeout_ms: default_tick_timeout_ms(),
            scanners: default_monitor_scanners(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_millis(self.tick_timeout_ms)
    }
}

fn default_monitor_interval_ms() -> u64 {
    1000
}

fn default_tick_timeout_ms() -> u64 {
    800
}

fn default_monitor_scanners() -> Vec<String> {
    ["cpu", "gpu", "memory", "storage"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Targets probed by the network and security scanners
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// `host:port` pairs for the TCP reachability probe
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,

    #[serde(default = "default_dns_names")]
    pub dns_names: Vec<String>,

    #[serde(default = "default_http_targets")]
    pub http_targets: Vec<String>,

    /// Local ports considered risky when something listens on them
    #[serde(default = "default_risky_ports")]
    pub risky_ports: Vec<u16>,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            dns_names: default_dns_names(),
            http_targets: default_http_targets(),
            risky_ports: default_risky_ports(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn default_targets() -> Vec<String> {
    ["8.8.8.8:53", "1.1.1.1:53", "208.67.222.222:53"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_dns_names() -> Vec<String> {
    ["google.com", "microsoft.com", "cloudflare.com"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_http_targets() -> Vec<String> {
    [
        "https://www.google.com",
        "https://www.microsoft.com",
        "https://www.cloudflare.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_risky_ports() -> Vec<u16> {
    vec![21, 23, 135, 139, 445, 3389, 5900]
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

impl Config {
    /// Load configuration.
    ///
    /// Lookup order: explicit `path`, the `TCPD_CONFIG` environment variable,
    /// `<config dir>/tcpd/config.toml`, built-in defaults. An explicitly
    /// named file that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| util::get_config_path().map(PathBuf::from));

        let config_path = explicit.or_else(|| {
            let default_path = dirs::config_dir()?.join("tcpd").join("config.toml");
            default_path.exists().then_some(default_path)
        });

        match config_path {
            Some(path) => read_config_file(&path),
            None => {
                debug!("no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Threshold policy for this run (defaults merged with overrides)
    pub fn policy(&self) -> Result<ThresholdPolicy, ConfigError> {
        ThresholdPolicy::with_overrides(self.thresholds.clone())
    }
}

pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_config(&content, path).inspect(|config| trace!("loaded config: {config:?}"))
}

fn parse_config(content: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let durations = [
        ("engine.default_timeout_secs", config.engine.default_timeout_secs),
        ("monitor.interval_ms", config.monitor.interval_ms),
        ("monitor.tick_timeout_ms", config.monitor.tick_timeout_ms),
        ("stress.sample_interval_ms", config.stress.sample_interval_ms),
        ("network.probe_timeout_ms", config.network.probe_timeout_ms),
    ];
    if let Some((key, _)) = durations.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
    }

    Ok(config)
}
