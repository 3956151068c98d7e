use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Components, Disks, System};
use tracing::trace;

use crate::error::ScanError;
use crate::measurement::RawMeasurement;
use crate::scanner::{Group, ScanContext, ScanOutcome, Scanner};

use super::blocking;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

const CPU_SENSORS: [&str; 7] = ["cpu", "core", "package", "tctl", "tdie", "k10temp", "coretemp"];
const GPU_SENSORS: [&str; 5] = ["gpu", "amdgpu", "nouveau", "radeon", "nvidia"];

fn matches_any(label: &str, needles: &[&str]) -> bool {
    let label = label.to_ascii_lowercase();
    needles.iter().any(|needle| label.contains(needle))
}

/// Hottest reading among sensors whose label matches `needles`
fn max_temperature<'a, I>(sensors: I, needles: &[&str]) -> Option<f32>
where
    I: IntoIterator<Item = (&'a str, Option<f32>)>,
{
    sensors
        .into_iter()
        .filter(|(label, _)| matches_any(label, needles))
        .filter_map(|(_, temp)| temp.filter(|t| t.is_finite() && *t > 0.0))
        .reduce(f32::max)
}

fn sensor_temperature(needles: &[&str]) -> Option<f32> {
    let components = Components::new_with_refreshed_list();
    max_temperature(
        components.iter().map(|c| (c.label(), c.temperature())),
        needles,
    )
}

/// CPU usage and package temperature
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuScanner {
    with_frequency: bool,
}

impl CpuScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variant that also reports the average clock, for stress sampling
    pub fn sampler() -> Self {
        Self {
            with_frequency: true,
        }
    }
}

#[async_trait]
impl Scanner for CpuScanner {
    fn name(&self) -> &str {
        "cpu"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Hardware]
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(5))
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        let with_frequency = self.with_frequency;

        blocking(move || {
            let mut sys = System::new();
            sys.refresh_cpu_usage();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            sys.refresh_cpu_all();

            let cpus = sys.cpus();
            if cpus.is_empty() {
                return Err(ScanError::Unsupported("no CPU information available".to_string()));
            }

            let mut measurements = vec![RawMeasurement::new("cpu_usage", sys.global_cpu_usage(), "%")];

            if let Some(temp) = sensor_temperature(&CPU_SENSORS) {
                measurements.push(RawMeasurement::new("cpu_temp", temp, "°C"));
            }

            if with_frequency {
                let avg = cpus.iter().map(|cpu| cpu.frequency()).sum::<u64>() / cpus.len() as u64;
                measurements.push(RawMeasurement::new("cpu_freq_mhz", avg, "MHz"));
            }

            trace!("cpu: {measurements:?}");
            Ok(measurements)
        })
        .await
    }
}

/// GPU temperature from a GPU-labelled sensor
#[derive(Debug, Default, Clone, Copy)]
pub struct GpuScanner;

#[async_trait]
impl Scanner for GpuScanner {
    fn name(&self) -> &str {
        "gpu"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Hardware]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        blocking(|| match sensor_temperature(&GPU_SENSORS) {
            Some(temp) => Ok(vec![RawMeasurement::new("gpu_temp", temp, "°C")]),
            None => Err(ScanError::Unsupported(
                "no GPU temperature sensor found".to_string(),
            )),
        })
        .await
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryScanner;

#[async_trait]
impl Scanner for MemoryScanner {
    fn name(&self) -> &str {
        "memory"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Hardware]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        blocking(|| {
            let mut sys = System::new();
            sys.refresh_memory();

            if sys.total_memory() == 0 {
                return Err(ScanError::Unsupported("memory totals unavailable".to_string()));
            }

            Ok(vec![
                RawMeasurement::new(
                    "memory_usage",
                    percent(sys.used_memory(), sys.total_memory()),
                    "%",
                ),
                RawMeasurement::new(
                    "swap_usage",
                    percent(sys.used_swap(), sys.total_swap()),
                    "%",
                ),
            ])
        })
        .await
    }
}

/// File systems that are always full or not backed by a disk
const IGNORED_FILESYSTEMS: [&str; 5] = ["squashfs", "iso9660", "tmpfs", "devtmpfs", "udf"];

/// `(usage %, free GiB)` of the fullest disk
fn worst_disk(disks: &[(u64, u64)]) -> Option<(f64, f64)> {
    let usage = disks
        .iter()
        .map(|(total, available)| percent(total.saturating_sub(*available), *total))
        .reduce(f64::max)?;
    let free = disks
        .iter()
        .map(|(_, available)| *available as f64 / GIB)
        .reduce(f64::min)?;
    Some((usage, free))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StorageScanner;

#[async_trait]
impl Scanner for StorageScanner {
    fn name(&self) -> &str {
        "storage"
    }

    fn groups(&self) -> &[Group] {
        &[Group::Hardware]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        blocking(|| {
            let disks = Disks::new_with_refreshed_list();
            let sizes: Vec<(u64, u64)> = disks
                .iter()
                .filter(|disk| disk.total_space() > 0)
                .filter(|disk| {
                    let fs = disk.file_system().to_string_lossy().to_ascii_lowercase();
                    !IGNORED_FILESYSTEMS.contains(&fs.as_str())
                })
                .map(|disk| (disk.total_space(), disk.available_space()))
                .collect();

            let Some((usage, free)) = worst_disk(&sizes) else {
                return Err(ScanError::Unsupported("no disks found".to_string()));
            };

            Ok(vec![
                RawMeasurement::new("disk_usage", usage, "%"),
                RawMeasurement::new("disk_free_gb", free, "GB"),
            ])
        })
        .await
    }
}

/// Capacity lost relative to the design capacity, in percent
fn wear_percent(full: f64, design: f64) -> Option<f64> {
    (design > 0.0 && full > 0.0).then(|| ((1.0 - full / design) * 100.0).max(0.0))
}

/// Battery wear from the kernel's power supply class
#[derive(Debug, Default, Clone, Copy)]
pub struct BatteryScanner;

#[cfg(target_os = "linux")]
fn read_battery_wear() -> Result<f64, ScanError> {
    use std::fs;
    use std::path::Path;

    let read_number = |path: &Path| -> Option<f64> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    };

    let supplies = fs::read_dir("/sys/class/power_supply")
        .map_err(|e| ScanError::Unsupported(format!("no power supply information: {e}")))?;

    for entry in supplies.flatten() {
        let dir = entry.path();
        let is_battery = fs::read_to_string(dir.join("type"))
            .map(|t| t.trim() == "Battery")
            .unwrap_or(false);
        if !is_battery {
            continue;
        }

        for (full, design) in [
            ("energy_full", "energy_full_design"),
            ("charge_full", "charge_full_design"),
        ] {
            if let (Some(full), Some(design)) =
                (read_number(&dir.join(full)), read_number(&dir.join(design)))
                && let Some(wear) = wear_percent(full, design)
            {
                return Ok(wear);
            }
        }
    }

    Err(ScanError::Unsupported("no battery found".to_string()))
}

#[cfg(not(target_os = "linux"))]
fn read_battery_wear() -> Result<f64, ScanError> {
    Err(ScanError::Unsupported(
        "battery information not available on this platform".to_string(),
    ))
}

#[async_trait]
impl Scanner for BatteryScanner {
    fn name(&self) -> &str {
        "battery"
    }

    fn groups(&self) -> &[Group] {
        &[Group::System]
    }

    async fn run(&self, _ctx: ScanContext) -> ScanOutcome {
        blocking(|| {
            let wear = read_battery_wear()?;
            Ok(vec![RawMeasurement::new("battery_wear", wear, "%")])
        })
        .await
    }
}
