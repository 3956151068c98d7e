//! Load generators
//!
//! Each generator keeps the machine busy until its stop token fires. The
//! hot loops run on the blocking pool and poll the token between units of
//! work, so stopping takes at most one unit.

use std::hint::black_box;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use sysinfo::System;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::StressError;

/// Something that generates load until told to stop
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    /// Generate load at `intensity` until `stop` fires or the load fails
    async fn run(&self, intensity: u32, stop: CancellationToken) -> Result<(), StressError>;
}

fn logical_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Busy-loops one blocking worker per intensity unit
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuLoad;

impl CpuLoad {
    /// Worker count for `intensity`; zero means one per logical core
    pub fn workers(intensity: u32) -> usize {
        let cores = logical_cores();
        match intensity as usize {
            0 => cores,
            n => n.min(cores * 2),
        }
    }
}

#[async_trait]
impl LoadGenerator for CpuLoad {
    async fn run(&self, intensity: u32, stop: CancellationToken) -> Result<(), StressError> {
        let workers = Self::workers(intensity);
        debug!("starting {workers} cpu workers");

        let handles = (0..workers).map(|worker| {
            let stop = stop.clone();
            spawn_blocking(move || {
                let mut acc = worker as f64 + 1.0;
                let mut rounds: u64 = 0;
                while !stop.is_cancelled() {
                    for i in 0..10_000u32 {
                        acc = black_box(acc.sqrt() * 1.000_001 + f64::from(i));
                    }
                    rounds += 1;
                }
                rounds
            })
        });

        for (worker, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(rounds) => trace!("cpu worker {worker} stopped after {rounds} rounds"),
                Err(e) => return Err(StressError::Failed(format!("cpu worker {worker}: {e}"))),
            }
        }

        Ok(())
    }
}

const DEFAULT_CHUNK_BYTES: usize = 64 * 1024 * 1024;
const PATTERNS: [u64; 2] = [0xAAAA_AAAA_AAAA_AAAA, 0x5555_5555_5555_5555];
const VERIFY_PAUSE: Duration = Duration::from_millis(200);

/// Fills a share of available memory with alternating bit patterns and
/// verifies them on every pass
#[derive(Debug, Clone, Copy)]
pub struct MemoryLoad {
    budget_bytes: Option<u64>,
    chunk_bytes: usize,
}

impl Default for MemoryLoad {
    fn default() -> Self {
        Self {
            budget_bytes: None,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

impl MemoryLoad {
    /// Fixed allocation instead of a share of available memory
    pub fn with_budget(budget_bytes: u64, chunk_bytes: usize) -> Self {
        Self {
            budget_bytes: Some(budget_bytes),
            chunk_bytes: chunk_bytes.max(8),
        }
    }

    fn budget(&self, intensity: u32) -> u64 {
        if let Some(budget) = self.budget_bytes {
            return budget;
        }

        let mut sys = System::new();
        sys.refresh_memory();
        let percent = u64::from(intensity.clamp(1, 90));
        sys.available_memory() / 100 * percent
    }
}

#[async_trait]
impl LoadGenerator for MemoryLoad {
    async fn run(&self, intensity: u32, stop: CancellationToken) -> Result<(), StressError> {
        let budget = self.budget(intensity);
        let chunk_words = self.chunk_bytes / std::mem::size_of::<u64>();
        let chunks = (budget / self.chunk_bytes as u64).max(1) as usize;
        debug!("allocating {chunks} chunks of {} bytes", self.chunk_bytes);

        let joined = spawn_blocking(move || exercise_memory(chunks, chunk_words, &stop)).await;

        match joined {
            Ok(0) => Ok(()),
            Ok(errors) => {
                warn!("memory verification found {errors} corrupted chunks");
                Err(StressError::MemoryErrors(errors))
            }
            Err(e) => Err(StressError::Failed(format!("memory worker: {e}"))),
        }
    }
}

/// Returns the number of chunks that failed verification
fn exercise_memory(chunks: usize, chunk_words: usize, stop: &CancellationToken) -> u64 {
    let mut blocks: Vec<Vec<u64>> = Vec::with_capacity(chunks);
    for _ in 0..chunks {
        if stop.is_cancelled() {
            return 0;
        }
        blocks.push(vec![PATTERNS[0]; chunk_words]);
    }

    let mut pass = 0usize;
    while !stop.is_cancelled() {
        let expected = PATTERNS[pass % 2];
        let next = PATTERNS[(pass + 1) % 2];

        let mut errors = 0u64;
        for block in &mut blocks {
            if block.iter().any(|word| black_box(*word) != expected) {
                errors += 1;
            }
            block.fill(next);
        }

        if errors > 0 {
            return errors;
        }

        pass += 1;
        std::thread::sleep(VERIFY_PAUSE);
    }

    trace!("memory load stopped after {pass} passes");
    0
}

const MIN_MATRIX: usize = 128;

/// Dense matrix workload standing in for GPU compute
///
/// No GPU compute backend is linked, so the session keeps the host busy
/// with the same multiply/transcendental kernel a device would run while
/// the GPU sensors are sampled.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpuLoad;

impl GpuLoad {
    /// Side length of the square matrices for `intensity` (1..=100)
    pub fn matrix_size(intensity: u32) -> usize {
        MIN_MATRIX + 3 * intensity.clamp(1, 100) as usize
    }
}

#[async_trait]
impl LoadGenerator for GpuLoad {
    async fn run(&self, intensity: u32, stop: CancellationToken) -> Result<(), StressError> {
        let size = Self::matrix_size(intensity);
        debug!("starting matrix workload with {size}x{size} operands");

        let joined = spawn_blocking(move || {
            let a = seeded_matrix(size, 1);
            let b = seeded_matrix(size, 2);
            let mut c = vec![0f32; size * size];
            let mut rounds: u64 = 0;
            while !stop.is_cancelled() {
                multiply(&a, &b, &mut c, size);
                let checksum: f32 = c.iter().map(|x| (x.sin() * x.cos()).abs().sqrt()).sum();
                black_box(checksum);
                rounds += 1;
            }
            rounds
        })
        .await;

        match joined {
            Ok(rounds) => {
                trace!("matrix workload stopped after {rounds} rounds");
                Ok(())
            }
            Err(e) => Err(StressError::Failed(format!("matrix worker: {e}"))),
        }
    }
}

fn seeded_matrix(size: usize, seed: u32) -> Vec<f32> {
    (0..size * size)
        .map(|i| ((i as u32).wrapping_mul(2_654_435_761).wrapping_add(seed) % 1000) as f32 / 1000.0)
        .collect()
}

/// `c = a * b` for row-major square matrices
fn multiply(a: &[f32], b: &[f32], c: &mut [f32], size: usize) {
    c.fill(0.0);
    for i in 0..size {
        for k in 0..size {
            let aik = a[i * size + k];
            let row = &b[k * size..(k + 1) * size];
            for (out, bkj) in c[i * size..(i + 1) * size].iter_mut().zip(row) {
                *out += aik * bkj;
            }
        }
    }
}
