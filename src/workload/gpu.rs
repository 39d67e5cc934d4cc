use crate::error::BenchError;
use crate::model::WorkloadResult;
use crate::telemetry::GpuMonitor;
use crate::workload::{throughput, StopSignal, Workload, WorkloadOutcome};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A compute device able to run the pointwise-addition kernel.
pub trait ComputeBackend: Send + Sync {
    fn device_name(&self) -> &str;

    /// Allocate `a`, `b` and `c` with `chunk_length` f32 elements each and
    /// build the kernel that computes `c[i] = a[i] + b[i]`.
    fn prepare<'a>(&'a self, chunk_length: usize) -> Result<Box<dyn VectorAddKernel + 'a>, BenchError>;
}

pub trait VectorAddKernel {
    /// Enqueue `repeats` dispatches over the whole buffer, then block until
    /// the device has drained them.
    fn run_cycle(&mut self, repeats: usize) -> Result<(), BenchError>;
}

/// Result of the one-time device capability check.
pub enum GpuDevice {
    Available(Box<dyn ComputeBackend>),
    Unavailable(String),
}

impl GpuDevice {
    /// Look for a usable GPU compute device.
    pub fn probe() -> Self {
        #[cfg(feature = "opencl")]
        {
            match super::opencl::OpenClBackend::discover() {
                Ok(backend) => {
                    info!("GPU workload device: {}", backend.device_name());
                    GpuDevice::Available(Box::new(backend))
                }
                Err(e) => {
                    info!("no OpenCL GPU available: {}", e);
                    GpuDevice::Unavailable(e.to_string())
                }
            }
        }
        #[cfg(not(feature = "opencl"))]
        {
            GpuDevice::Unavailable("built without the `opencl` feature".to_string())
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, GpuDevice::Available(_))
    }
}

impl std::fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuDevice::Available(backend) => f.debug_tuple("Available").field(&backend.device_name()).finish(),
            GpuDevice::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// Reads the device load counter; `None` when the driver doesn't say.
pub type LoadProbe = Box<dyn FnMut() -> Option<f64> + Send>;

/// Saturates the GPU with vector additions.
///
/// Each element add is counted as two elementary operations, so the score
/// is a GFLOP/s-style proxy rather than a true FLOP count.
pub struct GpuWorkload {
    device: GpuDevice,
    chunk_length: usize,
    repeats_per_cycle: usize,
    load_probe: Mutex<LoadProbe>,
}

impl GpuWorkload {
    pub fn new(device: GpuDevice, chunk_length: usize, repeats_per_cycle: usize) -> Self {
        let mut monitor = GpuMonitor::new();
        Self {
            device,
            chunk_length: chunk_length.max(1),
            repeats_per_cycle: repeats_per_cycle.max(1),
            load_probe: Mutex::new(Box::new(move || monitor.primary().and_then(|s| s.load_percent))),
        }
    }

    pub fn with_load_probe(mut self, probe: LoadProbe) -> Self {
        self.load_probe = Mutex::new(probe);
        self
    }

    fn sample_load(&self) -> Option<f64> {
        match self.load_probe.lock() {
            Ok(mut probe) => probe(),
            Err(_) => None,
        }
    }
}

impl Default for GpuWorkload {
    fn default() -> Self {
        Self::new(GpuDevice::probe(), 8_000_000, 4)
    }
}

impl Workload for GpuWorkload {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn run(&self, duration: Duration, stop: &StopSignal) -> WorkloadOutcome {
        let requested = duration.as_secs_f64();

        let backend = match &self.device {
            GpuDevice::Available(backend) => backend,
            GpuDevice::Unavailable(reason) => {
                return WorkloadOutcome::degraded(
                    WorkloadResult::zeroed(requested),
                    BenchError::DeviceUnavailable(reason.clone()),
                );
            }
        };

        let mut kernel = match backend.prepare(self.chunk_length) {
            Ok(kernel) => kernel,
            Err(e) => {
                warn!("GPU workload setup failed: {}", e);
                return WorkloadOutcome::degraded(WorkloadResult::zeroed(requested), e);
            }
        };

        info!(
            "GPU workload on {}: {} elements x {} dispatches per cycle, {:?}",
            backend.device_name(),
            self.chunk_length,
            self.repeats_per_cycle,
            duration
        );

        let start = Instant::now();
        let deadline = start + duration;
        let mut cycles: u64 = 0;
        let mut load_sum = 0.0;
        let mut load_samples: u32 = 0;

        while Instant::now() < deadline && !stop.is_stopped() {
            if let Err(e) = kernel.run_cycle(self.repeats_per_cycle) {
                warn!("GPU dispatch failed after {} cycles: {}", cycles, e);
                return WorkloadOutcome::degraded(WorkloadResult::zeroed(requested), e);
            }
            cycles += 1;

            if let Some(load) = self.sample_load() {
                load_sum += load;
                load_samples += 1;
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        let ops_per_cycle = 2.0 * self.chunk_length as f64 * self.repeats_per_cycle as f64;
        let score = throughput(ops_per_cycle * cycles as f64, elapsed) / 1e9;
        let avg_utilization_percent = if load_samples > 0 {
            load_sum / f64::from(load_samples)
        } else {
            0.0
        };

        info!(
            "GPU workload finished: {} cycles in {:.2}s ({:.4} GOP/s)",
            cycles, elapsed, score
        );

        WorkloadOutcome::ok(WorkloadResult {
            score,
            avg_utilization_percent,
            elapsed_seconds: elapsed,
        })
    }
}
