//! Point-in-time hardware readings.
//!
//! Providers never fail: a reading that could not be taken is `None`.

pub mod cpu;
pub mod gpu;

pub use cpu::CpuMonitor;
pub use gpu::{GpuMonitor, GpuStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuReading {
    pub percent: Option<f64>,
    pub vram_mb: Option<u64>,
}

pub trait TelemetryProvider: Send {
    fn read_cpu_percent(&mut self) -> Option<f64>;

    fn read_cpu_temperature(&mut self) -> Option<f64>;

    fn read_gpu(&mut self) -> GpuReading;
}

impl<T: TelemetryProvider + ?Sized> TelemetryProvider for Box<T> {
    fn read_cpu_percent(&mut self) -> Option<f64> {
        (**self).read_cpu_percent()
    }

    fn read_cpu_temperature(&mut self) -> Option<f64> {
        (**self).read_cpu_temperature()
    }

    fn read_gpu(&mut self) -> GpuReading {
        (**self).read_gpu()
    }
}

/// Host telemetry: sysinfo for the CPU, `nvidia-smi` for the GPU.
pub struct SystemTelemetry {
    cpu: CpuMonitor,
    gpu: GpuMonitor,
    last_gpu_temperature: Option<f64>,
}

impl SystemTelemetry {
    pub fn new() -> Self {
        Self {
            cpu: CpuMonitor::new(),
            gpu: GpuMonitor::new(),
            last_gpu_temperature: None,
        }
    }
}

impl Default for SystemTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryProvider for SystemTelemetry {
    fn read_cpu_percent(&mut self) -> Option<f64> {
        self.cpu.utilization()
    }

    // Boards without an exposed CPU sensor still report the GPU die.
    fn read_cpu_temperature(&mut self) -> Option<f64> {
        self.cpu.temperature().or(self.last_gpu_temperature)
    }

    fn read_gpu(&mut self) -> GpuReading {
        match self.gpu.primary() {
            Some(status) => {
                self.last_gpu_temperature = status.temperature;
                GpuReading {
                    percent: status.load_percent,
                    vram_mb: status.vram_mb,
                }
            }
            None => GpuReading::default(),
        }
    }
}
