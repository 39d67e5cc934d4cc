use crate::model::{round2, Fingerprint, GpuDescriptor, HardwareSnapshot};
use crate::telemetry::{CpuMonitor, GpuMonitor, GpuStatus};
use sysinfo::{Disks, System};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Best-effort hardware inventory. Nothing here fails: unknown values fall
/// back to the `HardwareSnapshot` defaults.
pub struct HardwareInventory {
    system: System,
    cpu: CpuMonitor,
    gpu: GpuMonitor,
}

impl HardwareInventory {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system,
            cpu: CpuMonitor::new(),
            gpu: GpuMonitor::new(),
        }
    }

    pub fn snapshot(&mut self) -> HardwareSnapshot {
        self.system.refresh_memory();
        let disks = Disks::new_with_refreshed_list();
        let disk_bytes: u64 = disks.iter().map(|d| d.total_space()).sum();

        HardwareSnapshot {
            logical_threads: self.logical_threads(),
            total_ram_gb: self.total_ram_gb(),
            gpu_descriptors: self.gpu.query().iter().map(describe_gpu).collect(),
            disk_total_gb: round2(disk_bytes as f64 / BYTES_PER_GB),
        }
    }

    /// Grouping key for peer comparison.
    pub fn fingerprint(&mut self) -> Fingerprint {
        let cpu_model = self.cpu.brand().unwrap_or_else(|| "Unknown CPU".to_string());
        let gpu_model = self
            .gpu
            .primary()
            .map(|status| status.name)
            .unwrap_or_else(|| "Unknown GPU".to_string());
        Fingerprint::new(cpu_model, gpu_model, self.total_ram_gb())
    }

    fn logical_threads(&self) -> usize {
        match self.cpu.logical_threads() {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }

    fn total_ram_gb(&self) -> f64 {
        round2(self.system.total_memory() as f64 / BYTES_PER_GB)
    }
}

impl Default for HardwareInventory {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_gpu(status: &GpuStatus) -> GpuDescriptor {
    GpuDescriptor {
        name: status.name.clone(),
        vram_gb: status.vram_mb.map(|mb| round2(mb as f64 / 1024.0)),
    }
}
