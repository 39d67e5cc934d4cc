use crate::model::{BottleneckVerdict, Health, HardwareSnapshot};

const MIN_THREADS: usize = 4;
const MIN_RAM_GB: f64 = 8.0;
const MIN_VRAM_GB: f64 = 4.0;
const MIN_DISK_GB: f64 = 128.0;

/// Static capacity check of a machine against fixed thresholds.
///
/// The rules run in a fixed order and each adds at most one
/// issue/recommendation pair (the VRAM rule adds one per weak GPU).
/// Only `Excellent`, `Moderate` and `Poor` are produced; `Good` is part of
/// the scale but no rule currently awards it.
#[derive(Debug, Default, Clone, Copy)]
pub struct BottleneckAnalyzer;

impl BottleneckAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, snapshot: &HardwareSnapshot) -> BottleneckVerdict {
        let mut findings: Vec<(String, String)> = Vec::new();
        let mut storage_critical = false;

        if snapshot.logical_threads <= MIN_THREADS {
            findings.push((
                "CPU has limited multithreading capability.".to_string(),
                "Consider upgrading to a 6+ core / 12-thread processor.".to_string(),
            ));
        }

        if snapshot.total_ram_gb < MIN_RAM_GB {
            findings.push((
                format!("Only {} GB RAM detected.", snapshot.total_ram_gb),
                "Upgrade to at least 8 GB for general use or 16 GB for gaming/editing.".to_string(),
            ));
        }

        if snapshot.gpu_descriptors.is_empty() {
            findings.push((
                "No dedicated GPU detected.".to_string(),
                "Install a dedicated GPU for gaming, rendering or AI workloads.".to_string(),
            ));
        } else {
            for gpu in &snapshot.gpu_descriptors {
                // A zero VRAM figure means the driver didn't report it.
                if let Some(vram) = gpu.vram_gb.filter(|v| *v > 0.0 && *v < MIN_VRAM_GB) {
                    findings.push((
                        format!("{} has only {} GB VRAM.", gpu.name, vram),
                        "Consider upgrading to a GPU with 6-8 GB VRAM.".to_string(),
                    ));
                }
            }
        }

        if snapshot.disk_total_gb < MIN_DISK_GB {
            findings.push((
                "Total storage below 128 GB.".to_string(),
                "Use an SSD or larger drive for better performance.".to_string(),
            ));
            storage_critical = true;
        }

        let overall_health = if findings.is_empty() {
            Health::Excellent
        } else if storage_critical {
            Health::Poor
        } else {
            Health::Moderate
        };

        let (issues, recommendations) = findings.into_iter().unzip();
        BottleneckVerdict {
            overall_health,
            issues,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GpuDescriptor;

    fn ample() -> HardwareSnapshot {
        HardwareSnapshot {
            logical_threads: 16,
            total_ram_gb: 32.0,
            gpu_descriptors: vec![GpuDescriptor {
                name: "RTX 4070".to_string(),
                vram_gb: Some(12.0),
            }],
            disk_total_gb: 1000.0,
        }
    }

    #[test]
    fn ample_machine_is_excellent() {
        let verdict = BottleneckAnalyzer::new().evaluate(&ample());
        assert_eq!(verdict.overall_health, Health::Excellent);
        assert!(verdict.issues.is_empty());
        assert!(verdict.recommendations.is_empty());
    }

    #[test]
    fn small_disk_forces_poor() {
        let snapshot = HardwareSnapshot { disk_total_gb: 50.0, ..ample() };
        let verdict = BottleneckAnalyzer::new().evaluate(&snapshot);
        assert_eq!(verdict.overall_health, Health::Poor);
        assert_eq!(verdict.issues, vec!["Total storage below 128 GB.".to_string()]);
    }

    #[test]
    fn small_disk_dominates_other_issues() {
        let snapshot = HardwareSnapshot {
            logical_threads: 2,
            total_ram_gb: 4.0,
            gpu_descriptors: Vec::new(),
            disk_total_gb: 64.0,
        };
        let verdict = BottleneckAnalyzer::new().evaluate(&snapshot);
        assert_eq!(verdict.overall_health, Health::Poor);
        assert_eq!(verdict.issues.len(), 4);
        assert_eq!(verdict.issues[3], "Total storage below 128 GB.");
    }

    #[test]
    fn weak_machine_without_gpu_is_moderate() {
        let snapshot = HardwareSnapshot {
            logical_threads: 2,
            total_ram_gb: 4.0,
            gpu_descriptors: Vec::new(),
            disk_total_gb: 500.0,
        };
        let verdict = BottleneckAnalyzer::new().evaluate(&snapshot);
        assert_eq!(verdict.overall_health, Health::Moderate);
        assert_eq!(
            verdict.issues,
            vec![
                "CPU has limited multithreading capability.".to_string(),
                "Only 4 GB RAM detected.".to_string(),
                "No dedicated GPU detected.".to_string(),
            ]
        );
        assert_eq!(verdict.recommendations.len(), verdict.issues.len());
    }

    #[test]
    fn each_low_vram_gpu_is_named() {
        let snapshot = HardwareSnapshot {
            gpu_descriptors: vec![
                GpuDescriptor { name: "GT 710".to_string(), vram_gb: Some(2.0) },
                GpuDescriptor { name: "Mystery".to_string(), vram_gb: None },
                GpuDescriptor { name: "RTX 4070".to_string(), vram_gb: Some(12.0) },
                GpuDescriptor { name: "Quadro P400".to_string(), vram_gb: Some(2.5) },
            ],
            ..ample()
        };
        let verdict = BottleneckAnalyzer::new().evaluate(&snapshot);
        assert_eq!(verdict.overall_health, Health::Moderate);
        assert_eq!(
            verdict.issues,
            vec![
                "GT 710 has only 2 GB VRAM.".to_string(),
                "Quadro P400 has only 2.5 GB VRAM.".to_string(),
            ]
        );
    }

    #[test]
    fn defaulted_snapshot_degrades_instead_of_failing() {
        let verdict = BottleneckAnalyzer::new().evaluate(&HardwareSnapshot::default());
        assert_eq!(verdict.overall_health, Health::Poor);
        assert_eq!(verdict.pairs().count(), 4);
    }

    #[test]
    fn never_awards_good() {
        for threads in [1, 8] {
            for ram in [4.0, 16.0] {
                for disk in [64.0, 512.0] {
                    let snapshot = HardwareSnapshot {
                        logical_threads: threads,
                        total_ram_gb: ram,
                        disk_total_gb: disk,
                        ..ample()
                    };
                    assert_ne!(BottleneckAnalyzer::new().evaluate(&snapshot).overall_health, Health::Good);
                }
            }
        }
    }
}
