//! Data shared between the workloads, the sampler and the analysis stage.

use crate::config::BenchmarkKind;
use crate::error::BenchError;
use serde::{Deserialize, Serialize};

/// One sampler tick.
///
/// Readings that could not be taken are `None` rather than `0.0`, so "idle"
/// and "unknown" stay distinguishable. The `*_or_zero` accessors give the
/// normalized view used for averaging and display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub time_offset: u64,
    pub cpu_percent: Option<f64>,
    pub gpu_percent: Option<f64>,
    pub temperature_celsius: Option<f64>,
}

impl TelemetrySample {
    pub fn cpu_or_zero(&self) -> f64 {
        self.cpu_percent.unwrap_or(0.0)
    }

    pub fn gpu_or_zero(&self) -> f64 {
        self.gpu_percent.unwrap_or(0.0)
    }

    pub fn temp_or_zero(&self) -> f64 {
        self.temperature_celsius.unwrap_or(0.0)
    }

    /// True when at least one sensor answered on this tick.
    pub fn has_any_reading(&self) -> bool {
        self.cpu_percent.is_some() || self.gpu_percent.is_some() || self.temperature_celsius.is_some()
    }
}

/// Raw outcome of a single workload invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadResult {
    pub score: f64,
    pub avg_utilization_percent: f64,
    pub elapsed_seconds: f64,
}

impl WorkloadResult {
    /// Result reported when a workload could not run at all.
    pub fn zeroed(elapsed_seconds: f64) -> Self {
        Self {
            score: 0.0,
            avg_utilization_percent: 0.0,
            elapsed_seconds,
        }
    }
}

/// Groups comparable machines: same CPU and GPU model, RAM bucketed to 0.5 GB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub cpu_model: String,
    pub gpu_model: String,
    pub ram_gb: f64,
}

impl Fingerprint {
    pub const RAM_TOLERANCE_GB: f64 = 0.5;

    pub fn new(cpu_model: impl Into<String>, gpu_model: impl Into<String>, ram_gb: f64) -> Self {
        Self {
            cpu_model: cpu_model.into(),
            gpu_model: gpu_model.into(),
            ram_gb: bucket_ram(ram_gb),
        }
    }

    /// Same models, RAM within the bucketing tolerance.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.cpu_model == other.cpu_model
            && self.gpu_model == other.gpu_model
            && (self.ram_gb - other.ram_gb).abs() <= Self::RAM_TOLERANCE_GB
    }
}

fn bucket_ram(ram_gb: f64) -> f64 {
    if ram_gb.is_finite() && ram_gb > 0.0 {
        (ram_gb * 2.0).round() / 2.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    /// Identity assigned by the persistence layer, if the record was stored.
    #[serde(default)]
    pub id: Option<u64>,
    /// Opaque owner key assigned by the caller.
    #[serde(default)]
    pub owner: Option<String>,
    pub kind: BenchmarkKind,
    pub fingerprint: Fingerprint,
    pub cpu_score: f64,
    pub gpu_score: f64,
    pub overall_score: f64,
    pub cpu_utilization: f64,
    pub gpu_utilization: f64,
    pub avg_temp: f64,
    #[serde(default)]
    pub peak_temp: f64,
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub samples: Vec<TelemetrySample>,
    #[serde(default)]
    pub faults: Vec<BenchError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDescriptor {
    pub name: String,
    pub vram_gb: Option<f64>,
}

/// Best-effort description of the machine's capacity. Every field has a
/// default so a partial inventory still yields a (degraded) verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSnapshot {
    pub logical_threads: usize,
    pub total_ram_gb: f64,
    pub gpu_descriptors: Vec<GpuDescriptor>,
    pub disk_total_gb: f64,
}

impl Default for HardwareSnapshot {
    fn default() -> Self {
        Self {
            logical_threads: 1,
            total_ram_gb: 0.0,
            gpu_descriptors: Vec::new(),
            disk_total_gb: 0.0,
        }
    }
}

/// Ordered from worst to best so that `Excellent > Good > Moderate > Poor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Health {
    Poor,
    Moderate,
    Good,
    Excellent,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Health::Poor => "Poor",
            Health::Moderate => "Moderate",
            Health::Good => "Good",
            Health::Excellent => "Excellent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckVerdict {
    pub overall_health: Health,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl BottleneckVerdict {
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.issues
            .iter()
            .zip(self.recommendations.iter())
            .map(|(issue, rec)| (issue.as_str(), rec.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspectedComponent {
    Cpu,
    Gpu,
    RamIo,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub cohort_size: usize,
    pub top_score: f64,
    pub user_rank: Option<usize>,
    pub efficiency_percent: f64,
    pub suspected_component: SuspectedComponent,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
