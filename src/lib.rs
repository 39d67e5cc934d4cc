//! CPU/GPU stress benchmarking: saturating workloads, concurrent telemetry
//! sampling, score derivation, peer comparison and bottleneck detection.

pub mod analysis;
pub mod config;
pub mod error;
pub mod inventory;
pub mod model;
pub mod orchestrator;
pub mod sampler;
pub mod telemetry;
pub mod workload;

pub use analysis::{BottleneckAnalyzer, ComparisonEngine, UtilizationProfile};
pub use config::{BenchmarkKind, Config};
pub use error::BenchError;
pub use inventory::HardwareInventory;
pub use model::{
    BenchmarkRecord, BottleneckVerdict, ComparisonResult, Fingerprint, GpuDescriptor, HardwareSnapshot, Health,
    SuspectedComponent, TelemetrySample, WorkloadResult,
};
pub use orchestrator::BenchmarkOrchestrator;
pub use sampler::{Sampler, SeriesStats};
pub use workload::{CpuWorkload, GpuWorkload, StopSignal, Workload, WorkloadOutcome};
