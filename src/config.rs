use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub kind: BenchmarkKind,
    pub cpu_duration: Duration,
    pub gpu_duration: Duration,
    pub threads: usize,
    pub matrix_dimension: usize,
    pub chunk_length: usize,
    pub repeats_per_cycle: usize,
    pub sample_count: usize,
    pub sample_interval: Option<Duration>,
    pub pin_workers: bool,
    pub monitor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kind: BenchmarkKind::Cpu,
            cpu_duration: Duration::from_secs(10),
            gpu_duration: Duration::from_secs(10),
            threads: num_cpus::get(),
            matrix_dimension: 300,
            chunk_length: 8_000_000,
            repeats_per_cycle: 4,
            sample_count: 3,
            sample_interval: None,
            pin_workers: true,
            monitor: false,
        }
    }
}

impl Config {
    /// Load a config from a JSON file. Fields that are missing keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        let zero_checks = [
            ("threads", self.threads),
            ("matrix_dimension", self.matrix_dimension),
            ("chunk_length", self.chunk_length),
            ("repeats_per_cycle", self.repeats_per_cycle),
            ("sample_count", self.sample_count),
        ];
        for (name, value) in zero_checks {
            if value == 0 {
                return Err(BenchError::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

/// Parse a human-readable duration (e.g., "10", "10s", "2m")
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();
    let (num_str, multiplier) = if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid duration: {}", s))?;

    let secs = num
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Invalid duration: {}", s))?;
    Ok(Duration::from_secs(secs))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkKind {
    Cpu,
    Gpu,
    Hybrid, // CPU and GPU concurrently
}

impl BenchmarkKind {
    pub fn runs_cpu(&self) -> bool {
        matches!(self, BenchmarkKind::Cpu | BenchmarkKind::Hybrid)
    }

    pub fn runs_gpu(&self) -> bool {
        matches!(self, BenchmarkKind::Gpu | BenchmarkKind::Hybrid)
    }

    /// Length of the sampling window: the longest workload that will run.
    pub fn window(&self, cpu_duration: Duration, gpu_duration: Duration) -> Duration {
        match self {
            BenchmarkKind::Cpu => cpu_duration,
            BenchmarkKind::Gpu => gpu_duration,
            BenchmarkKind::Hybrid => cpu_duration.max(gpu_duration),
        }
    }
}

impl std::fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BenchmarkKind::Cpu => "cpu",
            BenchmarkKind::Gpu => "gpu",
            BenchmarkKind::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for BenchmarkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(BenchmarkKind::Cpu),
            "gpu" => Ok(BenchmarkKind::Gpu),
            "hybrid" | "cpu+gpu" => Ok(BenchmarkKind::Hybrid),
            _ => Err(anyhow::anyhow!(
                "Invalid benchmark kind: {}. Valid options: cpu, gpu, hybrid",
                s
            )),
        }
    }
}
