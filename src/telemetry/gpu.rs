use std::io::ErrorKind;
use std::process::Command;
use tracing::{debug, warn};

const QUERY: &str = "--query-gpu=name,utilization.gpu,memory.total,temperature.gpu";

/// One GPU as reported by the vendor tool.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuStatus {
    pub name: String,
    pub load_percent: Option<f64>,
    pub vram_mb: Option<u64>,
    pub temperature: Option<f64>,
}

/// GPU load, VRAM and temperature through `nvidia-smi`.
///
/// If the tool cannot be spawned once, the monitor stays disabled for its
/// whole lifetime so a tight workload loop doesn't keep forking.
pub struct GpuMonitor {
    program: String,
    available: bool,
}

impl GpuMonitor {
    pub fn new() -> Self {
        Self::with_program("nvidia-smi")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            available: true,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// All GPUs the tool reports; empty when unavailable.
    pub fn query(&mut self) -> Vec<GpuStatus> {
        if !self.available {
            return Vec::new();
        }

        let output = match Command::new(&self.program)
            .args([QUERY, "--format=csv,noheader,nounits"])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    debug!("{} not found, GPU telemetry disabled", self.program);
                } else {
                    warn!("failed to run {}: {}", self.program, e);
                }
                self.available = false;
                return Vec::new();
            }
        };

        if !output.status.success() {
            debug!("{} exited with {}", self.program, output.status);
            return Vec::new();
        }

        parse_query_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Status of the first GPU, if any.
    pub fn primary(&mut self) -> Option<GpuStatus> {
        self.query().into_iter().next()
    }
}

impl Default for GpuMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `name, util, mem, temp` CSV lines. Fields the driver reports as
/// `[N/A]` or `[Not Supported]` become `None`.
pub(crate) fn parse_query_output(stdout: &str) -> Vec<GpuStatus> {
    stdout
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            let name = parts.first().filter(|n| !n.is_empty())?;
            let number = |idx: usize| parts.get(idx).and_then(|v| v.parse::<f64>().ok());

            Some(GpuStatus {
                name: name.to_string(),
                load_percent: number(1).map(|v| v.clamp(0.0, 100.0)),
                vram_mb: number(2).filter(|v| *v > 0.0).map(|v| v as u64),
                temperature: number(3),
            })
        })
        .collect()
}
