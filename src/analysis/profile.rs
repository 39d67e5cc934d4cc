use crate::model::BenchmarkRecord;
use serde::Serialize;

/// RAM size treated as a full gauge.
const RAM_REFERENCE_GB: f64 = 32.0;
/// Temperature treated as a full gauge.
const TEMP_REFERENCE_CELSIUS: f64 = 100.0;

/// Per-component gauges (0..=100) for a record against the same owner's
/// history, used to chart where a machine sits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UtilizationProfile {
    pub cpu: f64,
    pub gpu: f64,
    pub ram: f64,
    pub temp: f64,
}

impl UtilizationProfile {
    /// CPU and GPU are scaled against the best score in `history` (never
    /// below 1); RAM and temperature against fixed references.
    pub fn from_history(latest: &BenchmarkRecord, history: &[BenchmarkRecord]) -> Self {
        let best = |score: fn(&BenchmarkRecord) -> f64| {
            history
                .iter()
                .map(score)
                .chain(std::iter::once(score(latest)))
                .fold(1.0, f64::max)
        };
        let cpu_max = best(|r| r.cpu_score);
        let gpu_max = best(|r| r.gpu_score);

        Self {
            cpu: gauge(latest.cpu_score, cpu_max),
            gpu: gauge(latest.gpu_score, gpu_max),
            ram: gauge(latest.fingerprint.ram_gb, RAM_REFERENCE_GB),
            temp: gauge(latest.avg_temp, TEMP_REFERENCE_CELSIUS),
        }
    }
}

fn gauge(value: f64, reference: f64) -> f64 {
    if !value.is_finite() || reference <= 0.0 {
        return 0.0;
    }
    (value / reference * 100.0).round().clamp(0.0, 100.0)
}
