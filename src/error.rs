use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy for a benchmark run.
///
/// Everything except [`BenchError::Orchestration`] and
/// [`BenchError::InvalidConfig`] is recovered where it happens and travels
/// alongside the (defaulted) result instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BenchError {
    #[error("telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    #[error("no compatible compute device: {0}")]
    DeviceUnavailable(String),

    #[error("worker {worker} failed: {reason}")]
    WorkerFailure { worker: String, reason: String },

    #[error("benchmark produced no usable data: {0}")]
    Orchestration(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BenchError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BenchError::Orchestration(_) | BenchError::InvalidConfig(_))
    }

    pub(crate) fn worker(worker: impl Into<String>, reason: impl Into<String>) -> Self {
        BenchError::WorkerFailure {
            worker: worker.into(),
            reason: reason.into(),
        }
    }
}

/// Render a panic payload from a joined thread or task.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
