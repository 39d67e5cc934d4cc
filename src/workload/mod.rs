pub mod cpu;
pub mod gpu;
#[cfg(feature = "opencl")]
mod opencl;

pub use cpu::CpuWorkload;
pub use gpu::{GpuDevice, GpuWorkload};

use crate::error::BenchError;
use crate::model::WorkloadResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Externally settable stop flag shared by workers, the sampler and the caller.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleep until `deadline` or until the signal is raised, whichever is first.
    /// Returns true if the signal was raised.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        const POLL: Duration = Duration::from_millis(50);
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(POLL));
        }
    }
}

/// A workload result together with the faults recovered while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadOutcome {
    pub result: WorkloadResult,
    pub faults: Vec<BenchError>,
}

impl WorkloadOutcome {
    pub fn ok(result: WorkloadResult) -> Self {
        Self {
            result,
            faults: Vec::new(),
        }
    }

    pub fn degraded(result: WorkloadResult, fault: BenchError) -> Self {
        Self {
            result,
            faults: vec![fault],
        }
    }

    /// False when the workload failed with nothing to show for it. A missing
    /// compute device is a recovered zero result, not a failure.
    pub fn is_usable(&self) -> bool {
        self.result.score > 0.0
            || self
                .faults
                .iter()
                .all(|fault| matches!(fault, BenchError::DeviceUnavailable(_)))
    }
}

/// A bounded-duration saturation routine.
pub trait Workload: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run until `duration` elapses or `stop` is raised. Blocks the calling thread.
    fn run(&self, duration: Duration, stop: &StopSignal) -> WorkloadOutcome;
}

/// `count / elapsed`, or 0 when the window is too short to measure.
pub(crate) fn throughput(count: f64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds < 1e-3 {
        0.0
    } else {
        count / elapsed_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!other.is_stopped());
        stop.stop();
        assert!(other.is_stopped());
    }

    #[test]
    fn wait_returns_early_when_stopped() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.stop();
        });
        let start = Instant::now();
        assert!(stop.wait_until(start + Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_without_signal() {
        let stop = StopSignal::new();
        assert!(!stop.wait_until(Instant::now() + Duration::from_millis(30)));
    }

    #[test]
    fn throughput_guards_zero_elapsed() {
        assert_eq!(throughput(10.0, 0.0), 0.0);
        assert_eq!(throughput(10.0, 2.0), 5.0);
    }

    #[test]
    fn crashed_zero_result_is_unusable() {
        let crash = BenchError::worker("cpu-worker-0", "boom");
        assert!(!WorkloadOutcome::degraded(WorkloadResult::zeroed(1.0), crash.clone()).is_usable());
        let partial = WorkloadResult { score: 3.0, avg_utilization_percent: 0.0, elapsed_seconds: 1.0 };
        assert!(WorkloadOutcome::degraded(partial, crash).is_usable());
        assert!(WorkloadOutcome::ok(WorkloadResult::zeroed(0.0)).is_usable());
    }

    #[test]
    fn missing_device_is_a_recovered_result() {
        let missing = BenchError::DeviceUnavailable("none".into());
        assert!(WorkloadOutcome::degraded(WorkloadResult::zeroed(1.0), missing).is_usable());
    }
}
