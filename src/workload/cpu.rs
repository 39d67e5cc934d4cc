use crate::error::{panic_message, BenchError};
use crate::model::WorkloadResult;
use crate::workload::{throughput, StopSignal, Workload, WorkloadOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Join wait after the stop signal beyond which shutdown counts as slow.
const JOIN_BUDGET: Duration = Duration::from_secs(2);

/// Saturates every logical core with dense matrix multiplications.
///
/// Score is completed multiplications per wall-clock second across all
/// workers. Utilization is left at zero: it is measured by the caller's
/// sampler, never by the workload itself.
#[derive(Debug, Clone)]
pub struct CpuWorkload {
    threads: usize,
    matrix_dimension: usize,
    pin_workers: bool,
    #[cfg(test)]
    failing_worker: Option<usize>,
}

impl CpuWorkload {
    pub fn new(threads: usize, matrix_dimension: usize) -> Self {
        Self {
            threads: threads.max(1),
            matrix_dimension: matrix_dimension.max(1),
            pin_workers: false,
            #[cfg(test)]
            failing_worker: None,
        }
    }

    /// One worker per logical core.
    pub fn per_core(matrix_dimension: usize) -> Self {
        Self::new(num_cpus::get(), matrix_dimension)
    }

    pub fn with_pinning(mut self, pin_workers: bool) -> Self {
        self.pin_workers = pin_workers;
        self
    }
}

impl Default for CpuWorkload {
    fn default() -> Self {
        Self::per_core(300)
    }
}

impl Workload for CpuWorkload {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn run(&self, duration: Duration, stop: &StopSignal) -> WorkloadOutcome {
        if duration.is_zero() || stop.is_stopped() {
            return WorkloadOutcome::ok(WorkloadResult::zeroed(0.0));
        }

        info!(
            "CPU workload: {} workers, {}x{} matrices, {:?}",
            self.threads, self.matrix_dimension, self.matrix_dimension, duration
        );

        let operations = Arc::new(AtomicU64::new(0));
        let workers_stop = StopSignal::new();
        let start = Instant::now();

        let mut faults = Vec::new();
        let mut handles = Vec::with_capacity(self.threads);
        let cores = num_cpus::get().max(1);
        for core in 0..self.threads {
            let operations = Arc::clone(&operations);
            let workers_stop = workers_stop.clone();
            let n = self.matrix_dimension;
            let pin = self.pin_workers;
            #[cfg(test)]
            let fails = self.failing_worker == Some(core);

            let spawned = thread::Builder::new()
                .name(format!("cpu-worker-{}", core))
                .spawn(move || {
                    if pin {
                        // Oversubscribed workers share cores round-robin.
                        if let Err(e) = pin_to_core(core % cores) {
                            debug!("worker {} not pinned: {}", core, e);
                        }
                    }
                    #[cfg(test)]
                    if fails {
                        run_worker_until(n, &operations, 1);
                        panic!("worker {} crashed", core);
                    }
                    run_worker(n, &operations, &workers_stop);
                });

            match spawned {
                Ok(handle) => handles.push((core, handle)),
                Err(e) => {
                    warn!("failed to spawn cpu worker {}: {}", core, e);
                    faults.push(BenchError::worker(format!("cpu-worker-{}", core), e.to_string()));
                }
            }
        }

        stop.wait_until(start + duration);
        workers_stop.stop();
        let stopped_at = Instant::now();

        // The counter is only read once every worker has been joined.
        for (core, handle) in handles {
            if let Err(payload) = handle.join() {
                let reason = panic_message(payload.as_ref());
                warn!("cpu worker {} panicked: {}", core, reason);
                faults.push(BenchError::worker(format!("cpu-worker-{}", core), reason));
            }
        }

        let join_wait = stopped_at.elapsed();
        if join_wait > JOIN_BUDGET {
            warn!("cpu workers took {:?} to stop", join_wait);
        }

        let elapsed = start.elapsed().as_secs_f64();
        let total = operations.load(Ordering::Acquire);
        let score = throughput(total as f64, elapsed);

        info!(
            "CPU workload finished: {} multiplications in {:.2}s ({:.2} ops/s)",
            total, elapsed, score
        );

        WorkloadOutcome {
            result: WorkloadResult {
                score,
                avg_utilization_percent: 0.0,
                elapsed_seconds: elapsed,
            },
            faults,
        }
    }
}

fn run_worker(n: usize, operations: &AtomicU64, stop: &StopSignal) {
    let mut rng = StdRng::from_entropy();
    let mut a = vec![0.0f64; n * n];
    let mut b = vec![0.0f64; n * n];
    let mut c = vec![0.0f64; n * n];

    while !stop.is_stopped() {
        rng.fill(a.as_mut_slice());
        rng.fill(b.as_mut_slice());
        multiply(&a, &b, &mut c, n);
        std::hint::black_box(&c);
        operations.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
fn run_worker_until(n: usize, operations: &AtomicU64, count: u64) {
    let mut rng = StdRng::from_entropy();
    let mut a = vec![0.0f64; n * n];
    let mut b = vec![0.0f64; n * n];
    let mut c = vec![0.0f64; n * n];
    for _ in 0..count {
        rng.fill(a.as_mut_slice());
        rng.fill(b.as_mut_slice());
        multiply(&a, &b, &mut c, n);
        operations.fetch_add(1, Ordering::AcqRel);
    }
}

/// Dense `n x n` row-major product `c = a * b`.
pub fn multiply(a: &[f64], b: &[f64], c: &mut [f64], n: usize) {
    debug_assert!(a.len() >= n * n && b.len() >= n * n && c.len() >= n * n);

    c[..n * n].fill(0.0);
    for i in 0..n {
        let row = &mut c[i * n..(i + 1) * n];
        for k in 0..n {
            let aik = a[i * n + k];
            let b_row = &b[k * n..(k + 1) * n];
            for (out, bkj) in row.iter_mut().zip(b_row) {
                *out += aik * bkj;
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn pin_to_core(core: usize) -> std::io::Result<()> {
    // CPU_SET indexes a fixed-size mask and aborts past its end.
    if core >= libc::CPU_SETSIZE as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("core {} is beyond the affinity mask", core),
        ));
    }
    // SAFETY: cpu_set_t is plain data; zeroed is its empty state.
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut cpuset);
        libc::CPU_SET(core, &mut cpuset);
        let result = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset);
        if result != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn pin_to_core(_core: usize) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiply_matches_hand_computed_product() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let mut c = [99.0; 4];
        multiply(&a, &b, &mut c, 2);
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn zero_duration_scores_zero() {
        let outcome = CpuWorkload::new(2, 8).run(Duration::ZERO, &StopSignal::new());
        assert_eq!(outcome.result.score, 0.0);
        assert_eq!(outcome.result.elapsed_seconds, 0.0);
        assert!(outcome.faults.is_empty());
    }

    #[test]
    fn short_run_counts_operations() {
        let workload = CpuWorkload::new(2, 16);
        let outcome = workload.run(Duration::from_millis(200), &StopSignal::new());
        assert!(outcome.faults.is_empty());
        assert!(outcome.result.score > 0.0);
        assert!(outcome.result.elapsed_seconds >= 0.2);
        assert_eq!(outcome.result.avg_utilization_percent, 0.0);
    }

    #[test]
    fn external_stop_ends_run_early() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.stop();
        });

        let outcome = CpuWorkload::new(2, 16).run(Duration::from_secs(30), &stop);
        stopper.join().unwrap();
        assert!(outcome.result.elapsed_seconds < 5.0);
    }

    #[test]
    fn crashed_worker_is_a_fault_and_others_keep_counting() {
        let mut workload = CpuWorkload::new(3, 8);
        workload.failing_worker = Some(1);
        let outcome = workload.run(Duration::from_millis(300), &StopSignal::new());

        assert_eq!(outcome.faults, vec![BenchError::worker("cpu-worker-1", "worker 1 crashed")]);
        assert!(outcome.is_usable());
        // The crashed worker's single product alone would be a tiny rate.
        let operations = outcome.result.score * outcome.result.elapsed_seconds;
        assert!(operations > 1.5);
    }

    #[test]
    fn longer_runs_never_count_fewer_operations() {
        let workload = CpuWorkload::new(2, 16);
        let count = |millis| {
            let outcome = workload.run(Duration::from_millis(millis), &StopSignal::new());
            outcome.result.score * outcome.result.elapsed_seconds
        };
        let short = count(100);
        let long = count(500);
        assert!(long >= short, "{} operations in 500ms < {} in 100ms", long, short);
    }

    #[test]
    fn pinned_workers_still_run() {
        let workload = CpuWorkload::new(1, 8).with_pinning(true);
        let outcome = workload.run(Duration::from_millis(100), &StopSignal::new());
        assert!(outcome.result.score > 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pinning_past_the_affinity_mask_is_an_error() {
        let err = pin_to_core(libc::CPU_SETSIZE as usize + 6).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn more_pinned_workers_than_the_mask_holds_still_run() {
        let workload = CpuWorkload::new(libc::CPU_SETSIZE as usize + 6, 2).with_pinning(true);
        let outcome = workload.run(Duration::from_millis(200), &StopSignal::new());
        assert!(outcome.faults.is_empty());
        assert!(outcome.result.score > 0.0);
    }
}
