use crate::config::{BenchmarkKind, Config};
use crate::error::{panic_message, BenchError};
use crate::model::{round2, BenchmarkRecord, Fingerprint, TelemetrySample, WorkloadResult};
use crate::sampler::{Sampler, SeriesStats};
use crate::telemetry::{SystemTelemetry, TelemetryProvider};
use crate::workload::{CpuWorkload, GpuDevice, GpuWorkload, StopSignal, Workload, WorkloadOutcome};
use crossbeam::channel::Sender;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Builds a fresh telemetry provider for each run's sampler thread.
pub type TelemetryFactory = Arc<dyn Fn() -> Box<dyn TelemetryProvider> + Send + Sync>;

/// Runs the selected workloads alongside a sampler and folds everything
/// into a [`BenchmarkRecord`].
pub struct BenchmarkOrchestrator {
    cpu: Arc<dyn Workload>,
    gpu: Arc<dyn Workload>,
    telemetry: TelemetryFactory,
    sample_count: usize,
    sample_interval: Option<Duration>,
    monitor: Option<Sender<TelemetrySample>>,
    stop: StopSignal,
}

impl BenchmarkOrchestrator {
    pub fn new(cpu: Arc<dyn Workload>, gpu: Arc<dyn Workload>, telemetry: TelemetryFactory) -> Self {
        Self {
            cpu,
            gpu,
            telemetry,
            sample_count: 3,
            sample_interval: None,
            monitor: None,
            stop: StopSignal::new(),
        }
    }

    /// Real workloads and host telemetry, sized from `config`.
    pub fn from_config(config: &Config) -> Self {
        let cpu = CpuWorkload::new(config.threads, config.matrix_dimension).with_pinning(config.pin_workers);
        // Probing the GPU is only worth it when it will be used.
        let device = if config.kind.runs_gpu() {
            GpuDevice::probe()
        } else {
            GpuDevice::Unavailable("not requested".to_string())
        };
        let gpu = GpuWorkload::new(device, config.chunk_length, config.repeats_per_cycle);
        let telemetry: TelemetryFactory = Arc::new(|| Box::new(SystemTelemetry::new()));

        Self::new(Arc::new(cpu), Arc::new(gpu), telemetry).with_sampling(config.sample_count, config.sample_interval)
    }

    pub fn with_sampling(mut self, sample_count: usize, interval: Option<Duration>) -> Self {
        self.sample_count = sample_count.max(1);
        self.sample_interval = interval;
        self
    }

    /// Stream every sample to `monitor` while the run is in progress.
    pub fn with_monitor(mut self, monitor: Sender<TelemetrySample>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Raising this signal ends the running workloads early.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub async fn execute(
        &self,
        kind: BenchmarkKind,
        cpu_duration: Duration,
        gpu_duration: Duration,
        fingerprint: Fingerprint,
    ) -> Result<BenchmarkRecord, BenchError> {
        let window = kind.window(cpu_duration, gpu_duration);
        info!("starting {} benchmark, window {:?}", kind, window);

        let sampler_stop = StopSignal::new();
        let sampler = Sampler::new((self.telemetry)())
            .spawn(
                window,
                self.sample_count,
                self.sample_interval,
                sampler_stop.clone(),
                self.monitor.clone(),
            )
            .map_err(|e| BenchError::Orchestration(e.to_string()))?;

        let cpu_task = kind.runs_cpu().then(|| self.launch(&self.cpu, cpu_duration));
        let gpu_task = kind.runs_gpu().then(|| self.launch(&self.gpu, gpu_duration));
        let (cpu, gpu) = tokio::join!(
            settle(cpu_task, self.cpu.name(), cpu_duration),
            settle(gpu_task, self.gpu.name(), gpu_duration),
        );

        // Workloads are done; let the sampler finish its remaining ticks now.
        sampler_stop.stop();
        let mut faults = Vec::new();
        let samples = match tokio::task::spawn_blocking(move || sampler.join()).await {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                faults.push(e);
                Vec::new()
            }
            Err(e) => {
                faults.push(BenchError::TelemetryUnavailable(e.to_string()));
                Vec::new()
            }
        };

        if !samples.iter().any(TelemetrySample::has_any_reading) {
            return Err(BenchError::Orchestration("no telemetry could be read".to_string()));
        }
        let usable = [&cpu, &gpu].into_iter().flatten().any(WorkloadOutcome::is_usable);
        if !usable {
            let reasons: Vec<String> = [&cpu, &gpu]
                .into_iter()
                .flatten()
                .flat_map(|o| o.faults.iter().map(ToString::to_string))
                .collect();
            return Err(BenchError::Orchestration(format!(
                "no workload could run: {}",
                reasons.join("; ")
            )));
        }

        let stats = SeriesStats::from(samples.as_slice());
        let cpu_result = cpu.as_ref().map(|o| o.result);
        let gpu_result = gpu.as_ref().map(|o| o.result);

        let cpu_score = cpu_result.map_or(0.0, |r| round2(r.score));
        let gpu_score = gpu_result.map_or(0.0, |r| round4(r.score));
        let elapsed_seconds = [cpu_result, gpu_result]
            .into_iter()
            .flatten()
            .map(|r| r.elapsed_seconds)
            .fold(0.0, f64::max);

        for fault in cpu.into_iter().chain(gpu).flat_map(|o| o.faults) {
            faults.push(fault);
        }
        for fault in &faults {
            warn!("recovered: {}", fault);
        }

        let record = BenchmarkRecord {
            id: None,
            owner: None,
            kind,
            fingerprint,
            cpu_score,
            gpu_score,
            overall_score: round4(cpu_score + gpu_score),
            cpu_utilization: round2(headline_utilization(cpu_result, stats.mean_cpu)),
            gpu_utilization: round2(headline_utilization(gpu_result, stats.mean_gpu)),
            avg_temp: round2(stats.mean_temp.unwrap_or(0.0)),
            peak_temp: round2(stats.peak_temp.unwrap_or(0.0)),
            elapsed_seconds,
            samples,
            faults,
        };

        info!(
            "{} benchmark done: cpu {:.2}, gpu {:.4}, overall {:.4}, {} recovered faults",
            kind,
            record.cpu_score,
            record.gpu_score,
            record.overall_score,
            record.faults.len()
        );
        Ok(record)
    }

    fn launch(&self, workload: &Arc<dyn Workload>, duration: Duration) -> JoinHandle<WorkloadOutcome> {
        let workload = Arc::clone(workload);
        let stop = self.stop.clone();
        tokio::task::spawn_blocking(move || workload.run(duration, &stop))
    }
}

/// Await a workload task, turning a panic into a zero-valued result.
async fn settle(
    task: Option<JoinHandle<WorkloadOutcome>>,
    name: &str,
    duration: Duration,
) -> Option<WorkloadOutcome> {
    let task = task?;
    Some(match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            let reason = if e.is_panic() {
                panic_message(e.into_panic().as_ref())
            } else {
                e.to_string()
            };
            WorkloadOutcome::degraded(
                WorkloadResult::zeroed(duration.as_secs_f64()),
                BenchError::worker(name, reason),
            )
        }
    })
}

/// The workload's own figure when it reported one, else the sampler's mean.
fn headline_utilization(result: Option<WorkloadResult>, sampled: Option<f64>) -> f64 {
    match result {
        Some(r) if r.avg_utilization_percent > 0.0 => r.avg_utilization_percent,
        _ => sampled.unwrap_or(0.0),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::GpuReading;

    struct Fixed(WorkloadResult);

    impl Workload for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn run(&self, _duration: Duration, _stop: &StopSignal) -> WorkloadOutcome {
            WorkloadOutcome::ok(self.0)
        }
    }

    struct Panics;

    impl Workload for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn run(&self, _duration: Duration, _stop: &StopSignal) -> WorkloadOutcome {
            panic!("driver exploded")
        }
    }

    struct Steady {
        cpu: Option<f64>,
        gpu: Option<f64>,
        temp: Option<f64>,
    }

    impl TelemetryProvider for Steady {
        fn read_cpu_percent(&mut self) -> Option<f64> {
            self.cpu
        }

        fn read_cpu_temperature(&mut self) -> Option<f64> {
            self.temp
        }

        fn read_gpu(&mut self) -> GpuReading {
            GpuReading {
                percent: self.gpu,
                vram_mb: None,
            }
        }
    }

    fn steady(cpu: Option<f64>, gpu: Option<f64>, temp: Option<f64>) -> TelemetryFactory {
        Arc::new(move || Box::new(Steady { cpu, gpu, temp }))
    }

    fn result(score: f64, util: f64, elapsed: f64) -> Arc<dyn Workload> {
        Arc::new(Fixed(WorkloadResult {
            score,
            avg_utilization_percent: util,
            elapsed_seconds: elapsed,
        }))
    }

    fn orchestrator(cpu: Arc<dyn Workload>, gpu: Arc<dyn Workload>, telemetry: TelemetryFactory) -> BenchmarkOrchestrator {
        BenchmarkOrchestrator::new(cpu, gpu, telemetry).with_sampling(3, Some(Duration::ZERO))
    }

    fn fingerprint() -> Fingerprint {
        Fingerprint::new("Test CPU", "Test GPU", 16.0)
    }

    #[tokio::test]
    async fn hybrid_sums_scores_and_takes_longest_elapsed() {
        let orch = orchestrator(result(120.456, 0.0, 2.0), result(3.14159, 0.0, 3.5), steady(Some(90.0), Some(70.0), Some(65.0)));
        let record = orch
            .execute(BenchmarkKind::Hybrid, Duration::from_secs(2), Duration::from_secs(3), fingerprint())
            .await
            .unwrap();

        assert_eq!(record.cpu_score, 120.46);
        assert_eq!(record.gpu_score, 3.1416);
        assert_eq!(record.overall_score, 123.6016);
        assert_eq!(record.elapsed_seconds, 3.5);
        assert_eq!(record.samples.len(), 3);
        assert_eq!(record.avg_temp, 65.0);
        assert!(record.faults.is_empty());
    }

    #[tokio::test]
    async fn utilization_prefers_workload_figure_then_sampler() {
        let orch = orchestrator(result(10.0, 0.0, 1.0), result(1.0, 88.0, 1.0), steady(Some(95.0), Some(40.0), None));
        let record = orch
            .execute(BenchmarkKind::Hybrid, Duration::from_secs(1), Duration::from_secs(1), fingerprint())
            .await
            .unwrap();

        assert_eq!(record.cpu_utilization, 95.0);
        assert_eq!(record.gpu_utilization, 88.0);
        assert_eq!(record.avg_temp, 0.0);
    }

    #[tokio::test]
    async fn cpu_only_leaves_gpu_score_zero() {
        let orch = orchestrator(result(50.0, 0.0, 1.0), Arc::new(Panics), steady(Some(50.0), None, None));
        let record = orch
            .execute(BenchmarkKind::Cpu, Duration::from_secs(1), Duration::from_secs(1), fingerprint())
            .await
            .unwrap();
        assert_eq!(record.gpu_score, 0.0);
        assert_eq!(record.overall_score, 50.0);
        assert!(record.faults.is_empty());
    }

    #[tokio::test]
    async fn panicking_workload_is_zeroed_not_fatal() {
        let orch = orchestrator(result(50.0, 0.0, 1.0), Arc::new(Panics), steady(Some(50.0), None, None));
        let record = orch
            .execute(BenchmarkKind::Hybrid, Duration::from_secs(1), Duration::from_secs(1), fingerprint())
            .await
            .unwrap();

        assert_eq!(record.cpu_score, 50.0);
        assert_eq!(record.gpu_score, 0.0);
        assert_eq!(
            record.faults,
            vec![BenchError::worker("panics", "driver exploded")]
        );
    }

    #[tokio::test]
    async fn nothing_usable_is_fatal() {
        let orch = orchestrator(Arc::new(Panics), Arc::new(Panics), steady(Some(50.0), None, None));
        let err = orch
            .execute(BenchmarkKind::Hybrid, Duration::from_secs(1), Duration::from_secs(1), fingerprint())
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Orchestration(_)));
    }

    #[tokio::test]
    async fn no_telemetry_at_all_is_fatal() {
        let orch = orchestrator(result(50.0, 0.0, 1.0), result(1.0, 0.0, 1.0), steady(None, None, None));
        let err = orch
            .execute(BenchmarkKind::Cpu, Duration::from_secs(1), Duration::from_secs(1), fingerprint())
            .await
            .unwrap_err();
        assert_eq!(err, BenchError::Orchestration("no telemetry could be read".to_string()));
    }

    #[tokio::test]
    async fn monitor_receives_every_sample() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let orch = orchestrator(result(5.0, 0.0, 1.0), result(1.0, 0.0, 1.0), steady(Some(10.0), None, None)).with_monitor(tx);
        let record = orch
            .execute(BenchmarkKind::Cpu, Duration::from_secs(1), Duration::from_secs(1), fingerprint())
            .await
            .unwrap();
        let streamed: Vec<TelemetrySample> = rx.try_iter().collect();
        assert_eq!(streamed, record.samples);
    }

    #[test]
    fn headline_falls_back_deterministically() {
        let r = WorkloadResult { score: 1.0, avg_utilization_percent: 0.0, elapsed_seconds: 1.0 };
        assert_eq!(headline_utilization(Some(r), Some(42.0)), 42.0);
        assert_eq!(headline_utilization(Some(r), None), 0.0);
        assert_eq!(headline_utilization(None, Some(7.0)), 7.0);
    }
}
