//! Telemetry time series, standalone or alongside a running workload.

use crate::error::{panic_message, BenchError};
use crate::model::TelemetrySample;
use crate::telemetry::TelemetryProvider;
use crate::workload::StopSignal;
use crossbeam::channel::Sender;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub struct Sampler<P> {
    provider: P,
}

impl<P: TelemetryProvider> Sampler<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Spacing between ticks when the caller doesn't choose one: the window
    /// split evenly across the gaps, never below one second.
    pub fn derived_interval(duration: Duration, sample_count: usize) -> Duration {
        if sample_count <= 1 {
            return Duration::ZERO;
        }
        let gaps = u32::try_from(sample_count - 1).unwrap_or(u32::MAX);
        (duration / gaps).max(Duration::from_secs(1))
    }

    /// Collect exactly `sample_count` samples over `duration`.
    ///
    /// Readings are taken at the start of each tick. Once `stop` is raised
    /// the remaining ticks are taken back-to-back so the series keeps its
    /// length without waiting out the window.
    pub fn collect(
        &mut self,
        duration: Duration,
        sample_count: usize,
        interval: Option<Duration>,
        stop: &StopSignal,
    ) -> Vec<TelemetrySample> {
        self.collect_with(duration, sample_count, interval, stop, None)
    }

    fn collect_with(
        &mut self,
        duration: Duration,
        sample_count: usize,
        interval: Option<Duration>,
        stop: &StopSignal,
        monitor: Option<&Sender<TelemetrySample>>,
    ) -> Vec<TelemetrySample> {
        let interval = interval.unwrap_or_else(|| Self::derived_interval(duration, sample_count));
        debug!("sampling {} ticks every {:?}", sample_count, interval);

        let start = Instant::now();
        let mut samples = Vec::with_capacity(sample_count);
        for tick in 0..sample_count {
            let sample = self.read_tick(start);
            trace!(?sample, "tick {}", tick);
            if let Some(tx) = monitor {
                // A gone receiver only means nobody is watching.
                let _ = tx.send(sample);
            }
            samples.push(sample);

            if tick + 1 < sample_count {
                let next_tick = start + interval * (tick as u32 + 1);
                stop.wait_until(next_tick);
            }
        }
        samples
    }

    /// One immediate reading.
    pub fn live(&mut self) -> TelemetrySample {
        self.read_tick(Instant::now())
    }

    fn read_tick(&mut self, start: Instant) -> TelemetrySample {
        let time_offset = start.elapsed().as_secs_f64().round() as u64;
        let cpu_percent = self.provider.read_cpu_percent();
        let gpu_percent = self.provider.read_gpu().percent;
        let temperature_celsius = self.provider.read_cpu_temperature();

        TelemetrySample {
            time_offset,
            cpu_percent,
            gpu_percent,
            temperature_celsius,
        }
    }
}

impl<P: TelemetryProvider + 'static> Sampler<P> {
    /// Run [`Sampler::collect`] on a dedicated thread, optionally streaming
    /// each sample to `monitor` as it is taken.
    pub fn spawn(
        mut self,
        duration: Duration,
        sample_count: usize,
        interval: Option<Duration>,
        stop: StopSignal,
        monitor: Option<Sender<TelemetrySample>>,
    ) -> Result<SamplerHandle, BenchError> {
        let handle = thread::Builder::new()
            .name("telemetry-sampler".to_string())
            .spawn(move || self.collect_with(duration, sample_count, interval, &stop, monitor.as_ref()))
            .map_err(|e| BenchError::TelemetryUnavailable(format!("cannot start sampler: {}", e)))?;
        Ok(SamplerHandle { handle })
    }
}

pub struct SamplerHandle {
    handle: thread::JoinHandle<Vec<TelemetrySample>>,
}

impl SamplerHandle {
    /// Wait for the series to complete.
    pub fn join(self) -> Result<Vec<TelemetrySample>, BenchError> {
        self.handle
            .join()
            .map_err(|payload| BenchError::TelemetryUnavailable(panic_message(payload.as_ref())))
    }
}

/// Aggregates over a sample series. Means only count ticks where the
/// sensor answered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeriesStats {
    pub mean_cpu: Option<f64>,
    pub mean_gpu: Option<f64>,
    pub mean_temp: Option<f64>,
    pub peak_temp: Option<f64>,
}

impl From<&[TelemetrySample]> for SeriesStats {
    fn from(samples: &[TelemetrySample]) -> Self {
        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        };
        let temps: Vec<f64> = samples.iter().filter_map(|s| s.temperature_celsius).collect();

        Self {
            mean_cpu: mean(samples.iter().filter_map(|s| s.cpu_percent).collect()),
            mean_gpu: mean(samples.iter().filter_map(|s| s.gpu_percent).collect()),
            peak_temp: temps.iter().copied().reduce(f64::max),
            mean_temp: mean(temps),
        }
    }
}
