use clap::{Parser, Subcommand};
use hw_bench::config::parse_duration;
use hw_bench::telemetry::SystemTelemetry;
use hw_bench::{
    BenchmarkKind, BenchmarkOrchestrator, BenchmarkRecord, BottleneckAnalyzer, ComparisonEngine, Config,
    HardwareInventory, Sampler, TelemetrySample, UtilizationProfile,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hw-bench")]
#[command(about = "CPU/GPU stress benchmarking with peer comparison and bottleneck detection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark
    Run {
        /// Benchmark kind: cpu, gpu or hybrid
        #[arg(short, long)]
        kind: Option<BenchmarkKind>,

        /// CPU workload duration (e.g., 10, 10s, 2m)
        #[arg(long, value_parser = parse_duration)]
        cpu_duration: Option<Duration>,

        /// GPU workload duration (e.g., 10, 10s, 2m)
        #[arg(long, value_parser = parse_duration)]
        gpu_duration: Option<Duration>,

        /// Telemetry samples taken over the run
        #[arg(short, long)]
        samples: Option<usize>,

        /// Number of CPU worker threads
        #[arg(short = 't', long)]
        threads: Option<usize>,

        /// JSON config file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print telemetry as it is sampled
        #[arg(short, long)]
        monitor: bool,

        /// JSON file of stored records to compare against
        #[arg(long)]
        cohort: Option<PathBuf>,
    },
    /// Take one live telemetry sample
    Live,
    /// Show hardware inventory and bottleneck verdict
    Info,
    /// Compare a stored record against a cohort file
    Compare {
        /// JSON file holding one record
        #[arg(short, long)]
        record: PathBuf,

        /// JSON file holding a list of records
        #[arg(short, long)]
        cohort: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            kind,
            cpu_duration,
            gpu_duration,
            samples,
            threads,
            config,
            monitor,
            cohort,
        } => {
            let mut config = match config {
                Some(path) => Config::load(path)?,
                None => Config::default(),
            };
            if let Some(kind) = kind {
                config.kind = kind;
            }
            if let Some(d) = cpu_duration {
                config.cpu_duration = d;
            }
            if let Some(d) = gpu_duration {
                config.gpu_duration = d;
            }
            if let Some(n) = samples {
                config.sample_count = n;
            }
            if let Some(n) = threads {
                config.threads = n;
            }
            config.monitor |= monitor;
            config.validate()?;

            run_benchmark(config, cohort.as_deref()).await?;
        }
        Commands::Live => {
            live_sample().await?;
        }
        Commands::Info => {
            show_system_info().await?;
        }
        Commands::Compare { record, cohort } => {
            let record: BenchmarkRecord = read_json(&record)?;
            let candidates: Vec<BenchmarkRecord> = read_json(&cohort)?;
            print_json(&compare_report(&record, &candidates))?;
        }
    }

    Ok(())
}

async fn run_benchmark(config: Config, cohort: Option<&Path>) -> anyhow::Result<()> {
    let fingerprint = tokio::task::spawn_blocking(|| HardwareInventory::new().fingerprint()).await?;

    info!("Kind: {}", config.kind);
    info!("Machine: {} / {} / {} GB", fingerprint.cpu_model, fingerprint.gpu_model, fingerprint.ram_gb);
    info!("CPU workers: {}", config.threads);

    let mut orchestrator = BenchmarkOrchestrator::from_config(&config);
    let monitor_handle = if config.monitor {
        let (tx, rx) = crossbeam::channel::unbounded::<TelemetrySample>();
        orchestrator = orchestrator.with_monitor(tx);
        Some(std::thread::spawn(move || {
            for sample in rx {
                eprintln!(
                    "[{}s] CPU: {:.1}%  GPU: {:.1}%  Temp: {:.1}°C",
                    sample.time_offset,
                    sample.cpu_or_zero(),
                    sample.gpu_or_zero(),
                    sample.temp_or_zero()
                );
            }
        }))
    } else {
        None
    };

    let stop = orchestrator.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping workloads");
            stop.stop();
        }
    });

    let result = orchestrator
        .execute(config.kind, config.cpu_duration, config.gpu_duration, fingerprint)
        .await;
    // Dropping the orchestrator closes the monitor channel.
    drop(orchestrator);
    if let Some(handle) = monitor_handle {
        let _ = handle.join();
    }
    let record = result?;

    match cohort {
        Some(path) => {
            let candidates: Vec<BenchmarkRecord> = read_json(path)?;
            let mut report = compare_report(&record, &candidates);
            report["record"] = serde_json::to_value(&record)?;
            print_json(&report)
        }
        None => print_json(&record),
    }
}

fn compare_report(record: &BenchmarkRecord, candidates: &[BenchmarkRecord]) -> serde_json::Value {
    let engine = ComparisonEngine::new();
    let cohort = engine.select_cohort(record, candidates);
    let comparison = engine.compare(record, &cohort);
    let profile = UtilizationProfile::from_history(record, candidates);
    json!({
        "comparison": comparison,
        "profile": profile,
    })
}

async fn live_sample() -> anyhow::Result<()> {
    let sample = tokio::task::spawn_blocking(|| {
        let mut sampler = Sampler::new(SystemTelemetry::new());
        sampler.live()
    })
    .await?;
    print_json(&sample)
}

async fn show_system_info() -> anyhow::Result<()> {
    let snapshot = tokio::task::spawn_blocking(|| HardwareInventory::new().snapshot()).await?;
    let verdict = BottleneckAnalyzer::new().evaluate(&snapshot);
    print_json(&json!({
        "system_info": snapshot,
        "analysis": verdict,
    }))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&raw)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
