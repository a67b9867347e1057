//! dutycycle: false-sharing experiments over a bounded MPMC queue.
//!
//! # Usage
//!
//! ```bash
//! # Queue experiment, payloads and shared data padded to cache lines
//! dutycycle cl 01ppcc67w
//!
//! # Same layout with everything packed
//! dutycycle nocl 01ppcc67w 6000 10
//!
//! # Counter-only benchmark, four threads on cores 0..4
//! dutycycle simple-nocl pppp
//! ```
//!
//! Reports go to stdout, logs to stderr (`RUST_LOG` overrides the `info`
//! default).

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use dutycycle_harness::affinity::available_cores;
use dutycycle_harness::{
    CacheLineConfig, ExperimentConfig, Result, RoleMap, SystemPinner, run_cacheline,
    run_queue_experiment,
};
use dutycycle_meter::ReferenceClock;
use dutycycle_queue::{Alignment, CacheAligned, Unaligned};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Experiment kind and layout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Queue experiment, cache-line aligned
    Cl,
    /// Queue experiment, packed
    Nocl,
    /// Counter benchmark, cache-line aligned
    #[value(alias = "SimpleCL")]
    SimpleCl,
    /// Counter benchmark, packed
    #[value(alias = "SimpleNOCL")]
    SimpleNocl,
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "dutycycle")]
#[command(about = "Measure false sharing and duty cycle across a lock-free MPMC queue")]
#[command(version)]
struct Args {
    /// Experiment kind and layout
    #[arg(value_enum)]
    mode: Mode,

    /// One character per core: p producer, c consumer, w worker, other idle
    roles: RoleMap,

    /// Ticks of simulated work per iteration
    #[arg(default_value_t = ExperimentConfig::DEFAULT_WORK_CYCLES)]
    work_cycles: u32,

    /// Simulated work iterations per item
    #[arg(default_value_t = ExperimentConfig::DEFAULT_WORK_ITERATIONS)]
    work_iterations: u32,

    /// Queue capacity (power of two, at least 2)
    #[arg(long, default_value_t = ExperimentConfig::DEFAULT_CAPACITY)]
    capacity: usize,

    /// Number of sampling intervals
    #[arg(long, default_value_t = 10)]
    intervals: u32,

    /// Sampling interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Delay between starting consumers and producers
    #[arg(long, default_value_t = 500)]
    warmup_ms: u64,

    /// Delay between stopping producers and consumers
    #[arg(long, default_value_t = 500)]
    drain_ms: u64,

    /// Reference tick rate in GHz
    #[arg(long)]
    ghz: Option<f64>,

    /// Do not pin threads to cores
    #[arg(long)]
    no_pin: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "experiment failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    info!(layout = %args.roles, mode = ?args.mode, "roles");
    if !args.no_pin {
        match available_cores() {
            Some(cores) if args.roles.len() > cores => {
                warn!(slots = args.roles.len(), cores, "more core slots than cores");
            }
            None => warn!("core list unavailable, pinning may fail"),
            Some(_) => {}
        }
    }

    match args.mode {
        Mode::Cl => queue::<CacheAligned>(args),
        Mode::Nocl => queue::<Unaligned>(args),
        Mode::SimpleCl => counters::<CacheAligned>(args),
        Mode::SimpleNocl => counters::<Unaligned>(args),
    }
}

fn queue<A: Alignment>(args: &Args) -> Result<()> {
    let mut config = ExperimentConfig::new(args.roles.clone());
    config.work_cycles = args.work_cycles;
    config.work_iterations = args.work_iterations;
    config.capacity = args.capacity;
    config.intervals = args.intervals;
    config.interval = Duration::from_millis(args.interval_ms);
    config.warmup = Duration::from_millis(args.warmup_ms);
    config.drain = Duration::from_millis(args.drain_ms);
    config.pin = !args.no_pin;
    if let Some(ghz) = args.ghz {
        config.reference = ReferenceClock::from_ghz(ghz);
    }
    info!(
        work_cycles = config.work_cycles,
        work_iterations = config.work_iterations,
        work_time = ?config.work_time(),
        worker_delay_ticks = config.worker_delay_ticks(),
        capacity = config.capacity,
        ghz = config.reference.ticks_per_ns(),
        "queue experiment"
    );

    let report = run_queue_experiment::<A>(&config, &SystemPinner, |sample| {
        println!("----");
        println!("workCycles = {}", config.work_cycles);
        println!("workIterations = {}", config.work_iterations);
        println!("{sample}");
        println!("----");
        println!();
    })?;

    println!("{report}");
    Ok(())
}

fn counters<A: Alignment>(args: &Args) -> Result<()> {
    let mut config = CacheLineConfig::new(args.roles.clone());
    config.intervals = args.intervals;
    config.interval = Duration::from_millis(args.interval_ms);
    config.pin = !args.no_pin;

    let tallies = run_cacheline::<A>(&config, &SystemPinner, |tally| println!("{tally}"))?;

    let total: u64 = tallies.iter().map(|tally| tally.total()).sum();
    println!("Total increments = {total}");
    Ok(())
}
