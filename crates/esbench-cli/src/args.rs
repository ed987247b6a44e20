//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use esbench_core::runner::{
    DEFAULT_ITERATIONS, DEFAULT_TIME, DEFAULT_WARMUP_ITERATIONS, DEFAULT_WARMUP_TIME,
};
use esbench_core::seed::DEFAULT_SEED_CONCURRENCY;
use esbench_core::workload::{DEFAULT_EVENTS_WINDOW, DEFAULT_LIST_PAGE_SIZE};
use esbench_core::{BenchConfig, DatasetTiers, RunMode, RunnerConfig};

/// Fallback variable for the PostgreSQL connection string.
pub const DATABASE_URL_FALLBACK_ENV: &str = "DATABASE_URL";

/// Storage backend to benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Memory,
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

/// esbench - CRUD and event-append benchmarks across storage backends
#[derive(Parser, Debug)]
#[command(name = "esbench")]
#[command(version, about = "Benchmark CRUD and event-append workloads across backends")]
pub struct Args {
    /// Backend to benchmark
    #[arg(short, long, value_enum, default_value = "sqlite", env = "ESBENCH_BACKEND")]
    pub backend: Backend,

    /// SQLite database file (in-memory when omitted)
    #[arg(long, env = "ESBENCH_SQLITE_PATH")]
    pub sqlite_path: Option<PathBuf>,

    /// PostgreSQL connection string (falls back to DATABASE_URL)
    #[arg(long, env = "ESBENCH_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Comma-separated dataset sizes
    #[arg(long, env = "ESBENCH_TIERS", value_parser = parse_tiers)]
    pub tiers: Option<DatasetTiers>,

    /// Operations to run: all, read or write
    #[arg(long, env = "ESBENCH_MODE", default_value = "all")]
    pub mode: String,

    /// Page size for list and select
    #[arg(long, default_value_t = DEFAULT_LIST_PAGE_SIZE)]
    pub page_size: usize,

    /// Number of events read per aggregate
    #[arg(long, default_value_t = DEFAULT_EVENTS_WINDOW)]
    pub events_window: usize,

    /// Concurrent workers while seeding
    #[arg(long, default_value_t = DEFAULT_SEED_CONCURRENCY)]
    pub seed_concurrency: usize,

    /// Measurement window per operation in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIME.as_millis() as u64)]
    pub time_ms: u64,

    /// Warm-up window per operation in milliseconds
    #[arg(long, default_value_t = DEFAULT_WARMUP_TIME.as_millis() as u64)]
    pub warmup_ms: u64,

    /// Minimum warm-up iterations per operation
    #[arg(long, default_value_t = DEFAULT_WARMUP_ITERATIONS)]
    pub warmup_iterations: usize,

    /// Minimum measured iterations per operation
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: usize,

    /// Abort on the first failing operation
    #[arg(long)]
    pub throws: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Delete synthetic rows once the run finishes
    #[arg(long)]
    pub purge: bool,
}

impl Args {
    /// Connection string from the flag, its variable, or `DATABASE_URL`.
    pub fn resolve_database_url(&self) -> Option<String> {
        self.database_url
            .clone()
            .or_else(|| std::env::var(DATABASE_URL_FALLBACK_ENV).ok())
            .filter(|url| !url.trim().is_empty())
    }
}

fn parse_tiers(value: &str) -> Result<DatasetTiers, String> {
    DatasetTiers::parse(value).map_err(|e| e.to_string())
}

impl From<&Args> for BenchConfig {
    fn from(args: &Args) -> Self {
        let runner = RunnerConfig::new()
            .with_time(Duration::from_millis(args.time_ms))
            .with_warmup_time(Duration::from_millis(args.warmup_ms))
            .with_warmup_iterations(args.warmup_iterations)
            .with_iterations(args.iterations)
            .with_throws(args.throws);

        let mut config = BenchConfig::new()
            .with_list_page_size(args.page_size)
            .with_events_window(args.events_window)
            .with_run_mode(RunMode::from_config(&args.mode))
            .with_seed_concurrency(args.seed_concurrency)
            .with_runner(runner);
        if let Some(tiers) = &args.tiers {
            config = config.with_tiers(tiers.clone());
        }
        config
    }
}
