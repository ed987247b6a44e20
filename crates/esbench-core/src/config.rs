//! Benchmark configuration.

use serde::Serialize;

use crate::dataset::DatasetTiers;
use crate::mode::RunMode;
use crate::runner::RunnerConfig;
use crate::seed::{SeedOptions, DEFAULT_SEED_CONCURRENCY};
use crate::workload::{WorkloadConfig, DEFAULT_EVENTS_WINDOW, DEFAULT_LIST_PAGE_SIZE};

/// Settings for a whole benchmark suite. Built once and read for the rest of
/// the process.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Dataset sizes, ascending.
    pub tiers: DatasetTiers,

    /// Page size used by `list` and `select`.
    pub list_page_size: usize,

    /// Number of events read by `events`.
    pub events_window: usize,

    /// Which operations are measured.
    pub run_mode: RunMode,

    /// Concurrent workers used while seeding.
    pub seed_concurrency: usize,

    /// Timing of each benchmark run.
    pub runner: RunnerConfig,
}

impl BenchConfig {
    pub fn new() -> Self {
        Self {
            tiers: DatasetTiers::default(),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            events_window: DEFAULT_EVENTS_WINDOW,
            run_mode: RunMode::All,
            seed_concurrency: DEFAULT_SEED_CONCURRENCY,
            runner: RunnerConfig::default(),
        }
    }

    pub fn with_tiers(mut self, tiers: DatasetTiers) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_list_page_size(mut self, page_size: usize) -> Self {
        self.list_page_size = page_size.max(1);
        self
    }

    pub fn with_events_window(mut self, window: usize) -> Self {
        self.events_window = window.max(1);
        self
    }

    pub fn with_run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = mode;
        self
    }

    pub fn with_seed_concurrency(mut self, concurrency: usize) -> Self {
        self.seed_concurrency = concurrency.max(1);
        self
    }

    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }

    /// Seeding options derived from this configuration.
    pub fn seed_options(&self) -> SeedOptions {
        SeedOptions::new().with_concurrency(self.seed_concurrency)
    }

    /// Workload sizes for one tier.
    pub fn workload(&self, tier: u64) -> WorkloadConfig {
        WorkloadConfig::new(tier)
            .with_list_page_size(self.list_page_size)
            .with_events_window(self.events_window)
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable view of a configuration, embedded in reports.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    pub tiers: Vec<u64>,
    pub list_page_size: usize,
    pub events_window: usize,
    pub run_mode: RunMode,
    pub seed_concurrency: usize,
    pub runner: RunnerConfig,
}

impl From<&BenchConfig> for ConfigSnapshot {
    fn from(config: &BenchConfig) -> Self {
        Self {
            tiers: config.tiers.as_slice().to_vec(),
            list_page_size: config.list_page_size,
            events_window: config.events_window,
            run_mode: config.run_mode,
            seed_concurrency: config.seed_concurrency,
            runner: config.runner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = BenchConfig::default();
        assert_eq!(config.tiers.as_slice(), &[1_000, 10_000, 100_000, 1_000_000]);
        assert_eq!(config.list_page_size, DEFAULT_LIST_PAGE_SIZE);
        assert_eq!(config.events_window, DEFAULT_EVENTS_WINDOW);
        assert_eq!(config.run_mode, RunMode::All);
        assert_eq!(config.seed_concurrency, DEFAULT_SEED_CONCURRENCY);
        assert!(!config.runner.throws);
    }

    #[test]
    fn test_config_builder() {
        let config = BenchConfig::new()
            .with_tiers(DatasetTiers::new([10, 1]).unwrap())
            .with_list_page_size(0)
            .with_events_window(5)
            .with_run_mode(RunMode::Write)
            .with_seed_concurrency(0)
            .with_runner(RunnerConfig::new().with_time(Duration::from_millis(10)));

        assert_eq!(config.tiers.as_slice(), &[1, 10]);
        assert_eq!(config.list_page_size, 1);
        assert_eq!(config.seed_options().concurrency, 1);
        let workload = config.workload(10);
        assert_eq!(workload.size, 10);
        assert_eq!(workload.events_window, 5);
        assert_eq!(config.runner.time, Duration::from_millis(10));
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = ConfigSnapshot::from(&BenchConfig::new().with_run_mode(RunMode::Read));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["run_mode"], "read");
        assert_eq!(json["tiers"][0], 1_000);
    }
}
