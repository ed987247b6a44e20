//! Tier-by-tier benchmark suite.
//!
//! For each dataset tier, in ascending order: seed, build the workload, keep
//! the operations enabled by the run mode, measure, validate and summarise. A
//! tier whose seeding fails is skipped together with every larger tier, since
//! those build on its data.

use serde::Serialize;

use crate::config::{BenchConfig, ConfigSnapshot};
use crate::error::Result;
use crate::mode::filter_bench_operations;
use crate::provider::{ProviderLoad, SharedProvider};
use crate::runner::{Bench, TaskReport};
use crate::seed::{ensure_dataset, SeedReport, SeedResult};
use crate::summary::summarize;
use crate::validate::{validate, ValidationReport};
use crate::workload::Workload;

/// Outcome of one tier.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TierOutcome {
    Skipped {
        tier: u64,
        reason: String,
    },
    Completed {
        tier: u64,
        seed: SeedReport,
        tasks: Vec<TaskReport>,
        validation: ValidationReport,
        summary: String,
    },
}

impl TierOutcome {
    pub fn tier(&self) -> u64 {
        match self {
            TierOutcome::Skipped { tier, .. } | TierOutcome::Completed { tier, .. } => *tier,
        }
    }
}

/// Result of a suite run against one backend.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub backend: String,
    pub config: ConfigSnapshot,
    /// Set when the whole backend was skipped.
    pub skipped: Option<String>,
    pub tiers: Vec<TierOutcome>,
}

impl SuiteReport {
    /// False only when a measured tier failed validation. Skips never fail.
    pub fn is_success(&self) -> bool {
        self.tiers.iter().all(|outcome| match outcome {
            TierOutcome::Completed { validation, .. } => validation.is_success(),
            TierOutcome::Skipped { .. } => true,
        })
    }

    /// Human-readable report of every tier.
    pub fn render(&self) -> String {
        if let Some(reason) = &self.skipped {
            return format!("{}: skipped ({})", self.backend, reason);
        }
        let mut sections = Vec::with_capacity(self.tiers.len());
        for outcome in &self.tiers {
            match outcome {
                TierOutcome::Skipped { tier, reason } => {
                    sections.push(format!("{} @ {}: skipped ({})", self.backend, tier, reason));
                }
                TierOutcome::Completed {
                    tier,
                    validation,
                    summary,
                    ..
                } => {
                    sections.push(format!(
                        "{} @ {} ({} passed, {} skipped, {} failed)\n{}",
                        self.backend,
                        tier,
                        validation.passed(),
                        validation.skipped(),
                        validation.failed(),
                        summary
                    ));
                }
            }
        }
        sections.join("\n\n")
    }
}

/// Run every tier against the loaded provider.
///
/// An unavailable provider produces a skipped report. Broken preconditions
/// during measurement are returned as errors.
pub async fn run_suite(load: ProviderLoad, config: &BenchConfig) -> Result<SuiteReport> {
    match load {
        ProviderLoad::Loaded(provider) => run_tiers(provider, config).await,
        ProviderLoad::Unavailable { backend, reason } => {
            tracing::warn!(%backend, %reason, "skipping backend");
            Ok(SuiteReport {
                backend,
                config: ConfigSnapshot::from(config),
                skipped: Some(reason),
                tiers: Vec::new(),
            })
        }
    }
}

async fn run_tiers(provider: SharedProvider, config: &BenchConfig) -> Result<SuiteReport> {
    let backend = provider.backend().to_string();
    let seed_options = config.seed_options();
    let mut tiers = Vec::new();

    for tier in config.tiers.iter() {
        let seed = match ensure_dataset(provider.as_ref(), tier, &seed_options).await {
            SeedResult::Ready(report) => report,
            SeedResult::Failed { reason } => {
                tracing::warn!(%backend, tier, %reason, "skipping tier and larger tiers");
                tiers.push(TierOutcome::Skipped { tier, reason });
                break;
            }
        };

        let workload = Workload::new(provider.clone(), config.workload(tier));
        let mut on_skip = |label: &str| {
            tracing::debug!(%backend, tier, operation = label, mode = %config.run_mode, "operation disabled");
        };
        let operations =
            filter_bench_operations(workload.operations(), config.run_mode, Some(&mut on_skip));

        let mut bench = Bench::new(format!("{} @ {}", backend, tier), config.runner.clone());
        for operation in operations {
            bench.add(operation);
        }
        bench.run().await?;

        let tasks = bench.reports();
        let validation = validate(&tasks);
        let summary = summarize(&tasks);
        tracing::info!(
            %backend,
            tier,
            passed = validation.passed(),
            skipped = validation.skipped(),
            failed = validation.failed(),
            "tier complete"
        );

        tiers.push(TierOutcome::Completed {
            tier,
            seed,
            tasks,
            validation,
            summary,
        });
    }

    Ok(SuiteReport {
        backend,
        config: ConfigSnapshot::from(config),
        skipped: None,
        tiers,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::dataset::DatasetTiers;
    use crate::mode::RunMode;
    use crate::runner::RunnerConfig;
    use crate::testing::MockProvider;

    fn quick_config(tiers: &[u64], mode: RunMode) -> BenchConfig {
        BenchConfig::new()
            .with_tiers(DatasetTiers::new(tiers.iter().copied()).unwrap())
            .with_run_mode(mode)
            .with_runner(
                RunnerConfig::new()
                    .with_time(Duration::ZERO)
                    .with_warmup_time(Duration::ZERO)
                    .with_warmup_iterations(1)
                    .with_iterations(3),
            )
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_a_skip() {
        let load = ProviderLoad::Unavailable {
            backend: "postgres".into(),
            reason: "connection refused".into(),
        };
        let report = run_suite(load, &quick_config(&[1], RunMode::All)).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.skipped.as_deref(), Some("connection refused"));
        assert!(report.render().contains("skipped"));
    }

    #[tokio::test]
    async fn test_read_mode_runs_read_operations() {
        let provider = Arc::new(MockProvider::new());
        let report = run_suite(
            ProviderLoad::Loaded(provider),
            &quick_config(&[5], RunMode::Read),
        )
        .await
        .unwrap();

        let TierOutcome::Completed { tasks, validation, .. } = &report.tiers[0] else {
            panic!("tier should complete");
        };
        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["list", "get", "select", "events"]);
        assert_eq!(validation.passed(), 4);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_seed_failure_skips_remaining_tiers() {
        let provider = Arc::new(MockProvider::new());
        provider.fail_writes_when(|index| {
            (index > 2).then(|| crate::Error::Backend("disk full".into()))
        });
        let report = run_suite(
            ProviderLoad::Loaded(provider),
            &quick_config(&[2, 10, 100], RunMode::Read),
        )
        .await
        .unwrap();

        assert_eq!(report.tiers.len(), 2);
        assert!(matches!(report.tiers[0], TierOutcome::Completed { .. }));
        assert!(matches!(report.tiers[1], TierOutcome::Skipped { tier: 10, .. }));
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_connection_loss_before_samples_is_skipped() {
        let provider = Arc::new(MockProvider::new());
        let report = {
            let config = quick_config(&[3], RunMode::Read);
            assert!(ensure_dataset(provider.as_ref(), 3, &config.seed_options())
                .await
                .is_ready());
            provider.fail_operation("events", "client is not connected");
            run_suite(ProviderLoad::Loaded(provider.clone()), &config)
                .await
                .unwrap()
        };
        // The failure hits the first warm-up call, so the task is skipped.
        assert!(report.is_success());
        let TierOutcome::Completed { validation, .. } = &report.tiers[0] else {
            panic!("tier should complete");
        };
        assert_eq!(validation.skipped(), 1);
        assert_eq!(validation.passed(), 3);
    }
}
