//! esbench core
//!
//! Shared engine for benchmarking CRUD and event-append workloads across
//! database backends.
//!
//! # Components
//!
//! - **Dataset**: tier sizes, fixed-width aggregate ids, round-robin sampling
//! - **Seeding**: idempotent, concurrency-bounded dataset creation
//! - **Run mode**: read/write classification and operation filtering
//! - **Runner**: warm-up, measurement and per-task statistics
//! - **Validation**: distinguishes missing samples from failed tasks
//! - **Summary**: fixed-width result tables
//!
//! Backends plug in through [`OperationProvider`].

pub mod config;
pub mod dataset;
pub mod error;
pub mod mode;
pub mod model;
pub mod operation;
pub mod provider;
pub mod runner;
pub mod seed;
pub mod stats;
pub mod suite;
pub mod summary;
pub mod validate;
pub mod workload;

#[cfg(test)]
mod testing;

pub use config::BenchConfig;
pub use dataset::{format_aggregate_id, DatasetTiers, IdSampler, AGGREGATE_ID_WIDTH};
pub use error::{Error, Result};
pub use mode::{filter_bench_operations, is_read_operation, is_write_operation, RunMode};
pub use model::{AggregateDraft, AggregateRecord, EventDraft, EventRecord, FieldFilter};
pub use operation::{BenchOperation, OperationLabel};
pub use provider::{
    load_optional_provider, OperationProvider, ProviderLoad, ProviderStrategy, SharedProvider,
};
pub use runner::{Bench, RunnerConfig, TaskReport, TaskResult};
pub use seed::{ensure_dataset, SeedOptions, SeedReport, SeedResult};
pub use suite::{run_suite, SuiteReport, TierOutcome};
pub use summary::summarize;
pub use validate::{validate, ValidationReport};
pub use workload::{Workload, WorkloadConfig};
