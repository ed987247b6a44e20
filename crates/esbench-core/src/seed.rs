//! Idempotent dataset seeding.
//!
//! Seeding guarantees that a provider holds at least `target` synthetic
//! aggregates before a tier is measured. A tier that is already seeded costs a
//! single read of its boundary aggregate. Otherwise the missing index range is
//! handed to a small pool of workers polled concurrently on the calling task.
//! An aborted pass can leave holes below the highest seeded index; when the
//! seeded rows do not form a contiguous prefix the next pass walks the whole
//! range and lets duplicate rejections skip what is already there.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;

use crate::dataset::{format_aggregate_id, seed_draft};
use crate::error::Result;
use crate::model::SEED_CATEGORY;
use crate::provider::OperationProvider;

/// Default number of concurrent seeding workers.
pub const DEFAULT_SEED_CONCURRENCY: usize = 8;

/// Number of created aggregates between progress log lines.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Seeding options.
#[derive(Debug, Clone)]
pub struct SeedOptions {
    /// Maximum number of in-flight creations.
    pub concurrency: usize,
}

impl SeedOptions {
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_SEED_CONCURRENCY,
        }
    }

    /// Set the worker count. Clamped to at least one when seeding.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a successful seeding pass.
#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub target: u64,
    /// Seeded aggregates found before the pass started.
    pub existing: u64,
    /// First index written by this pass. `existing + 1` when the seeded rows
    /// formed a contiguous prefix, `1` otherwise.
    pub start: u64,
    /// Aggregates created by this pass.
    pub created: u64,
    /// Creations rejected because the aggregate already existed.
    pub duplicates: u64,
    /// The boundary aggregate was present; no writes were made.
    pub already_seeded: bool,
    pub elapsed: Duration,
}

/// Outcome of [`ensure_dataset`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SeedResult {
    Ready(SeedReport),
    Failed { reason: String },
}

impl SeedResult {
    pub fn is_ready(&self) -> bool {
        matches!(self, SeedResult::Ready(_))
    }
}

/// Shared state of one seeding pass.
struct SeedPass {
    next: AtomicU64,
    end: u64,
    aborted: AtomicBool,
    failure: Mutex<Option<String>>,
    created: AtomicU64,
    duplicates: AtomicU64,
}

impl SeedPass {
    /// Claim the next unseeded index, or `None` once the range is exhausted or
    /// the pass was aborted.
    fn claim(&self) -> Option<u64> {
        if self.aborted.load(Ordering::Acquire) {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        (index <= self.end).then_some(index)
    }

    fn abort(&self, reason: String) {
        self.aborted.store(true, Ordering::Release);
        self.failure.lock().get_or_insert(reason);
    }
}

/// Make sure `provider` holds at least `target` seeded aggregates.
///
/// Never returns an error: every failure is reported as
/// [`SeedResult::Failed`], and callers skip the tier.
pub async fn ensure_dataset<P>(provider: &P, target: u64, options: &SeedOptions) -> SeedResult
where
    P: OperationProvider + ?Sized,
{
    let started = Instant::now();
    match seed(provider, target, options, started).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(backend = provider.backend(), target, error = %e, "seeding failed");
            SeedResult::Failed {
                reason: e.to_string(),
            }
        }
    }
}

async fn seed<P>(
    provider: &P,
    target: u64,
    options: &SeedOptions,
    started: Instant,
) -> Result<SeedResult>
where
    P: OperationProvider + ?Sized,
{
    let backend = provider.backend();
    let boundary = format_aggregate_id(target as i64)?;

    if provider.is_seeded(SEED_CATEGORY, &boundary).await? {
        tracing::info!(backend, target, "dataset already seeded");
        return Ok(SeedResult::Ready(SeedReport {
            target,
            existing: target,
            start: target + 1,
            created: 0,
            duplicates: 0,
            already_seeded: true,
            elapsed: started.elapsed(),
        }));
    }

    let existing = provider.count_seeded(SEED_CATEGORY).await?.min(target);
    let start = if is_contiguous(provider, existing).await? {
        existing + 1
    } else {
        tracing::warn!(
            backend,
            target,
            existing,
            "seeded rows have gaps, rescanning from the first index"
        );
        1
    };
    let remaining = target + 1 - start;
    let workers = options.concurrency.clamp(1, remaining.max(1) as usize);

    tracing::info!(backend, target, existing, start, workers, "seeding dataset");

    let pass = SeedPass {
        next: AtomicU64::new(start),
        end: target,
        aborted: AtomicBool::new(false),
        failure: Mutex::new(None),
        created: AtomicU64::new(0),
        duplicates: AtomicU64::new(0),
    };

    join_all((0..workers).map(|worker| seed_worker(provider, &pass, worker))).await;

    if let Some(reason) = pass.failure.lock().take() {
        tracing::warn!(backend, target, %reason, "seeding aborted");
        return Ok(SeedResult::Failed { reason });
    }

    let report = SeedReport {
        target,
        existing,
        start,
        created: pass.created.load(Ordering::Acquire),
        duplicates: pass.duplicates.load(Ordering::Acquire),
        already_seeded: false,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        backend,
        target,
        created = report.created,
        duplicates = report.duplicates,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "dataset seeded"
    );
    Ok(SeedResult::Ready(report))
}

/// Whether the `existing` seeded rows are exactly indices `1..=existing`.
///
/// Only the edges are checked: index `existing` must be present and index
/// `existing + 1` absent. A count of zero is trivially contiguous.
async fn is_contiguous<P>(provider: &P, existing: u64) -> Result<bool>
where
    P: OperationProvider + ?Sized,
{
    if existing == 0 {
        return Ok(true);
    }
    let last = format_aggregate_id(existing as i64)?;
    if !provider.is_seeded(SEED_CATEGORY, &last).await? {
        return Ok(false);
    }
    let after = format_aggregate_id(existing as i64 + 1)?;
    Ok(!provider.is_seeded(SEED_CATEGORY, &after).await?)
}

async fn seed_worker<P>(provider: &P, pass: &SeedPass, worker: usize)
where
    P: OperationProvider + ?Sized,
{
    while let Some(index) = pass.claim() {
        let draft = match seed_draft(index) {
            Ok(draft) => draft,
            Err(e) => {
                pass.abort(e.to_string());
                break;
            }
        };

        match provider.create_aggregate(&draft).await {
            Ok(()) => {
                let created = pass.created.fetch_add(1, Ordering::AcqRel) + 1;
                if created % PROGRESS_INTERVAL == 0 {
                    tracing::debug!(worker, created, "seeding progress");
                }
            }
            Err(e) if e.is_duplicate() => {
                pass.duplicates.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                tracing::debug!(worker, index, error = %e, "seed write failed");
                pass.abort(format!("failed to seed aggregate {}: {}", draft.id, e));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    fn ready(result: SeedResult) -> SeedReport {
        match result {
            SeedResult::Ready(report) => report,
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_seeds_full_range() {
        let provider = MockProvider::new();
        let report = ready(ensure_dataset(&provider, 25, &SeedOptions::new()).await);
        assert_eq!(report.created, 25);
        assert_eq!(report.duplicates, 0);
        assert!(!report.already_seeded);
        assert_eq!(provider.seeded_ids().len(), 25);
        assert_eq!(provider.writes(), 25);
    }

    #[tokio::test]
    async fn test_second_pass_performs_no_writes() {
        let provider = MockProvider::new();
        assert!(ensure_dataset(&provider, 40, &SeedOptions::new()).await.is_ready());
        let writes = provider.writes();

        let report = ready(ensure_dataset(&provider, 40, &SeedOptions::new()).await);
        assert!(report.already_seeded);
        assert_eq!(provider.writes(), writes);
    }

    #[tokio::test]
    async fn test_tiers_are_cumulative() {
        let provider = MockProvider::new();
        assert!(ensure_dataset(&provider, 10, &SeedOptions::new()).await.is_ready());
        let report = ready(ensure_dataset(&provider, 30, &SeedOptions::new()).await);
        assert_eq!(report.existing, 10);
        assert_eq!(report.start, 11);
        assert_eq!(report.created, 20);
        assert_eq!(provider.writes(), 30);
    }

    #[tokio::test]
    async fn test_duplicates_are_absorbed() {
        let provider = MockProvider::new();
        // Every even index reports a conflict, as if written by another process.
        provider.fail_writes_when(|index| {
            (index % 2 == 0).then(|| crate::Error::Backend("row already exists".into()))
        });

        let report = ready(ensure_dataset(&provider, 20, &SeedOptions::new()).await);
        assert_eq!(report.created, 10);
        assert_eq!(report.duplicates, 10);
        assert_eq!(report.start, 1);
        assert_eq!(report.created + report.duplicates, report.target - report.existing);
    }

    #[tokio::test]
    async fn test_unexpected_error_fails_the_pass() {
        let provider = MockProvider::new();
        provider.fail_writes_when(|index| {
            (index == 7).then(|| crate::Error::Backend("disk full".into()))
        });

        let result = ensure_dataset(&provider, 50, &SeedOptions::new().with_concurrency(2)).await;
        let reason = match result {
            SeedResult::Failed { reason } => reason,
            other => panic!("expected failure, got {:?}", other),
        };
        assert!(reason.contains("disk full"), "{}", reason);
        assert!(provider.writes() < 50, "workers must stop claiming after a failure");
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_reported() {
        let provider = MockProvider::new();
        provider.disconnect();
        let result = ensure_dataset(&provider, 5, &SeedOptions::new()).await;
        assert!(matches!(result, SeedResult::Failed { .. }));
    }

    #[tokio::test]
    async fn test_retry_after_partial_failure_fills_gaps() {
        let provider = MockProvider::new();
        provider.fail_writes_when(|index| {
            (index == 5).then(|| crate::Error::Backend("connection reset".into()))
        });
        let options = SeedOptions::new().with_concurrency(8);

        let first = ensure_dataset(&provider, 20, &options).await;
        assert!(!first.is_ready());
        let left_behind = provider.seeded_ids().len() as u64;
        assert!(left_behind < 20);

        provider.clear_write_fault();
        let report = ready(ensure_dataset(&provider, 20, &options).await);
        assert!(!report.already_seeded);
        assert_eq!(report.start, 1);
        assert_eq!(report.created, 20 - left_behind);
        assert_eq!(report.duplicates, left_behind);

        let ids = provider.seeded_ids();
        assert_eq!(ids.len(), 20);
        assert!(ids.contains(&format_aggregate_id(5).unwrap()));

        let writes = provider.writes();
        let third = ready(ensure_dataset(&provider, 20, &options).await);
        assert!(third.already_seeded);
        assert_eq!(provider.writes(), writes);
    }

    #[tokio::test]
    async fn test_gap_below_count_triggers_rescan() {
        let provider = MockProvider::new();
        assert!(ensure_dataset(&provider, 6, &SeedOptions::new()).await.is_ready());
        // Drop index 2 while keeping the count at five rows ending at 6.
        provider.remove_aggregate(&format_aggregate_id(2).unwrap());

        let report = ready(ensure_dataset(&provider, 10, &SeedOptions::new()).await);
        assert_eq!(report.existing, 5);
        assert_eq!(report.start, 1);
        assert_eq!(report.created, 5);
        assert_eq!(report.duplicates, 5);
        assert_eq!(provider.seeded_ids().len(), 10);
    }

    #[tokio::test]
    async fn test_each_index_claimed_once() {
        let provider = MockProvider::new();
        let result = ensure_dataset(&provider, 100, &SeedOptions::new().with_concurrency(16)).await;
        assert!(result.is_ready());
        let ids = provider.seeded_ids();
        assert_eq!(ids.len(), 100);
        assert_eq!(provider.writes(), 100);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let provider = MockProvider::new();
        let result = ensure_dataset(&provider, 3, &SeedOptions::new().with_concurrency(0)).await;
        assert!(result.is_ready());
        assert_eq!(provider.seeded_ids().len(), 3);
    }
}
