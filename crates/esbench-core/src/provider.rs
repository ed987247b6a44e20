//! Operation provider interface and optional provider loading.
//!
//! A provider wraps one backend (SQLite, PostgreSQL, ...) and exposes the
//! CRUD operations the harness seeds and measures. Providers are supplied by
//! the caller already resolved; [`load_optional_provider`] turns the attempts
//! to construct one into a value the suite can report as a skip.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::model::{AggregateDraft, AggregateRecord, EventDraft, EventRecord, FieldFilter};

/// Backend operations used by seeding and by the benchmark workload.
#[async_trait]
pub trait OperationProvider: Send + Sync {
    /// Short backend name used in logs and reports.
    fn backend(&self) -> &str;

    /// Number of synthetic aggregates in `category`.
    async fn count_seeded(&self, category: &str) -> Result<u64>;

    /// Whether the aggregate exists and carries the synthetic marker.
    async fn is_seeded(&self, category: &str, id: &str) -> Result<bool>;

    /// Create an aggregate together with its originating event.
    ///
    /// Must fail with an error for which [`Error::is_duplicate`] holds when the
    /// aggregate already exists.
    ///
    /// [`Error::is_duplicate`]: crate::Error::is_duplicate
    async fn create_aggregate(&self, draft: &AggregateDraft) -> Result<()>;

    /// A page of aggregates ordered by id.
    async fn list(&self, category: &str, offset: u64, limit: usize)
        -> Result<Vec<AggregateRecord>>;

    async fn get(&self, category: &str, id: &str) -> Result<Option<AggregateRecord>>;

    /// Aggregates whose state matches `filter`, ordered by id.
    async fn select(
        &self,
        category: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<AggregateRecord>>;

    /// The most recent events of an aggregate, newest first.
    async fn events(&self, category: &str, id: &str, limit: usize) -> Result<Vec<EventRecord>>;

    /// Append an event and bump the aggregate version.
    async fn apply(&self, category: &str, id: &str, event: &EventDraft) -> Result<()>;

    /// Mark an aggregate archived and record `event`.
    async fn archive(&self, category: &str, id: &str, event: &EventDraft) -> Result<()>;

    /// Clear the archived flag and record `event`.
    async fn restore(&self, category: &str, id: &str, event: &EventDraft) -> Result<()>;

    /// Merge `patch` into the aggregate state and record `event`.
    async fn patch(
        &self,
        category: &str,
        id: &str,
        patch: &Map<String, Value>,
        event: &EventDraft,
    ) -> Result<()>;

    /// Delete every synthetic aggregate and event. Returns the number of
    /// aggregates removed.
    async fn purge_synthetic(&self) -> Result<u64>;
}

/// Shared handle to a provider.
pub type SharedProvider = Arc<dyn OperationProvider>;

/// One way of constructing a provider.
///
/// Resolves to `Ok(None)` when the backend is not configured at all.
pub type ProviderStrategy = Box<dyn FnOnce() -> BoxFuture<'static, Result<Option<SharedProvider>>> + Send>;

/// Outcome of trying to obtain a provider.
#[derive(Clone)]
pub enum ProviderLoad {
    Loaded(SharedProvider),
    Unavailable { backend: String, reason: String },
}

impl ProviderLoad {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ProviderLoad::Loaded(_))
    }
}

impl fmt::Debug for ProviderLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderLoad::Loaded(provider) => {
                f.debug_tuple("Loaded").field(&provider.backend()).finish()
            }
            ProviderLoad::Unavailable { backend, reason } => f
                .debug_struct("Unavailable")
                .field("backend", backend)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Try each strategy in order and keep the first provider produced.
///
/// When none succeeds the first error is reported, or a generic
/// "not found" reason when no strategy produced an error.
pub async fn load_optional_provider(
    backend: &str,
    strategies: Vec<ProviderStrategy>,
) -> ProviderLoad {
    let mut first_error = None;

    for (attempt, strategy) in strategies.into_iter().enumerate() {
        match strategy().await {
            Ok(Some(provider)) => {
                tracing::debug!(backend, attempt, "provider loaded");
                return ProviderLoad::Loaded(provider);
            }
            Ok(None) => {
                tracing::debug!(backend, attempt, "provider strategy found nothing");
            }
            Err(e) => {
                tracing::debug!(backend, attempt, error = %e, "provider strategy failed");
                first_error.get_or_insert(e);
            }
        }
    }

    let reason = match first_error {
        Some(e) => e.to_string(),
        None => format!("provider `{}` not found", backend),
    };
    tracing::warn!(backend, %reason, "provider unavailable");
    ProviderLoad::Unavailable {
        backend: backend.to_string(),
        reason,
    }
}
