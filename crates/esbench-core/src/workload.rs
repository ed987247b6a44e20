//! Benchmark workload: the nine operations bound to a provider.
//!
//! Every operation picks its target through the run's [`IdSampler`], so
//! successive iterations walk the seeded pool round-robin instead of hitting a
//! single hot aggregate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::dataset::{IdSampler, SELECT_BUCKETS};
use crate::error::{Error, Result};
use crate::model::{
    AggregateDraft, EventDraft, FieldFilter, EVENT_ARCHIVED, EVENT_CREDITED, EVENT_OPENED,
    EVENT_PATCHED, EVENT_RESTORED, SCRATCH_CATEGORY, SEED_CATEGORY,
};
use crate::operation::{BenchOperation, OperationLabel};
use crate::provider::SharedProvider;

/// Default page size for `list` and `select`.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 50;

/// Default number of events read by `events`.
pub const DEFAULT_EVENTS_WINDOW: usize = 20;

/// Sizes the workload operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// Number of seeded aggregates to sample from.
    pub size: u64,
    pub list_page_size: usize,
    pub events_window: usize,
}

impl WorkloadConfig {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            events_window: DEFAULT_EVENTS_WINDOW,
        }
    }

    pub fn with_list_page_size(mut self, page_size: usize) -> Self {
        self.list_page_size = page_size.max(1);
        self
    }

    pub fn with_events_window(mut self, window: usize) -> Self {
        self.events_window = window.max(1);
        self
    }
}

/// State shared by the operations of one run.
struct Shared {
    provider: SharedProvider,
    config: WorkloadConfig,
    sampler: Mutex<IdSampler>,
    created: AtomicU64,
    run_tag: String,
}

impl Shared {
    fn next_id(&self) -> Result<String> {
        self.sampler.lock().next_id(self.config.size)
    }

    fn next_index(&self, size: u64) -> Result<u64> {
        self.sampler.lock().next(size)
    }

    fn page_count(&self) -> u64 {
        let page = self.config.list_page_size as u64;
        self.config.size.div_ceil(page).max(1)
    }

    fn scratch_id(&self) -> String {
        let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{:010}", self.run_tag, n)
    }
}

/// Builds the benchmark operations for one provider and dataset size.
#[derive(Clone)]
pub struct Workload {
    shared: Arc<Shared>,
}

impl Workload {
    pub fn new(provider: SharedProvider, config: WorkloadConfig) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self {
            shared: Arc::new(Shared {
                provider,
                config,
                sampler: Mutex::new(IdSampler::new()),
                created: AtomicU64::new(0),
                run_tag: format!("run-{:x}", nanos),
            }),
        }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.shared.config
    }

    /// Every operation, in label order.
    pub fn operations(&self) -> Vec<BenchOperation> {
        OperationLabel::ALL
            .iter()
            .map(|label| self.operation(*label))
            .collect()
    }

    /// The operation for a single label.
    pub fn operation(&self, label: OperationLabel) -> BenchOperation {
        let shared = self.shared.clone();
        BenchOperation::new(label.as_str(), move || {
            let shared = shared.clone();
            async move { execute(&shared, label).await }
        })
    }
}

async fn execute(shared: &Shared, label: OperationLabel) -> Result<()> {
    let provider = &shared.provider;
    let config = &shared.config;

    match label {
        OperationLabel::List => {
            let page = shared.next_index(shared.page_count())?;
            let offset = (page - 1) * config.list_page_size as u64;
            provider
                .list(SEED_CATEGORY, offset, config.list_page_size)
                .await?;
        }
        OperationLabel::Get => {
            let id = shared.next_id()?;
            if provider.get(SEED_CATEGORY, &id).await?.is_none() {
                return Err(Error::NotFound {
                    category: SEED_CATEGORY.to_string(),
                    id,
                });
            }
        }
        OperationLabel::Select => {
            let bucket = shared.next_index(SELECT_BUCKETS)? - 1;
            let filter = FieldFilter::eq("bucket", bucket);
            provider
                .select(SEED_CATEGORY, &filter, config.list_page_size)
                .await?;
        }
        OperationLabel::Events => {
            let id = shared.next_id()?;
            provider
                .events(SEED_CATEGORY, &id, config.events_window)
                .await?;
        }
        OperationLabel::Apply => {
            let id = shared.next_id()?;
            let event = EventDraft::new(EVENT_CREDITED, json!({ "amount": 1 }));
            provider.apply(SEED_CATEGORY, &id, &event).await?;
        }
        OperationLabel::Create => {
            let draft = scratch_draft(shared.scratch_id());
            provider.create_aggregate(&draft).await?;
        }
        OperationLabel::Archive => {
            let id = shared.next_id()?;
            let event = EventDraft::new(EVENT_ARCHIVED, json!({}));
            provider.archive(SEED_CATEGORY, &id, &event).await?;
        }
        OperationLabel::Restore => {
            let id = shared.next_id()?;
            let event = EventDraft::new(EVENT_RESTORED, json!({}));
            provider.restore(SEED_CATEGORY, &id, &event).await?;
        }
        OperationLabel::Patch => {
            let id = shared.next_id()?;
            let mut patch = Map::new();
            patch.insert("status".into(), Value::from("patched"));
            patch.insert("nickname".into(), Value::from(format!("acct-{}", id)));
            let event = EventDraft::new(EVENT_PATCHED, Value::Object(patch.clone()));
            provider.patch(SEED_CATEGORY, &id, &patch, &event).await?;
        }
    }
    Ok(())
}

fn scratch_draft(id: String) -> AggregateDraft {
    let mut state = Map::new();
    state.insert("owner".into(), Value::from("scratch"));
    state.insert("balance".into(), Value::from(0));
    state.insert("status".into(), Value::from("open"));
    AggregateDraft {
        category: SCRATCH_CATEGORY.to_string(),
        id,
        event: EventDraft::new(EVENT_OPENED, Value::Object(state.clone())),
        state,
        synthetic: true,
    }
}
