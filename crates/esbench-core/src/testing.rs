//! In-crate provider double for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::{
    merge_state, AggregateDraft, AggregateRecord, EventDraft, EventRecord, FieldFilter,
};
use crate::provider::OperationProvider;

type WriteFault = Box<dyn Fn(u64) -> Option<Error> + Send + Sync>;

/// Provider keeping everything in memory and counting writes.
#[derive(Default)]
pub struct MockProvider {
    aggregates: Mutex<BTreeMap<(String, String), AggregateRecord>>,
    events: Mutex<Vec<EventRecord>>,
    writes: AtomicU64,
    disconnected: AtomicBool,
    write_fault: Mutex<Option<WriteFault>>,
    op_fault: Mutex<Option<(String, String)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `create_aggregate` calls.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn seeded_ids(&self) -> Vec<String> {
        self.aggregates
            .lock()
            .values()
            .filter(|a| a.synthetic && a.category == crate::model::SEED_CATEGORY)
            .map(|a| a.id.clone())
            .collect()
    }

    /// Delete one seeded aggregate, leaving a hole in the index range.
    pub fn remove_aggregate(&self, id: &str) {
        self.aggregates
            .lock()
            .remove(&(crate::model::SEED_CATEGORY.to_string(), id.to_string()));
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Fail every call from now on with a connection error.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Fail `create_aggregate` for ids whose numeric value maps to an error.
    pub fn fail_writes_when<F>(&self, fault: F)
    where
        F: Fn(u64) -> Option<Error> + Send + Sync + 'static,
    {
        *self.write_fault.lock() = Some(Box::new(fault));
    }

    pub fn clear_write_fault(&self) {
        *self.write_fault.lock() = None;
    }

    /// Fail the named operation with a backend error carrying `message`.
    pub fn fail_operation(&self, operation: &str, message: &str) {
        *self.op_fault.lock() = Some((operation.to_string(), message.to_string()));
    }

    async fn enter(&self, operation: &str) -> Result<()> {
        tokio::task::yield_now().await;
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(Error::Disconnected("mock provider closed".into()));
        }
        if let Some((op, message)) = self.op_fault.lock().as_ref() {
            if op == operation {
                return Err(Error::Backend(message.clone()));
            }
        }
        Ok(())
    }

    fn record_event(&self, category: &str, id: &str, version: i64, event: &EventDraft) {
        self.events.lock().push(EventRecord {
            category: category.to_string(),
            aggregate_id: id.to_string(),
            version,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            synthetic: true,
        });
    }

    fn mutate<F>(&self, category: &str, id: &str, event: &EventDraft, f: F) -> Result<()>
    where
        F: FnOnce(&mut AggregateRecord),
    {
        let version = {
            let mut aggregates = self.aggregates.lock();
            let record = aggregates
                .get_mut(&(category.to_string(), id.to_string()))
                .ok_or_else(|| Error::NotFound {
                    category: category.to_string(),
                    id: id.to_string(),
                })?;
            f(record);
            record.version += 1;
            record.version
        };
        self.record_event(category, id, version, event);
        Ok(())
    }
}

#[async_trait]
impl OperationProvider for MockProvider {
    fn backend(&self) -> &str {
        "mock"
    }

    async fn count_seeded(&self, category: &str) -> Result<u64> {
        self.enter("count_seeded").await?;
        Ok(self
            .aggregates
            .lock()
            .values()
            .filter(|a| a.synthetic && a.category == category)
            .count() as u64)
    }

    async fn is_seeded(&self, category: &str, id: &str) -> Result<bool> {
        self.enter("is_seeded").await?;
        Ok(self
            .aggregates
            .lock()
            .get(&(category.to_string(), id.to_string()))
            .map(|a| a.synthetic)
            .unwrap_or(false))
    }

    async fn create_aggregate(&self, draft: &AggregateDraft) -> Result<()> {
        self.enter("create").await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.write_fault.lock().as_ref() {
            if let Some(e) = draft.id.parse::<u64>().ok().and_then(|index| fault(index)) {
                return Err(e);
            }
        }
        {
            let mut aggregates = self.aggregates.lock();
            let key = (draft.category.clone(), draft.id.clone());
            if aggregates.contains_key(&key) {
                return Err(Error::Duplicate(format!(
                    "aggregate {}/{} already exists",
                    draft.category, draft.id
                )));
            }
            aggregates.insert(
                key,
                AggregateRecord {
                    category: draft.category.clone(),
                    id: draft.id.clone(),
                    state: draft.state.clone(),
                    version: 1,
                    archived: false,
                    synthetic: draft.synthetic,
                },
            );
        }
        self.record_event(&draft.category, &draft.id, 1, &draft.event);
        Ok(())
    }

    async fn list(&self, category: &str, offset: u64, limit: usize) -> Result<Vec<AggregateRecord>> {
        self.enter("list").await?;
        Ok(self
            .aggregates
            .lock()
            .values()
            .filter(|a| a.category == category)
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, category: &str, id: &str) -> Result<Option<AggregateRecord>> {
        self.enter("get").await?;
        Ok(self
            .aggregates
            .lock()
            .get(&(category.to_string(), id.to_string()))
            .cloned())
    }

    async fn select(
        &self,
        category: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<AggregateRecord>> {
        self.enter("select").await?;
        Ok(self
            .aggregates
            .lock()
            .values()
            .filter(|a| a.category == category && filter.matches(&a.state))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn events(&self, category: &str, id: &str, limit: usize) -> Result<Vec<EventRecord>> {
        self.enter("events").await?;
        Ok(self
            .events
            .lock()
            .iter()
            .rev()
            .filter(|e| e.category == category && e.aggregate_id == id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn apply(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.enter("apply").await?;
        self.mutate(category, id, event, |_| {})
    }

    async fn archive(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.enter("archive").await?;
        self.mutate(category, id, event, |a| a.archived = true)
    }

    async fn restore(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.enter("restore").await?;
        self.mutate(category, id, event, |a| a.archived = false)
    }

    async fn patch(
        &self,
        category: &str,
        id: &str,
        patch: &Map<String, Value>,
        event: &EventDraft,
    ) -> Result<()> {
        self.enter("patch").await?;
        self.mutate(category, id, event, |a| merge_state(&mut a.state, patch))
    }

    async fn purge_synthetic(&self) -> Result<u64> {
        self.enter("purge").await?;
        let mut aggregates = self.aggregates.lock();
        let before = aggregates.len();
        aggregates.retain(|_, a| !a.synthetic);
        self.events.lock().retain(|e| !e.synthetic);
        Ok((before - aggregates.len()) as u64)
    }
}
