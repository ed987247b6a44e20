//! In-process provider backed by ordered maps.
//!
//! Serves as the zero-I/O baseline the other backends are compared against.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use esbench_core::model::{
    merge_state, AggregateDraft, AggregateRecord, EventDraft, EventRecord, FieldFilter,
};
use esbench_core::{Error, OperationProvider, Result};

type Key = (String, String);

#[derive(Default)]
struct Store {
    /// Aggregates per category, ordered by id.
    aggregates: HashMap<String, BTreeMap<String, AggregateRecord>>,
    /// Event streams per aggregate, oldest first.
    streams: HashMap<Key, Vec<EventRecord>>,
}

impl Store {
    fn aggregate_mut(&mut self, category: &str, id: &str) -> Result<&mut AggregateRecord> {
        self.aggregates
            .get_mut(category)
            .and_then(|by_id| by_id.get_mut(id))
            .ok_or_else(|| Error::NotFound {
                category: category.to_string(),
                id: id.to_string(),
            })
    }

    fn append(&mut self, record: &AggregateRecord, event: &EventDraft) {
        self.streams
            .entry((record.category.clone(), record.id.clone()))
            .or_default()
            .push(EventRecord {
                category: record.category.clone(),
                aggregate_id: record.id.clone(),
                version: record.version,
                event_type: event.event_type.clone(),
                payload: event.payload.clone(),
                synthetic: record.synthetic,
            });
    }

    /// Apply `change` to an aggregate, bump its version and record `event`.
    fn transition<F>(&mut self, category: &str, id: &str, event: &EventDraft, change: F) -> Result<()>
    where
        F: FnOnce(&mut AggregateRecord),
    {
        let record = self.aggregate_mut(category, id)?;
        change(record);
        record.version += 1;
        let record = record.clone();
        self.append(&record, event);
        Ok(())
    }
}

/// Provider keeping aggregates and events in memory.
#[derive(Default)]
pub struct MemoryProvider {
    store: RwLock<Store>,
    closed: AtomicBool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a dropped client: every later call fails.
    pub fn disconnect(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_connected(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Disconnected("memory provider was disconnected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OperationProvider for MemoryProvider {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn count_seeded(&self, category: &str) -> Result<u64> {
        self.check_connected()?;
        let store = self.store.read();
        Ok(store
            .aggregates
            .get(category)
            .map(|by_id| by_id.values().filter(|a| a.synthetic).count() as u64)
            .unwrap_or(0))
    }

    async fn is_seeded(&self, category: &str, id: &str) -> Result<bool> {
        self.check_connected()?;
        let store = self.store.read();
        Ok(store
            .aggregates
            .get(category)
            .and_then(|by_id| by_id.get(id))
            .is_some_and(|a| a.synthetic))
    }

    async fn create_aggregate(&self, draft: &AggregateDraft) -> Result<()> {
        self.check_connected()?;
        let mut store = self.store.write();
        let by_id = store.aggregates.entry(draft.category.clone()).or_default();
        if by_id.contains_key(&draft.id) {
            return Err(Error::Duplicate(format!(
                "aggregate {}/{} already exists",
                draft.category, draft.id
            )));
        }
        let record = AggregateRecord {
            category: draft.category.clone(),
            id: draft.id.clone(),
            state: draft.state.clone(),
            version: 1,
            archived: false,
            synthetic: draft.synthetic,
        };
        by_id.insert(draft.id.clone(), record.clone());
        store.append(&record, &draft.event);
        Ok(())
    }

    async fn list(&self, category: &str, offset: u64, limit: usize) -> Result<Vec<AggregateRecord>> {
        self.check_connected()?;
        let store = self.store.read();
        let Some(by_id) = store.aggregates.get(category) else {
            return Ok(Vec::new());
        };
        Ok(by_id
            .values()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, category: &str, id: &str) -> Result<Option<AggregateRecord>> {
        self.check_connected()?;
        let store = self.store.read();
        Ok(store
            .aggregates
            .get(category)
            .and_then(|by_id| by_id.get(id))
            .cloned())
    }

    async fn select(
        &self,
        category: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<AggregateRecord>> {
        self.check_connected()?;
        let store = self.store.read();
        let Some(by_id) = store.aggregates.get(category) else {
            return Ok(Vec::new());
        };
        Ok(by_id
            .values()
            .filter(|a| filter.matches(&a.state))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn events(&self, category: &str, id: &str, limit: usize) -> Result<Vec<EventRecord>> {
        self.check_connected()?;
        let store = self.store.read();
        Ok(store
            .streams
            .get(&(category.to_string(), id.to_string()))
            .map(|stream| stream.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn apply(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.check_connected()?;
        self.store.write().transition(category, id, event, |_| {})
    }

    async fn archive(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.check_connected()?;
        self.store
            .write()
            .transition(category, id, event, |a| a.archived = true)
    }

    async fn restore(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.check_connected()?;
        self.store
            .write()
            .transition(category, id, event, |a| a.archived = false)
    }

    async fn patch(
        &self,
        category: &str,
        id: &str,
        patch: &Map<String, Value>,
        event: &EventDraft,
    ) -> Result<()> {
        self.check_connected()?;
        self.store
            .write()
            .transition(category, id, event, |a| merge_state(&mut a.state, patch))
    }

    async fn purge_synthetic(&self) -> Result<u64> {
        self.check_connected()?;
        let mut store = self.store.write();
        let mut removed = 0;
        for by_id in store.aggregates.values_mut() {
            let before = by_id.len();
            by_id.retain(|_, a| !a.synthetic);
            removed += (before - by_id.len()) as u64;
        }
        store.aggregates.retain(|_, by_id| !by_id.is_empty());
        store.streams.retain(|_, stream| {
            stream.retain(|e| !e.synthetic);
            !stream.is_empty()
        });
        Ok(removed)
    }
}
