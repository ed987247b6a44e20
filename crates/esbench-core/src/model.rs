//! Row types exchanged with operation providers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category holding the seeded benchmark dataset.
pub const SEED_CATEGORY: &str = "bench_account";

/// Category receiving aggregates produced by the `create` operation.
pub const SCRATCH_CATEGORY: &str = "bench_scratch";

/// Event type recorded when an aggregate is created.
pub const EVENT_OPENED: &str = "AccountOpened";
/// Event type recorded by the `apply` operation.
pub const EVENT_CREDITED: &str = "AccountCredited";
/// Event type recorded by the `archive` operation.
pub const EVENT_ARCHIVED: &str = "AccountArchived";
/// Event type recorded by the `restore` operation.
pub const EVENT_RESTORED: &str = "AccountRestored";
/// Event type recorded by the `patch` operation.
pub const EVENT_PATCHED: &str = "AccountPatched";

/// A new aggregate together with its originating event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDraft {
    pub category: String,
    pub id: String,
    pub state: Map<String, Value>,
    /// Synthetic-dataset marker.
    pub synthetic: bool,
    pub event: EventDraft,
}

/// An event to append to an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub event_type: String,
    pub payload: Value,
}

impl EventDraft {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// A stored aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub category: String,
    pub id: String,
    pub state: Map<String, Value>,
    pub version: i64,
    pub archived: bool,
    pub synthetic: bool,
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub category: String,
    pub aggregate_id: String,
    pub version: i64,
    pub event_type: String,
    pub payload: Value,
    pub synthetic: bool,
}

/// Equality filter on a top-level state field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check a state object against this filter.
    pub fn matches(&self, state: &Map<String, Value>) -> bool {
        state.get(&self.field) == Some(&self.value)
    }
}

/// Merge `patch` into `state`, replacing top-level keys.
pub fn merge_state(state: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        state.insert(key.clone(), value.clone());
    }
}
