//! Dataset sizing and deterministic seed data.
//!
//! Seeded aggregates are addressed by a 1-based index. The index is rendered
//! as a zero-padded id so that lexicographic order on the backend matches
//! numeric order, and every field of a seeded record is derived from the index
//! alone so that re-seeding produces identical rows.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::model::{AggregateDraft, EventDraft, EVENT_OPENED, SEED_CATEGORY};

/// Width of a formatted aggregate id.
pub const AGGREGATE_ID_WIDTH: usize = 16;

/// Default dataset tiers.
pub const DEFAULT_TIERS: [u64; 4] = [1_000, 10_000, 100_000, 1_000_000];

/// Number of distinct `bucket` values in seeded state, used by `select`.
pub const SELECT_BUCKETS: u64 = 16;

const SEED: u64 = 12345;

/// Format a 1-based index as a fixed-width aggregate id.
pub fn format_aggregate_id(index: i64) -> Result<String> {
    if index <= 0 {
        return Err(Error::InvalidIndex(index));
    }
    Ok(format!("{:0width$}", index, width = AGGREGATE_ID_WIDTH))
}

/// Ascending, de-duplicated list of dataset sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetTiers(Vec<u64>);

impl DatasetTiers {
    /// Build a tier list, sorting and removing duplicates.
    ///
    /// Zero-sized tiers and empty lists are rejected.
    pub fn new(tiers: impl IntoIterator<Item = u64>) -> Result<Self> {
        let mut tiers: Vec<u64> = tiers.into_iter().collect();
        if tiers.is_empty() {
            return Err(Error::Config("at least one dataset tier is required".into()));
        }
        if tiers.contains(&0) {
            return Err(Error::Config("dataset tiers must be positive".into()));
        }
        tiers.sort_unstable();
        tiers.dedup();
        Ok(Self(tiers))
    }

    /// Parse a comma-separated tier list such as `"1000,10000"`.
    ///
    /// Underscores are accepted as digit separators.
    pub fn parse(input: &str) -> Result<Self> {
        let tiers = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.replace('_', "")
                    .parse::<u64>()
                    .map_err(|e| Error::Config(format!("invalid dataset tier `{}`: {}", s, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(tiers)
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    pub fn largest(&self) -> u64 {
        self.0.last().copied().unwrap_or_default()
    }
}

impl Default for DatasetTiers {
    fn default() -> Self {
        Self(DEFAULT_TIERS.to_vec())
    }
}

/// Round-robin id sampler.
///
/// Keeps one cursor per pool size, so operations benchmarking different tiers
/// each walk their pool from the start.
#[derive(Debug, Default)]
pub struct IdSampler {
    cursors: HashMap<u64, u64>,
}

impl IdSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next index in `1..=size`, wrapping back to 1 after `size`.
    pub fn next(&mut self, size: u64) -> Result<u64> {
        if size == 0 {
            return Err(Error::EmptyAggregateSet);
        }
        let cursor = self.cursors.entry(size).or_insert(0);
        let index = *cursor % size + 1;
        *cursor = index % size;
        Ok(index)
    }

    /// Next aggregate id in a pool of `size`.
    pub fn next_id(&mut self, size: u64) -> Result<String> {
        let index = self.next(size)?;
        format_aggregate_id(index as i64)
    }
}

/// Seed state for the aggregate at `index`.
pub fn seed_state(index: u64) -> Map<String, Value> {
    let mut rng = StdRng::seed_from_u64(SEED.wrapping_add(index));
    let balance: i64 = rng.gen_range(0..1_000_000);
    let state = json!({
        "index": index,
        "owner": format!("owner-{}", index % 100),
        "bucket": index % SELECT_BUCKETS,
        "balance": balance,
        "status": "open",
    });
    match state {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// The seed record (aggregate plus originating event) for `index`.
pub fn seed_draft(index: u64) -> Result<AggregateDraft> {
    let id = format_aggregate_id(index as i64)?;
    let state = seed_state(index);
    let event = EventDraft::new(EVENT_OPENED, Value::Object(state.clone()));
    Ok(AggregateDraft {
        category: SEED_CATEGORY.to_string(),
        id,
        state,
        synthetic: true,
        event,
    })
}
