//! SQLite provider.
//!
//! Aggregates and events live in two tables of a single database; every state
//! change and its event are written in one transaction. State is stored as
//! JSON text and filtered with `json_extract`.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use serde_json::{Map, Value};

use esbench_core::model::{
    merge_state, AggregateDraft, AggregateRecord, EventDraft, EventRecord, FieldFilter,
};
use esbench_core::{Error, OperationProvider, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS aggregates (
    category TEXT NOT NULL,
    id TEXT NOT NULL,
    state TEXT NOT NULL,
    version INTEGER NOT NULL,
    archived INTEGER NOT NULL DEFAULT 0,
    synthetic INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (category, id)
);

CREATE TABLE IF NOT EXISTS events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    synthetic INTEGER NOT NULL DEFAULT 0,
    recorded_at TEXT NOT NULL,
    UNIQUE (category, aggregate_id, version)
);

CREATE INDEX IF NOT EXISTS idx_aggregates_synthetic ON aggregates(category, synthetic);
CREATE INDEX IF NOT EXISTS idx_events_synthetic ON events(synthetic);
"#;

const AGGREGATE_COLUMNS: &str = "category, id, state, version, archived, synthetic";

/// Provider backed by a single SQLite connection.
pub struct SqliteProvider {
    conn: Mutex<Connection>,
}

impl SqliteProvider {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(sql_error)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(sql_error)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(sql_error)?;
        tracing::info!(path = %path.display(), "opened sqlite database");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(sql_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a transaction and commit it.
    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_error)?;
        let value = f(&tx)?;
        tx.commit().map_err(sql_error)?;
        Ok(value)
    }

    fn query_aggregates(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<AggregateRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql).map_err(sql_error)?;
        let rows = stmt
            .query_map(params, RawAggregate::from_row)
            .map_err(sql_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_error)?;
        rows.into_iter().map(RawAggregate::decode).collect()
    }

    fn transition(&self, category: &str, id: &str, event: &EventDraft, update: &str) -> Result<()> {
        self.write(|tx| bump(tx, category, id, event, update, &[]))
    }
}

/// Bump the version of an aggregate, apply `update` to the same row and append
/// `event`. `update` is a SET fragment whose parameters start at `?4`.
fn bump(
    tx: &Transaction<'_>,
    category: &str,
    id: &str,
    event: &EventDraft,
    update: &str,
    update_params: &[&dyn rusqlite::ToSql],
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let sql = format!(
        "UPDATE aggregates SET version = version + 1, updated_at = ?1{} \
         WHERE category = ?2 AND id = ?3 RETURNING version, synthetic",
        update
    );
    let mut all_params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(3 + update_params.len());
    all_params.push(&now);
    all_params.push(&category);
    all_params.push(&id);
    all_params.extend_from_slice(update_params);
    let (version, synthetic) = tx
        .query_row(&sql, all_params.as_slice(), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?))
        })
        .optional()
        .map_err(sql_error)?
        .ok_or_else(|| not_found(category, id))?;
    insert_event(tx, category, id, version, event, synthetic, &now)
}

fn insert_event(
    tx: &Transaction<'_>,
    category: &str,
    id: &str,
    version: i64,
    event: &EventDraft,
    synthetic: bool,
    now: &str,
) -> Result<()> {
    let payload = serde_json::to_string(&event.payload)?;
    tx.prepare_cached(
        "INSERT INTO events (category, aggregate_id, version, event_type, payload, synthetic, recorded_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![category, id, version, event.event_type, payload, synthetic, now])
    })
    .map_err(sql_error)?;
    Ok(())
}

fn not_found(category: &str, id: &str) -> Error {
    Error::NotFound {
        category: category.to_string(),
        id: id.to_string(),
    }
}

/// Map a driver error onto the harness taxonomy.
fn sql_error(e: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, message) = &e {
        if failure.code == ErrorCode::ConstraintViolation
            && matches!(
                failure.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            )
        {
            return Error::Duplicate(
                message
                    .clone()
                    .unwrap_or_else(|| "unique constraint failed".to_string()),
            );
        }
    }
    Error::Backend(e.to_string())
}

/// JSON value as a bind parameter comparable with `json_extract` output.
fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

struct RawAggregate {
    category: String,
    id: String,
    state: String,
    version: i64,
    archived: bool,
    synthetic: bool,
}

impl RawAggregate {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            category: row.get(0)?,
            id: row.get(1)?,
            state: row.get(2)?,
            version: row.get(3)?,
            archived: row.get(4)?,
            synthetic: row.get(5)?,
        })
    }

    fn decode(self) -> Result<AggregateRecord> {
        Ok(AggregateRecord {
            state: serde_json::from_str(&self.state)?,
            category: self.category,
            id: self.id,
            version: self.version,
            archived: self.archived,
            synthetic: self.synthetic,
        })
    }
}

#[async_trait]
impl OperationProvider for SqliteProvider {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn count_seeded(&self, category: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM aggregates WHERE category = ?1 AND synthetic = 1",
                [category],
                |row| row.get(0),
            )
            .map_err(sql_error)?;
        Ok(count as u64)
    }

    async fn is_seeded(&self, category: &str, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let synthetic: Option<bool> = conn
            .query_row(
                "SELECT synthetic FROM aggregates WHERE category = ?1 AND id = ?2",
                [category, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_error)?;
        Ok(synthetic.unwrap_or(false))
    }

    async fn create_aggregate(&self, draft: &AggregateDraft) -> Result<()> {
        let state = serde_json::to_string(&draft.state)?;
        self.write(|tx| {
            let now = Utc::now().to_rfc3339();
            tx.prepare_cached(
                "INSERT INTO aggregates (category, id, state, version, archived, synthetic, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, 1, 0, ?4, ?5, ?5)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![draft.category, draft.id, state, draft.synthetic, now])
            })
            .map_err(sql_error)?;
            insert_event(
                tx,
                &draft.category,
                &draft.id,
                1,
                &draft.event,
                draft.synthetic,
                &now,
            )
        })
    }

    async fn list(&self, category: &str, offset: u64, limit: usize) -> Result<Vec<AggregateRecord>> {
        let sql = format!(
            "SELECT {} FROM aggregates WHERE category = ?1 ORDER BY id LIMIT ?2 OFFSET ?3",
            AGGREGATE_COLUMNS
        );
        self.query_aggregates(&sql, params![category, limit as i64, offset as i64])
    }

    async fn get(&self, category: &str, id: &str) -> Result<Option<AggregateRecord>> {
        let sql = format!(
            "SELECT {} FROM aggregates WHERE category = ?1 AND id = ?2",
            AGGREGATE_COLUMNS
        );
        Ok(self
            .query_aggregates(&sql, params![category, id])?
            .into_iter()
            .next())
    }

    async fn select(
        &self,
        category: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<AggregateRecord>> {
        let sql = format!(
            "SELECT {} FROM aggregates \
             WHERE category = ?1 AND json_extract(state, '$.' || ?2) IS ?3 \
             ORDER BY id LIMIT ?4",
            AGGREGATE_COLUMNS
        );
        let value = sql_value(&filter.value);
        self.query_aggregates(&sql, params![category, filter.field, value, limit as i64])
    }

    async fn events(&self, category: &str, id: &str, limit: usize) -> Result<Vec<EventRecord>> {
        let raw = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(
                    "SELECT version, event_type, payload, synthetic FROM events \
                     WHERE category = ?1 AND aggregate_id = ?2 ORDER BY version DESC LIMIT ?3",
                )
                .map_err(sql_error)?;
            let rows = stmt
                .query_map(params![category, id, limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                })
                .map_err(sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error)?;
            rows
        };

        raw.into_iter()
            .map(|(version, event_type, payload, synthetic)| {
                Ok(EventRecord {
                    category: category.to_string(),
                    aggregate_id: id.to_string(),
                    version,
                    event_type,
                    payload: serde_json::from_str(&payload)?,
                    synthetic,
                })
            })
            .collect()
    }

    async fn apply(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.transition(category, id, event, "")
    }

    async fn archive(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.transition(category, id, event, ", archived = 1")
    }

    async fn restore(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.transition(category, id, event, ", archived = 0")
    }

    async fn patch(
        &self,
        category: &str,
        id: &str,
        patch: &Map<String, Value>,
        event: &EventDraft,
    ) -> Result<()> {
        self.write(|tx| {
            let current: Option<String> = tx
                .query_row(
                    "SELECT state FROM aggregates WHERE category = ?1 AND id = ?2",
                    [category, id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sql_error)?;
            let current = current.ok_or_else(|| not_found(category, id))?;
            let mut state: Map<String, Value> = serde_json::from_str(&current)?;
            merge_state(&mut state, patch);
            let state = serde_json::to_string(&state)?;
            bump(tx, category, id, event, ", state = ?4", &[&state as &dyn rusqlite::ToSql])
        })
    }

    async fn purge_synthetic(&self) -> Result<u64> {
        let removed = self.write(|tx| {
            tx.execute("DELETE FROM events WHERE synthetic = 1", [])
                .map_err(sql_error)?;
            tx.execute("DELETE FROM aggregates WHERE synthetic = 1", [])
                .map_err(sql_error)
        })?;
        tracing::info!(removed, "purged synthetic sqlite rows");
        Ok(removed as u64)
    }
}
