//! PostgreSQL provider.
//!
//! Requires a running PostgreSQL instance. Enable with `--features postgres`.
//! State and payloads are stored as JSONB and exchanged as text so no extra
//! driver features are needed.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use esbench_core::model::{AggregateDraft, AggregateRecord, EventDraft, EventRecord, FieldFilter};
use esbench_core::{Error, OperationProvider, Result};

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS esbench_aggregates (
        category TEXT NOT NULL,
        id TEXT NOT NULL,
        state JSONB NOT NULL,
        version BIGINT NOT NULL,
        archived BOOLEAN NOT NULL DEFAULT FALSE,
        synthetic BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (category, id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS esbench_events (
        seq BIGSERIAL PRIMARY KEY,
        category TEXT NOT NULL,
        aggregate_id TEXT NOT NULL,
        version BIGINT NOT NULL,
        event_type TEXT NOT NULL,
        payload JSONB NOT NULL,
        synthetic BOOLEAN NOT NULL DEFAULT FALSE,
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (category, aggregate_id, version)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_esbench_aggregates_synthetic ON esbench_aggregates(category, synthetic)",
    "CREATE INDEX IF NOT EXISTS idx_esbench_events_synthetic ON esbench_events(synthetic)",
];

const AGGREGATE_COLUMNS: &str = "category, id, state::text AS state, version, archived, synthetic";

/// Provider backed by a `sqlx` connection pool.
pub struct PostgresProvider {
    pool: PgPool,
}

impl PostgresProvider {
    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(pg_error)?;
        let provider = Self { pool };
        provider.ensure_schema().await?;
        tracing::info!("connected to postgres");
        Ok(provider)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(pg_error)?;
        }
        Ok(())
    }

    /// Close the pool. Later calls fail as disconnected.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(pg_error)
    }
}

/// Map a driver error onto the harness taxonomy.
fn pg_error(e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Error::Duplicate(db.message().to_string())
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            Error::Disconnected(e.to_string())
        }
        _ => Error::Backend(e.to_string()),
    }
}

fn not_found(category: &str, id: &str) -> Error {
    Error::NotFound {
        category: category.to_string(),
        id: id.to_string(),
    }
}

fn decode_aggregate(row: &PgRow) -> Result<AggregateRecord> {
    let state: String = row.try_get("state").map_err(pg_error)?;
    Ok(AggregateRecord {
        category: row.try_get("category").map_err(pg_error)?,
        id: row.try_get("id").map_err(pg_error)?,
        state: serde_json::from_str(&state)?,
        version: row.try_get("version").map_err(pg_error)?,
        archived: row.try_get("archived").map_err(pg_error)?,
        synthetic: row.try_get("synthetic").map_err(pg_error)?,
    })
}

async fn insert_event(
    tx: &mut Transaction<'static, Postgres>,
    category: &str,
    id: &str,
    version: i64,
    event: &EventDraft,
    synthetic: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO esbench_events (category, aggregate_id, version, event_type, payload, synthetic) \
         VALUES ($1, $2, $3, $4, $5::jsonb, $6)",
    )
    .bind(category)
    .bind(id)
    .bind(version)
    .bind(&event.event_type)
    .bind(serde_json::to_string(&event.payload)?)
    .bind(synthetic)
    .execute(&mut **tx)
    .await
    .map_err(pg_error)?;
    Ok(())
}

impl PostgresProvider {
    /// Bump the version of an aggregate, apply `update` and append `event` in
    /// one transaction. `update` is a SET fragment; `state` binds to `$3`.
    async fn transition(
        &self,
        category: &str,
        id: &str,
        event: &EventDraft,
        update: &str,
        state: Option<String>,
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        let sql = format!(
            "UPDATE esbench_aggregates SET version = version + 1, updated_at = now(){} \
             WHERE category = $1 AND id = $2 RETURNING version, synthetic",
            update
        );
        let mut query = sqlx::query(&sql).bind(category).bind(id);
        if let Some(state) = state {
            query = query.bind(state);
        }
        let row = query
            .fetch_optional(&mut *tx)
            .await
            .map_err(pg_error)?
            .ok_or_else(|| not_found(category, id))?;
        let version: i64 = row.try_get("version").map_err(pg_error)?;
        let synthetic: bool = row.try_get("synthetic").map_err(pg_error)?;
        insert_event(&mut tx, category, id, version, event, synthetic).await?;
        tx.commit().await.map_err(pg_error)
    }
}

#[async_trait]
impl OperationProvider for PostgresProvider {
    fn backend(&self) -> &str {
        "postgres"
    }

    async fn count_seeded(&self, category: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM esbench_aggregates WHERE category = $1 AND synthetic",
        )
        .bind(category)
        .fetch_one(&self.pool)
        .await
        .map_err(pg_error)?;
        Ok(count as u64)
    }

    async fn is_seeded(&self, category: &str, id: &str) -> Result<bool> {
        let synthetic: Option<bool> = sqlx::query_scalar(
            "SELECT synthetic FROM esbench_aggregates WHERE category = $1 AND id = $2",
        )
        .bind(category)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_error)?;
        Ok(synthetic.unwrap_or(false))
    }

    async fn create_aggregate(&self, draft: &AggregateDraft) -> Result<()> {
        let state = serde_json::to_string(&draft.state)?;
        let mut tx = self.begin().await?;
        sqlx::query(
            "INSERT INTO esbench_aggregates (category, id, state, version, synthetic) \
             VALUES ($1, $2, $3::jsonb, 1, $4)",
        )
        .bind(&draft.category)
        .bind(&draft.id)
        .bind(state)
        .bind(draft.synthetic)
        .execute(&mut *tx)
        .await
        .map_err(pg_error)?;
        insert_event(&mut tx, &draft.category, &draft.id, 1, &draft.event, draft.synthetic).await?;
        tx.commit().await.map_err(pg_error)
    }

    async fn list(&self, category: &str, offset: u64, limit: usize) -> Result<Vec<AggregateRecord>> {
        let sql = format!(
            "SELECT {} FROM esbench_aggregates WHERE category = $1 ORDER BY id LIMIT $2 OFFSET $3",
            AGGREGATE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(category)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(pg_error)?;
        rows.iter().map(decode_aggregate).collect()
    }

    async fn get(&self, category: &str, id: &str) -> Result<Option<AggregateRecord>> {
        let sql = format!(
            "SELECT {} FROM esbench_aggregates WHERE category = $1 AND id = $2",
            AGGREGATE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(category)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_error)?;
        row.as_ref().map(decode_aggregate).transpose()
    }

    async fn select(
        &self,
        category: &str,
        filter: &FieldFilter,
        limit: usize,
    ) -> Result<Vec<AggregateRecord>> {
        let sql = format!(
            "SELECT {} FROM esbench_aggregates \
             WHERE category = $1 AND state -> $2 = $3::jsonb ORDER BY id LIMIT $4",
            AGGREGATE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(category)
            .bind(&filter.field)
            .bind(filter.value.to_string())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(pg_error)?;
        rows.iter().map(decode_aggregate).collect()
    }

    async fn events(&self, category: &str, id: &str, limit: usize) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query(
            "SELECT version, event_type, payload::text AS payload, synthetic FROM esbench_events \
             WHERE category = $1 AND aggregate_id = $2 ORDER BY version DESC LIMIT $3",
        )
        .bind(category)
        .bind(id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_error)?;

        rows.iter()
            .map(|row| {
                let payload: String = row.try_get("payload").map_err(pg_error)?;
                Ok(EventRecord {
                    category: category.to_string(),
                    aggregate_id: id.to_string(),
                    version: row.try_get("version").map_err(pg_error)?,
                    event_type: row.try_get("event_type").map_err(pg_error)?,
                    payload: serde_json::from_str(&payload)?,
                    synthetic: row.try_get("synthetic").map_err(pg_error)?,
                })
            })
            .collect()
    }

    async fn apply(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.transition(category, id, event, "", None).await
    }

    async fn archive(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.transition(category, id, event, ", archived = TRUE", None)
            .await
    }

    async fn restore(&self, category: &str, id: &str, event: &EventDraft) -> Result<()> {
        self.transition(category, id, event, ", archived = FALSE", None)
            .await
    }

    async fn patch(
        &self,
        category: &str,
        id: &str,
        patch: &Map<String, Value>,
        event: &EventDraft,
    ) -> Result<()> {
        // JSONB concatenation replaces top-level keys.
        let patch = serde_json::to_string(patch)?;
        self.transition(category, id, event, ", state = state || $3::jsonb", Some(patch))
            .await
    }

    async fn purge_synthetic(&self) -> Result<u64> {
        let mut tx = self.begin().await?;
        sqlx::query("DELETE FROM esbench_events WHERE synthetic")
            .execute(&mut *tx)
            .await
            .map_err(pg_error)?;
        let removed = sqlx::query("DELETE FROM esbench_aggregates WHERE synthetic")
            .execute(&mut *tx)
            .await
            .map_err(pg_error)?
            .rows_affected();
        tx.commit().await.map_err(pg_error)?;
        tracing::info!(removed, "purged synthetic postgres rows");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_disconnects() {
        assert!(pg_error(sqlx::Error::PoolClosed).is_connection_lost());
        assert!(pg_error(sqlx::Error::PoolTimedOut).is_connection_lost());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(pg_error(sqlx::Error::Io(io)).is_connection_lost());
    }

    #[test]
    fn test_other_errors_are_backend_errors() {
        let err = pg_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::Backend(_)));
        assert!(!err.is_duplicate());
    }

    #[tokio::test]
    async fn test_round_trip_against_live_database() {
        // Runs only when a database is configured.
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let provider = PostgresProvider::connect(&url).await.unwrap();
        let draft = esbench_core::dataset::seed_draft(1).unwrap();
        match provider.create_aggregate(&draft).await {
            Ok(()) => {}
            Err(e) => assert!(e.is_duplicate(), "unexpected error: {}", e),
        }
        let err = provider.create_aggregate(&draft).await.unwrap_err();
        assert!(err.is_duplicate());
        assert!(provider.is_seeded(&draft.category, &draft.id).await.unwrap());
    }
}
