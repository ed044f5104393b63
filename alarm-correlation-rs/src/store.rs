use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::warn;

use crate::config::Config;
use crate::errors::StoreError;
use crate::metrics_consts::CANDIDATES_SKIPPED;
use crate::types::{
    CandidateEvent, PrimaryEvent, SeverityFilter, KEEPALIVE_TRAP_OID, SEVERITY_CLEARED,
    SEVERITY_WARNING,
};
use crate::window::CorrelationWindow;

/// One buffered upsert-with-increment operation: add `count_delta` to the
/// record's total and each nested delta to its signature's counter, creating
/// the record when `key1` is new.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedIncrement {
    pub key1: String,
    pub count_delta: i64,
    pub nested_deltas: HashMap<String, i64>,
}

/// Created/updated split reported by one bulk write.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FlushOutcome {
    pub created: u64,
    pub updated: u64,
}

/// Contract the engine requires from the backing store. Storage internals
/// stay behind this seam; engine tests drive it with an in-memory
/// implementation.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// All primary events recorded on `date`, keep-alive traps excluded,
    /// streamed without materializing the whole day.
    fn stream_primary(&self, date: NaiveDate)
        -> BoxStream<'_, Result<PrimaryEvent, StoreError>>;

    /// Candidate events inside the window's inclusive date and time bounds
    /// whose severity passes `filter` (see [`SeverityFilter::matches`]).
    async fn query_candidates(
        &self,
        window: &CorrelationWindow,
        filter: SeverityFilter,
    ) -> Result<Vec<CandidateEvent>, StoreError>;

    /// Applies every staged increment, each atomically against its record.
    /// Every operation yields exactly one created-or-updated outcome; on
    /// failure none of the batch is applied.
    async fn upsert_increments(
        &self,
        batch: &[StagedIncrement],
    ) -> Result<FlushOutcome, StoreError>;

    /// Distinct non-empty day partitions present in the primary stream.
    async fn distinct_primary_dates(&self) -> Result<Vec<NaiveDate>, StoreError>;
}

const PRIMARY_SCAN: &str = r#"
    SELECT ne_name, managed_object, alarm_name, fault_flag, event_date, event_time
    FROM nbi_fault_events
    WHERE event_date = $1 AND trap_oid IS DISTINCT FROM $2
"#;

const CANDIDATE_ACTIVE_SCAN: &str = r#"
    SELECT node_name, object_full_name, alarm_name, detected_date, detected_time, severity
    FROM ipran_alarms
    WHERE detected_date BETWEEN $1 AND $2
      AND detected_time BETWEEN $3 AND $4
      AND severity NOT IN ($5, $6)
"#;

const CANDIDATE_CLEARS_SCAN: &str = r#"
    SELECT node_name, object_full_name, alarm_name, detected_date, detected_time, severity
    FROM ipran_alarms
    WHERE detected_date BETWEEN $1 AND $2
      AND detected_time BETWEEN $3 AND $4
      AND severity = $5
"#;

const UPSERT_INCREMENT: &str = r#"
    INSERT INTO correlation_matrix AS matrix (key1, count, nested_count)
    VALUES ($1, $2, $3)
    ON CONFLICT (key1) DO UPDATE SET
        count = matrix.count + EXCLUDED.count,
        nested_count = (
            SELECT COALESCE(jsonb_object_agg(keys.k,
                       COALESCE((matrix.nested_count ->> keys.k)::bigint, 0)
                     + COALESCE((EXCLUDED.nested_count ->> keys.k)::bigint, 0)), '{}'::jsonb)
            FROM jsonb_object_keys(matrix.nested_count || EXCLUDED.nested_count) AS keys(k)
        )
    RETURNING (xmax = 0) AS created
"#;

const DISTINCT_DATES: &str = r#"
    SELECT DISTINCT event_date FROM nbi_fault_events WHERE event_date IS NOT NULL
"#;

// ON CONFLICT needs a unique btree constraint on key1; lookups stay
// exact-match either way.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS nbi_fault_events (
        id bigserial PRIMARY KEY,
        ne_name text,
        managed_object text,
        alarm_name text,
        fault_flag text,
        event_date date,
        event_time time,
        trap_oid text
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ipran_alarms (
        id bigserial PRIMARY KEY,
        node_name text,
        object_full_name text,
        alarm_name text,
        detected_date date,
        detected_time time,
        severity text
    )"#,
    r#"CREATE TABLE IF NOT EXISTS correlation_matrix (
        key1 text PRIMARY KEY,
        count bigint NOT NULL DEFAULT 0,
        nested_count jsonb NOT NULL DEFAULT '{}'::jsonb
    )"#,
    r#"CREATE INDEX IF NOT EXISTS nbi_fault_events_date_flag
        ON nbi_fault_events (event_date, fault_flag)"#,
    r#"CREATE INDEX IF NOT EXISTS ipran_alarms_date_time_severity
        ON ipran_alarms (detected_date, detected_time, severity)"#,
];

/// Postgres-backed store. Plumbing only: range queries over the two event
/// feeds plus the batched counter upsert; correlation semantics live in the
/// engine.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &Config) -> Result<PostgresStore, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_pg_connections)
            .connect(&config.database_url)
            .await
            .map_err(StoreError::Connection)?;
        Ok(PostgresStore { pool })
    }

    /// Create-if-absent for the tables and the supporting indexes: primary
    /// scan on (date, flag), candidate lookup on (date, time, severity),
    /// exact-match lookup on the output key.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Query)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    fn stream_primary(
        &self,
        date: NaiveDate,
    ) -> BoxStream<'_, Result<PrimaryEvent, StoreError>> {
        sqlx::query(PRIMARY_SCAN)
            .bind(date)
            .bind(KEEPALIVE_TRAP_OID)
            .fetch(&self.pool)
            .map(|row| match row {
                Ok(row) => decode_primary(&row),
                Err(err) => Err(StoreError::Query(err)),
            })
            .boxed()
    }

    async fn query_candidates(
        &self,
        window: &CorrelationWindow,
        filter: SeverityFilter,
    ) -> Result<Vec<CandidateEvent>, StoreError> {
        let query = match filter {
            SeverityFilter::ActiveAlarms => sqlx::query(CANDIDATE_ACTIVE_SCAN)
                .bind(window.start_date)
                .bind(window.end_date)
                .bind(window.start_time)
                .bind(window.end_time)
                .bind(SEVERITY_WARNING)
                .bind(SEVERITY_CLEARED),
            SeverityFilter::ClearsOnly => sqlx::query(CANDIDATE_CLEARS_SCAN)
                .bind(window.start_date)
                .bind(window.end_date)
                .bind(window.start_time)
                .bind(window.end_time)
                .bind(SEVERITY_CLEARED),
        };
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Query)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_candidate(row) {
                Ok(event) => events.push(event),
                Err(err) => {
                    metrics::counter!(CANDIDATES_SKIPPED).increment(1);
                    warn!(error = %err, "skipping malformed candidate row");
                }
            }
        }
        Ok(events)
    }

    async fn upsert_increments(
        &self,
        batch: &[StagedIncrement],
    ) -> Result<FlushOutcome, StoreError> {
        let mut outcome = FlushOutcome::default();
        if batch.is_empty() {
            return Ok(outcome);
        }

        let batch_error = |source: sqlx::Error| StoreError::BatchWrite {
            staged: batch.len(),
            source,
        };

        let mut tx = self.pool.begin().await.map_err(batch_error)?;
        for op in batch {
            let created: bool = sqlx::query_scalar(UPSERT_INCREMENT)
                .bind(&op.key1)
                .bind(op.count_delta)
                .bind(nested_deltas_json(&op.nested_deltas))
                .fetch_one(&mut *tx)
                .await
                .map_err(batch_error)?;
            if created {
                outcome.created += 1;
            } else {
                outcome.updated += 1;
            }
        }
        tx.commit().await.map_err(batch_error)?;
        Ok(outcome)
    }

    async fn distinct_primary_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar(DISTINCT_DATES)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Query)?;
        Ok(dates)
    }
}

fn nested_deltas_json(deltas: &HashMap<String, i64>) -> serde_json::Value {
    serde_json::Value::Object(
        deltas
            .iter()
            .map(|(signature, delta)| (signature.clone(), serde_json::Value::from(*delta)))
            .collect(),
    )
}

fn required<'r, T>(row: &'r PgRow, column: &'static str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    match row.try_get::<Option<T>, &str>(column) {
        Ok(Some(value)) => Ok(value),
        _ => Err(StoreError::MissingField(column)),
    }
}

fn decode_primary(row: &PgRow) -> Result<PrimaryEvent, StoreError> {
    Ok(PrimaryEvent {
        ne_name: required(row, "ne_name")?,
        managed_object: required(row, "managed_object")?,
        alarm_name: required(row, "alarm_name")?,
        fault_flag: required(row, "fault_flag")?,
        event_date: required(row, "event_date")?,
        event_time: required(row, "event_time")?,
    })
}

fn decode_candidate(row: &PgRow) -> Result<CandidateEvent, StoreError> {
    Ok(CandidateEvent {
        node_name: required(row, "node_name")?,
        object_full_name: required(row, "object_full_name")?,
        alarm_name: required(row, "alarm_name")?,
        detected_date: required(row, "detected_date")?,
        detected_time: required(row, "detected_time")?,
        severity: required(row, "severity")?,
    })
}
