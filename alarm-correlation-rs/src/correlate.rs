use std::collections::HashMap;
use std::time::Instant;

use chrono::NaiveDate;
use futures::StreamExt;
use tracing::{info, warn};

use crate::batch::BatchWriter;
use crate::errors::StoreError;
use crate::metrics_consts::{
    CANDIDATES_SEEN, EVENTS_ELIGIBLE, EVENTS_SCANNED, EVENTS_SKIPPED, EVENTS_UNMATCHED,
    UPDATES_STAGED,
};
use crate::store::EventStore;
use crate::types::{CandidateEvent, SeverityFilter};
use crate::window::CorrelationWindow;

const PROGRESS_EVERY: u64 = 10_000;

/// Occurrence count per candidate signature over one event's window matches.
/// Repeated identical signatures accumulate.
pub fn aggregate_signatures(candidates: &[CandidateEvent]) -> HashMap<String, i64> {
    let mut counts = HashMap::new();
    for candidate in candidates {
        *counts.entry(candidate.signature()).or_insert(0) += 1;
    }
    counts
}

/// Counters for one day partition.
#[derive(Clone, Debug, Default)]
pub struct DayStats {
    pub scanned: u64,
    pub eligible: u64,
    pub malformed: u64,
    pub unmatched: u64,
    pub staged: u64,
    pub flushes: u32,
    pub created: u64,
    pub updated: u64,
}

/// Result of one day: write statistics plus the day-local tally of primary
/// key occurrences (diagnostic only, merged by the driver).
#[derive(Clone, Debug, Default)]
pub struct DayOutcome {
    pub stats: DayStats,
    pub key_tally: HashMap<String, u64>,
}

/// Correlates every primary event recorded on `date` and persists the
/// non-empty aggregation results in batches of `flush_batch_size`.
///
/// Store failures abandon the whole day and propagate; a malformed primary
/// record skips only itself. The trailing partial batch is flushed before
/// returning on the happy path.
pub async fn process_day<S>(
    store: &S,
    date: NaiveDate,
    flush_batch_size: usize,
) -> Result<DayOutcome, StoreError>
where
    S: EventStore + ?Sized,
{
    let started = Instant::now();
    info!(%date, "processing day");

    let mut outcome = DayOutcome::default();
    let mut writer = BatchWriter::new(flush_batch_size);

    let mut events = store.stream_primary(date);
    while let Some(next) = events.next().await {
        let event = match next {
            Ok(event) => event,
            Err(err) if err.is_event_scoped() => {
                outcome.stats.malformed += 1;
                metrics::counter!(EVENTS_SKIPPED, &[("reason", "bad_shape")]).increment(1);
                warn!(%date, error = %err, "skipping malformed primary event");
                continue;
            }
            Err(err) => return Err(err),
        };

        outcome.stats.scanned += 1;
        metrics::counter!(EVENTS_SCANNED).increment(1);
        if outcome.stats.scanned % PROGRESS_EVERY == 0 {
            info!(%date, scanned = outcome.stats.scanned, "day scan progress");
        }

        let Some(flag) = event.fault_class() else {
            continue;
        };
        outcome.stats.eligible += 1;
        metrics::counter!(EVENTS_ELIGIBLE).increment(1);

        let key = event.correlation_key();
        *outcome.key_tally.entry(key.clone()).or_insert(0) += 1;

        let window = CorrelationWindow::around(event.event_date, event.event_time);
        let candidates = store
            .query_candidates(&window, SeverityFilter::from(flag))
            .await?;
        metrics::counter!(CANDIDATES_SEEN).increment(candidates.len() as u64);

        let signature_counts = aggregate_signatures(&candidates);
        if signature_counts.is_empty() {
            outcome.stats.unmatched += 1;
            metrics::counter!(EVENTS_UNMATCHED).increment(1);
            continue;
        }

        writer.stage(key, signature_counts);
        outcome.stats.staged += 1;
        metrics::counter!(UPDATES_STAGED).increment(1);
        if writer.should_flush() {
            writer.flush(store).await?;
        }
    }

    writer.flush(store).await?;
    outcome.stats.flushes = writer.flushes();
    outcome.stats.created = writer.totals().created;
    outcome.stats.updated = writer.totals().updated;

    info!(
        %date,
        scanned = outcome.stats.scanned,
        eligible = outcome.stats.eligible,
        staged = outcome.stats.staged,
        inserted = outcome.stats.created,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "day completed"
    );
    Ok(outcome)
}
