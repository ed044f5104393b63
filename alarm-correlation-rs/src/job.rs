use std::collections::HashMap;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{error, info};

use crate::config::Config;
use crate::correlate::{process_day, DayOutcome};
use crate::errors::StoreError;
use crate::metrics_consts::{DAYS_FAILED, DAYS_PROCESSED};
use crate::store::EventStore;

/// Settings the driver needs from [`Config`], separated so tests and
/// embedders can run the engine without an environment.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub flush_batch_size: usize,
    pub max_concurrent_days: usize,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl Default for RunOptions {
    fn default() -> RunOptions {
        RunOptions {
            flush_batch_size: 500,
            max_concurrent_days: 1,
            date_from: None,
            date_to: None,
        }
    }
}

impl From<&Config> for RunOptions {
    fn from(config: &Config) -> RunOptions {
        RunOptions {
            flush_batch_size: config.flush_batch_size,
            max_concurrent_days: config.max_concurrent_days,
            date_from: config.date_from,
            date_to: config.date_to,
        }
    }
}

/// Run-level accumulators. The per-key tally spans the whole run, exists
/// for operational visibility only and is never persisted; it is merged
/// from day-local tallies as each day completes.
#[derive(Clone, Debug, Default)]
pub struct JobStats {
    pub days_total: usize,
    pub days_failed: usize,
    pub scanned: u64,
    pub inserted: u64,
    pub updated: u64,
    pub key_tally: HashMap<String, u64>,
}

impl JobStats {
    fn absorb_day(&mut self, outcome: DayOutcome) {
        self.scanned += outcome.stats.scanned;
        self.inserted += outcome.stats.created;
        self.updated += outcome.stats.updated;
        for (key, count) in outcome.key_tally {
            *self.key_tally.entry(key).or_insert(0) += count;
        }
    }
}

/// Enumerates the day partitions of the primary stream and correlates each,
/// sequentially or with bounded parallelism over disjoint dates.
///
/// Re-running over an already-processed date range adds on top of the
/// existing counters: there is no reprocessing ledger, every run counts
/// each event again.
///
/// A failure before the first day (connect, partition enumeration) is fatal
/// and propagates; a failure inside one day is logged, contributes zero and
/// never stops the remaining days.
pub async fn run<S>(store: &S, options: &RunOptions) -> Result<JobStats, StoreError>
where
    S: EventStore + ?Sized,
{
    let mut dates = store.distinct_primary_dates().await?;
    dates.retain(|date| {
        options.date_from.map_or(true, |from| *date >= from)
            && options.date_to.map_or(true, |to| *date <= to)
    });
    dates.sort_unstable();
    info!(days = dates.len(), "found day partitions to process");

    let mut stats = JobStats {
        days_total: dates.len(),
        ..JobStats::default()
    };

    let total = dates.len();
    let concurrency = options.max_concurrent_days.max(1);
    let flush_batch_size = options.flush_batch_size;
    let mut outcomes = stream::iter(dates.into_iter().map(|date| async move {
        (date, process_day(store, date, flush_batch_size).await)
    }))
    .buffer_unordered(concurrency);

    let mut finished = 0usize;
    while let Some((date, result)) = outcomes.next().await {
        finished += 1;
        match result {
            Ok(outcome) => {
                metrics::counter!(DAYS_PROCESSED).increment(1);
                stats.absorb_day(outcome);
            }
            Err(err) => {
                metrics::counter!(DAYS_FAILED).increment(1);
                stats.days_failed += 1;
                error!(%date, error = %err, "day abandoned, continuing with next");
            }
        }
        info!(
            "processed {}/{} day partitions ({:.1}%)",
            finished,
            total,
            finished as f64 / total as f64 * 100.0
        );
    }

    Ok(stats)
}
