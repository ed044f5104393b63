use std::collections::HashMap;

use tracing::info;

use crate::errors::StoreError;
use crate::metrics_consts::{BATCH_FLUSHES, RECORDS_CREATED, RECORDS_UPDATED};
use crate::store::{EventStore, FlushOutcome, StagedIncrement};

/// Buffers per-event increment operations and writes them in fixed-size bulk
/// batches. Owned by exactly one day's processing, never shared.
pub struct BatchWriter {
    threshold: usize,
    buffer: Vec<StagedIncrement>,
    flushes: u32,
    totals: FlushOutcome,
}

impl BatchWriter {
    pub fn new(threshold: usize) -> BatchWriter {
        let threshold = threshold.max(1);
        BatchWriter {
            threshold,
            buffer: Vec::with_capacity(threshold),
            flushes: 0,
            totals: FlushOutcome::default(),
        }
    }

    /// Stage one upsert: +1 to the key's total plus each signature's
    /// occurrence count within the event's window.
    pub fn stage(&mut self, key1: String, signature_counts: HashMap<String, i64>) {
        self.buffer.push(StagedIncrement {
            key1,
            count_delta: 1,
            nested_deltas: signature_counts,
        });
    }

    pub fn should_flush(&self) -> bool {
        self.buffer.len() >= self.threshold
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Bulk-writes the buffered increments and clears the buffer. A no-op on
    /// an empty buffer. On failure the batch's increments are gone and the
    /// caller abandons the day.
    pub async fn flush<S>(&mut self, store: &S) -> Result<FlushOutcome, StoreError>
    where
        S: EventStore + ?Sized,
    {
        if self.buffer.is_empty() {
            return Ok(FlushOutcome::default());
        }

        let batch = std::mem::take(&mut self.buffer);
        let outcome = store.upsert_increments(&batch).await?;

        self.flushes += 1;
        self.totals.created += outcome.created;
        self.totals.updated += outcome.updated;
        metrics::counter!(BATCH_FLUSHES).increment(1);
        metrics::counter!(RECORDS_CREATED).increment(outcome.created);
        metrics::counter!(RECORDS_UPDATED).increment(outcome.updated);
        info!(
            upserted = outcome.created,
            modified = outcome.updated,
            "bulk write completed"
        );
        Ok(outcome)
    }

    pub fn flushes(&self) -> u32 {
        self.flushes
    }

    /// Cumulative created/updated counts across every flush so far.
    pub fn totals(&self) -> FlushOutcome {
        self.totals
    }
}
