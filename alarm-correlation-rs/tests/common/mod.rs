use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt};

use alarm_correlation_rs::errors::StoreError;
use alarm_correlation_rs::store::{EventStore, FlushOutcome, StagedIncrement};
use alarm_correlation_rs::types::{
    CandidateEvent, CorrelationRecord, PrimaryEvent, SeverityFilter, KEEPALIVE_TRAP_OID,
};
use alarm_correlation_rs::window::CorrelationWindow;

/// In-memory stand-in for the backing store. The engine only sees the
/// [`EventStore`] contract, so every correlation property can be exercised
/// without a database; writes land in a plain map the tests inspect.
#[derive(Default)]
pub struct MemoryStore {
    primaries: Mutex<Vec<(PrimaryEvent, String)>>,
    candidates: Mutex<Vec<CandidateEvent>>,
    records: Mutex<HashMap<String, CorrelationRecord>>,
    flush_sizes: Mutex<Vec<usize>>,
    failed_scan_dates: Mutex<HashSet<NaiveDate>>,
    malformed_dates: Mutex<Vec<NaiveDate>>,
    fail_writes: Mutex<bool>,
}

#[allow(dead_code)] // not every test binary uses every fixture hook
impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn add_primary(&self, event: PrimaryEvent) {
        self.add_primary_with_trap(event, "nbiFaultTrap");
    }

    pub fn add_primary_with_trap(&self, event: PrimaryEvent, trap_oid: &str) {
        self.primaries
            .lock()
            .unwrap()
            .push((event, trap_oid.to_string()));
    }

    pub fn add_candidate(&self, event: CandidateEvent) {
        self.candidates.lock().unwrap().push(event);
    }

    /// Make the primary scan of `date` fail mid-stream.
    pub fn fail_scan_on(&self, date: NaiveDate) {
        self.failed_scan_dates.lock().unwrap().insert(date);
    }

    /// Inject one undecodable primary row into `date`'s scan.
    pub fn add_malformed_primary(&self, date: NaiveDate) {
        self.malformed_dates.lock().unwrap().push(date);
    }

    /// Make every subsequent bulk write fail.
    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    pub fn record(&self, key1: &str) -> Option<CorrelationRecord> {
        self.records.lock().unwrap().get(key1).cloned()
    }

    pub fn records(&self) -> HashMap<String, CorrelationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn flush_sizes(&self) -> Vec<usize> {
        self.flush_sizes.lock().unwrap().clone()
    }
}

fn injected(message: &str) -> sqlx::Error {
    sqlx::Error::Protocol(message.to_string())
}

#[async_trait]
impl EventStore for MemoryStore {
    fn stream_primary(
        &self,
        date: NaiveDate,
    ) -> BoxStream<'_, Result<PrimaryEvent, StoreError>> {
        if self.failed_scan_dates.lock().unwrap().contains(&date) {
            let failure = StoreError::Query(injected("injected scan failure"));
            return stream::iter(vec![Err(failure)]).boxed();
        }

        let mut items: Vec<Result<PrimaryEvent, StoreError>> = self
            .primaries
            .lock()
            .unwrap()
            .iter()
            .filter(|(event, trap_oid)| {
                event.event_date == date && trap_oid != KEEPALIVE_TRAP_OID
            })
            .map(|(event, _)| Ok(event.clone()))
            .collect();

        for malformed in self.malformed_dates.lock().unwrap().iter() {
            if *malformed == date {
                items.push(Err(StoreError::MissingField("ne_name")));
            }
        }

        stream::iter(items).boxed()
    }

    async fn query_candidates(
        &self,
        window: &CorrelationWindow,
        filter: SeverityFilter,
    ) -> Result<Vec<CandidateEvent>, StoreError> {
        // date and time ranges are independent inclusive bounds, like the
        // real candidate query
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|candidate| {
                candidate.detected_date >= window.start_date
                    && candidate.detected_date <= window.end_date
                    && candidate.detected_time >= window.start_time
                    && candidate.detected_time <= window.end_time
                    && filter.matches(&candidate.severity)
            })
            .cloned()
            .collect())
    }

    async fn upsert_increments(
        &self,
        batch: &[StagedIncrement],
    ) -> Result<FlushOutcome, StoreError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StoreError::BatchWrite {
                staged: batch.len(),
                source: injected("injected write failure"),
            });
        }

        self.flush_sizes.lock().unwrap().push(batch.len());

        let mut records = self.records.lock().unwrap();
        let mut outcome = FlushOutcome::default();
        for op in batch {
            match records.entry(op.key1.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(CorrelationRecord {
                        key1: op.key1.clone(),
                        count: op.count_delta,
                        nested_count: op.nested_deltas.clone(),
                    });
                    outcome.created += 1;
                }
                Entry::Occupied(mut slot) => {
                    let record = slot.get_mut();
                    record.count += op.count_delta;
                    for (signature, delta) in &op.nested_deltas {
                        *record.nested_count.entry(signature.clone()).or_insert(0) += delta;
                    }
                    outcome.updated += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn distinct_primary_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let dates: BTreeSet<NaiveDate> = self
            .primaries
            .lock()
            .unwrap()
            .iter()
            .map(|(event, _)| event.event_date)
            .collect();
        Ok(dates.into_iter().collect())
    }
}
