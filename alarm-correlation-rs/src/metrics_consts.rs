pub const EVENTS_SCANNED: &str = "alarm_corr_events_scanned";
pub const EVENTS_ELIGIBLE: &str = "alarm_corr_events_eligible";
pub const EVENTS_SKIPPED: &str = "alarm_corr_events_skipped";
pub const EVENTS_UNMATCHED: &str = "alarm_corr_events_unmatched";
pub const CANDIDATES_SEEN: &str = "alarm_corr_candidates_seen";
pub const CANDIDATES_SKIPPED: &str = "alarm_corr_candidates_skipped";
pub const UPDATES_STAGED: &str = "alarm_corr_updates_staged";
pub const BATCH_FLUSHES: &str = "alarm_corr_batch_flushes";
pub const RECORDS_CREATED: &str = "alarm_corr_records_created";
pub const RECORDS_UPDATED: &str = "alarm_corr_records_updated";
pub const DAYS_PROCESSED: &str = "alarm_corr_days_processed";
pub const DAYS_FAILED: &str = "alarm_corr_days_failed";
