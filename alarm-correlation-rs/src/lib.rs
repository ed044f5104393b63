//! Builds a persistent correlation matrix between the NBI fault/recovery
//! feed and the IP/RAN alarm feed: for every eligible primary event, the
//! candidate stream is searched within a ±30 s window and co-occurrence
//! counts accumulate per (element, object, alarm) signature pair.
//!
//! Counter updates are pure increments, so runs are not idempotent:
//! re-processing a date range counts every event in it again.

pub mod batch;
pub mod config;
pub mod correlate;
pub mod errors;
pub mod job;
pub mod metrics_consts;
pub mod store;
pub mod types;
pub mod window;
