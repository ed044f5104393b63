use thiserror::Error;

/// Failures surfaced by the event store and the engine on top of it.
///
/// `Connection` only occurs at startup and is fatal. `Query` and
/// `BatchWrite` abandon the day being processed; `MissingField` invalidates
/// a single record and is skipped where it occurs.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to event store: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("store query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("batch write failed, {staged} staged increments lost: {source}")]
    BatchWrite {
        staged: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),
}

impl StoreError {
    /// True when the error invalidates only one record, not the whole scan.
    pub fn is_event_scoped(&self) -> bool {
        matches!(self, StoreError::MissingField(_))
    }
}
