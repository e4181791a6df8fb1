use meter_store::StoreError;
use meter_types::{CalendarDate, RecordId, TypeError};

/// Errors surfaced by ledger operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// Rejected before validation: negative, non-numeric or malformed input.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("a reading is already recorded for {date}")]
    DuplicateDate { date: CalendarDate },

    #[error("reading {reading} is below the last reading of the month ({reference})")]
    NonMonotonicReading { reading: f64, reference: f64 },

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// Persistence failure. Not retried; the caller decides.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::RecordNotFound(id),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<TypeError> for LedgerError {
    fn from(err: TypeError) -> Self {
        Self::InvalidInput {
            reason: err.to_string(),
        }
    }
}
