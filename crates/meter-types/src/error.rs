use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("invalid calendar date: {day:02}/{month:02}/{year:04}")]
    InvalidDate { day: u32, month: u32, year: u32 },

    #[error("invalid month: {0} (expected 1-12)")]
    InvalidMonth(u32),

    #[error("invalid reading: {0}")]
    InvalidReading(String),

    #[error("invalid record id: {0}")]
    InvalidId(String),

    #[error("cannot parse date '{0}' (expected dd/mm/yyyy or yyyy-mm-dd)")]
    UnparsableDate(String),
}
