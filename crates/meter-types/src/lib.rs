//! Foundation types for the Meter Ledger.
//!
//! This crate provides the value types shared by every other Meter Ledger
//! crate. It has no I/O and no async code.
//!
//! # Key Types
//!
//! - [`RecordId`]: UUID v7 identifier of a consumption record
//! - [`CalendarDate`]: validated (day, month, year) triple in the local calendar
//! - [`MonthKey`]: (month, year) grouping key for running totals
//! - [`PeriodSelector`]: day / month / year / all-time query scope
//! - [`Reading`]: validated cumulative meter value
//! - [`CreationStamp`]: monotonic creation timestamp used for ordering
//! - [`ConsumptionRecord`]: the ledger entity

pub mod calendar;
pub mod error;
pub mod reading;
pub mod record;
pub mod temporal;

pub use calendar::{CalendarDate, MonthKey, PeriodSelector};
pub use error::TypeError;
pub use reading::Reading;
pub use record::{ConsumptionRecord, RecordId};
pub use temporal::CreationStamp;
