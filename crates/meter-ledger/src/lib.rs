//! Consumption ledger engine for the Meter Ledger.
//!
//! Turns cumulative meter readings into validated consumption records:
//! - [`ReadingValidator`]: pure accept/reject decision for a candidate reading
//! - [`ConsumptionCalculator`]: fetch, validate, compute and persist under a
//!   per-period lock; read operations and live views
//! - [`PeriodAggregator`]: period totals and monthly/annual rollups
//! - [`LedgerAuditor`]: detects records whose derived fields went stale
//! - [`Clock`]: injectable source of "today" and creation time

pub mod aggregate;
pub mod audit;
pub mod calculator;
pub mod clock;
pub mod error;
pub mod lock;
pub mod validation;

pub use aggregate::{AnnualRollup, LedgerRow, MonthlyRollup, PeriodAggregator, PeriodView};
pub use audit::{AuditReport, LedgerAuditor, StaleKind, StaleRecord};
pub use calculator::{ConsumptionCalculator, LiveView};
pub use clock::{Clock, FixedClock, StampSequencer, SystemClock};
pub use error::{LedgerError, LedgerResult};
pub use lock::{ExclusiveGuard, PeriodGuard, PeriodLocks};
pub use validation::{ReadingValidator, Rejection, Verdict};
