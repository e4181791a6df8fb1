use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarDate, MonthKey};
use crate::error::TypeError;
use crate::temporal::CreationStamp;

/// Unique identifier of a consumption record (UUID v7 for time-ordering).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(uuid::Uuid);

impl RecordId {
    /// Generate a new time-ordered record ID (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.short_id())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| TypeError::InvalidId(format!("{s}: {e}")))
    }
}

/// One accepted meter reading together with its derived consumption.
///
/// `daily_delta` is the consumption attributed to `date` (the reading minus
/// the previous reading of the same month, or the reading itself for the
/// first record of a month). `monthly_running_total` is the sum of the
/// month's deltas up to and including this record, in creation order.
///
/// Derived fields are computed once at creation and never recomputed when
/// an earlier record of the month is edited or deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub id: RecordId,
    pub date: CalendarDate,
    pub created_at: CreationStamp,
    pub reading: f64,
    pub daily_delta: f64,
    pub monthly_running_total: f64,
}

impl ConsumptionRecord {
    /// Build a record with a freshly generated ID.
    pub fn new(
        date: CalendarDate,
        created_at: CreationStamp,
        reading: f64,
        daily_delta: f64,
        monthly_running_total: f64,
    ) -> Self {
        Self {
            id: RecordId::new(),
            date,
            created_at,
            reading,
            daily_delta,
            monthly_running_total,
        }
    }

    pub fn month_key(&self) -> MonthKey {
        self.date.month_key()
    }

    /// Newest-first ordering: `created_at` descending, then ID descending.
    pub fn newest_first(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
    }

    /// Oldest-first ordering: `created_at` ascending, then ID ascending.
    pub fn oldest_first(a: &Self, b: &Self) -> std::cmp::Ordering {
        Self::newest_first(b, a)
    }
}
