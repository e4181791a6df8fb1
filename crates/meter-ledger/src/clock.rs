use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use meter_types::{CalendarDate, CreationStamp, TypeError};

/// Source of the current calendar date and creation time.
pub trait Clock: Send + Sync {
    /// Today's date in the local calendar.
    fn today(&self) -> Result<CalendarDate, TypeError>;

    /// Milliseconds since UNIX epoch.
    fn now_ms(&self) -> u64;
}

/// The system clock, in the local time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> Result<CalendarDate, TypeError> {
        CalendarDate::from_naive(chrono::Local::now().date_naive())
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A manually driven clock for deterministic tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<CalendarDate>,
    ms: AtomicU64,
}

impl FixedClock {
    pub fn new(date: CalendarDate, start_ms: u64) -> Self {
        Self {
            date: Mutex::new(date),
            ms: AtomicU64::new(start_ms),
        }
    }

    pub fn set_date(&self, date: CalendarDate) {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }

    /// Move the millisecond clock forward.
    pub fn advance(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Move the millisecond clock to an arbitrary value, backwards included.
    pub fn set_ms(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> Result<CalendarDate, TypeError> {
        Ok(*self.date.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}

/// Issues strictly increasing creation stamps.
///
/// Follows the hybrid-logical-clock rule: the physical part is the larger of
/// the wall clock and the last issued stamp; ties bump the logical counter.
/// A caller-supplied floor (the newest stamp already stored in the target
/// period) is respected as well, so a wall clock that went backwards across
/// a restart cannot produce a record older than its predecessors.
#[derive(Debug, Default)]
pub struct StampSequencer {
    last: Mutex<CreationStamp>,
}

impl StampSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_after(&self, wall_ms: u64, floor: Option<CreationStamp>) -> CreationStamp {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let lower = match floor {
            Some(floor) if floor > *last => floor,
            _ => *last,
        };
        let candidate = CreationStamp::new(wall_ms, 0);
        let next = if candidate > lower {
            candidate
        } else {
            lower.successor()
        };
        *last = next;
        next
    }
}
