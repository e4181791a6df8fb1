use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use meter_types::MonthKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Keyed mutual exclusion per (month, year) period.
///
/// Period-scoped work holds the gate shared plus one mutex per period it
/// touches, so different periods proceed concurrently. Ledger-wide work
/// (bulk clear) holds the gate exclusively and waits for every period
/// holder to finish. Entries for idle periods are pruned as new periods
/// are locked.
#[derive(Debug, Default)]
pub struct PeriodLocks {
    gate: RwLock<()>,
    periods: Mutex<HashMap<MonthKey, Arc<AsyncMutex<()>>>>,
}

/// Held while a period-scoped operation runs.
#[must_use = "the periods are unlocked when the guard is dropped"]
pub struct PeriodGuard<'a> {
    periods: Vec<MonthKey>,
    _held: Vec<OwnedMutexGuard<()>>,
    _gate: RwLockReadGuard<'a, ()>,
}

impl PeriodGuard<'_> {
    /// The periods held, in ascending order.
    pub fn periods(&self) -> &[MonthKey] {
        &self.periods
    }
}

/// Held while a ledger-wide operation runs.
#[must_use = "the ledger is unlocked when the guard is dropped"]
pub struct ExclusiveGuard<'a> {
    _gate: RwLockWriteGuard<'a, ()>,
}

impl PeriodLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_period(&self, period: MonthKey) -> PeriodGuard<'_> {
        self.lock_periods([period]).await
    }

    /// Lock several periods at once. Keys are taken in ascending order, so
    /// two callers locking overlapping sets cannot deadlock.
    pub async fn lock_periods(
        &self,
        periods: impl IntoIterator<Item = MonthKey>,
    ) -> PeriodGuard<'_> {
        let mut periods: Vec<MonthKey> = periods.into_iter().collect();
        periods.sort();
        periods.dedup();

        let gate = self.gate.read().await;
        let mutexes = self.entries(&periods);
        let mut held = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            held.push(mutex.lock_owned().await);
        }
        trace!(?periods, "periods locked");

        PeriodGuard {
            periods,
            _held: held,
            _gate: gate,
        }
    }

    /// Exclude every period-scoped operation.
    pub async fn lock_all(&self) -> ExclusiveGuard<'_> {
        let gate = self.gate.write().await;
        trace!("ledger locked exclusively");
        ExclusiveGuard { _gate: gate }
    }

    /// Number of periods with a live lock entry.
    pub fn tracked_periods(&self) -> usize {
        self.periods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn entries(&self, periods: &[MonthKey]) -> Vec<Arc<AsyncMutex<()>>> {
        let mut table = self.periods.lock().unwrap_or_else(PoisonError::into_inner);
        // An entry nobody else references is neither held nor awaited.
        table.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        periods
            .iter()
            .map(|period| table.entry(*period).or_default().clone())
            .collect()
    }
}
