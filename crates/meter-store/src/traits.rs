use async_trait::async_trait;
use meter_types::{CalendarDate, ConsumptionRecord, MonthKey, PeriodSelector, RecordId};

use crate::change::ChangeStream;
use crate::error::StoreResult;

/// Keyed, queryable collection of consumption records.
///
/// All implementations must satisfy these invariants:
/// - Query results are ordered by `created_at` descending (newest first),
///   ties broken by record ID descending.
/// - Read-after-write: once `insert` returns `Ok`, every query whose period
///   contains the record observes it.
/// - A failed mutation leaves the store unchanged.
/// - Every successful mutation is published to matching subscribers.
/// - The store never deduplicates by date; that is the validator's job.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new record. Fails with `DuplicateId` if the ID is taken.
    async fn insert(&self, record: &ConsumptionRecord) -> StoreResult<()>;

    /// Replace a stored record wholesale and return the previous version.
    ///
    /// Returns `Err(NotFound)` if no record has this ID.
    async fn update(&self, record: &ConsumptionRecord) -> StoreResult<ConsumptionRecord>;

    /// Delete a record by ID, returning it if it existed.
    async fn delete(&self, id: &RecordId) -> StoreResult<Option<ConsumptionRecord>>;

    /// Remove every record unconditionally. Returns how many were removed.
    async fn delete_all(&self) -> StoreResult<usize>;

    /// Fetch a single record by ID.
    async fn get(&self, id: &RecordId) -> StoreResult<Option<ConsumptionRecord>>;

    /// All records within `selector`, newest first.
    async fn query(&self, selector: &PeriodSelector) -> StoreResult<Vec<ConsumptionRecord>>;

    /// Register for change notifications affecting `selector`.
    ///
    /// Dropping the returned stream unsubscribes.
    fn subscribe(&self, selector: PeriodSelector) -> ChangeStream;

    async fn query_by_exact_date(&self, date: CalendarDate) -> StoreResult<Vec<ConsumptionRecord>> {
        self.query(&PeriodSelector::Day(date)).await
    }

    async fn query_by_month(&self, month: MonthKey) -> StoreResult<Vec<ConsumptionRecord>> {
        self.query(&PeriodSelector::Month(month)).await
    }

    async fn query_by_year(&self, year: u32) -> StoreResult<Vec<ConsumptionRecord>> {
        self.query(&PeriodSelector::Year(year)).await
    }

    async fn query_all(&self) -> StoreResult<Vec<ConsumptionRecord>> {
        self.query(&PeriodSelector::All).await
    }

    /// The most recently created record of a month, if any.
    async fn latest_in_month(&self, month: MonthKey) -> StoreResult<Option<ConsumptionRecord>> {
        Ok(self.query_by_month(month).await?.into_iter().next())
    }
}
