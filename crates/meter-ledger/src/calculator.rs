use std::sync::Arc;

use meter_store::{LedgerStore, LiveQuery};
use meter_types::{CalendarDate, ConsumptionRecord, MonthKey, PeriodSelector, Reading, RecordId};
use tracing::debug;

use crate::aggregate::{PeriodAggregator, PeriodView};
use crate::audit::{AuditReport, LedgerAuditor};
use crate::clock::{Clock, StampSequencer};
use crate::error::{LedgerError, LedgerResult};
use crate::lock::PeriodLocks;
use crate::validation::{ReadingValidator, Verdict};

/// Turns raw readings into consumption records.
///
/// Every mutation of a period runs under that period's lock, so the
/// fetch → validate → compute → persist sequence of one call never
/// interleaves with another mutation of the same (month, year). Calls for
/// different periods run concurrently.
pub struct ConsumptionCalculator<S: ?Sized, C> {
    store: Arc<S>,
    clock: C,
    locks: PeriodLocks,
    stamps: StampSequencer,
}

impl<S: LedgerStore + ?Sized, C: Clock> ConsumptionCalculator<S, C> {
    pub fn new(store: Arc<S>, clock: C) -> Self {
        Self {
            store,
            clock,
            locks: PeriodLocks::new(),
            stamps: StampSequencer::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Record a reading for today's date.
    pub async fn register_reading(&self, raw: f64) -> LedgerResult<ConsumptionRecord> {
        let reading = Reading::new(raw)?;
        let today = self.clock.today()?;
        self.register(today, reading).await
    }

    /// Record a reading for an explicit date, e.g. a missed day.
    ///
    /// The reference is still the month's most recently *created* record,
    /// whatever its date.
    pub async fn register_reading_on(
        &self,
        date: CalendarDate,
        raw: f64,
    ) -> LedgerResult<ConsumptionRecord> {
        let reading = Reading::new(raw)?;
        self.register(date, reading).await
    }

    async fn register(
        &self,
        date: CalendarDate,
        reading: Reading,
    ) -> LedgerResult<ConsumptionRecord> {
        let month = date.month_key();
        let _guard = self.locks.lock_period(month).await;

        let day_records = self.store.query_by_exact_date(date).await?;
        let month_records = self.store.query_by_month(month).await?;

        let reference = match ReadingValidator::validate(reading, &day_records, &month_records) {
            Verdict::Accept { reference } => reference,
            Verdict::Reject(rejection) => {
                debug!(%date, reading = reading.value(), ?rejection, "reading rejected");
                return Err(rejection.into());
            }
        };

        let daily_delta = reading.delta_from(reference);
        let monthly_running_total =
            month_records.iter().map(|r| r.daily_delta).sum::<f64>() + daily_delta;
        let floor = month_records.iter().map(|r| r.created_at).max();
        let created_at = self.stamps.next_after(self.clock.now_ms(), floor);

        let record = ConsumptionRecord::new(
            date,
            created_at,
            reading.value(),
            daily_delta,
            monthly_running_total,
        );
        self.store.insert(&record).await?;

        debug!(
            id = %record.id,
            %date,
            daily_delta,
            monthly_running_total,
            "reading registered"
        );
        Ok(record)
    }

    /// Reading of the month's most recently created record.
    pub async fn latest_reading(&self, month: MonthKey) -> LedgerResult<Option<f64>> {
        Ok(self
            .store
            .latest_in_month(month)
            .await?
            .map(|record| record.reading))
    }

    /// Records of a period, oldest first.
    pub async fn records_for_period(
        &self,
        selector: PeriodSelector,
    ) -> LedgerResult<Vec<ConsumptionRecord>> {
        let mut records = self.store.query(&selector).await?;
        records.sort_by(ConsumptionRecord::oldest_first);
        Ok(records)
    }

    /// Aggregated view of a period.
    pub async fn view(&self, selector: PeriodSelector) -> LedgerResult<PeriodView> {
        let records = self.store.query(&selector).await?;
        Ok(PeriodAggregator::aggregate(&records))
    }

    /// A view of `selector` that refreshes whenever the period changes.
    pub fn watch(&self, selector: PeriodSelector) -> LiveView<S> {
        LiveView {
            query: LiveQuery::new(&self.store, selector),
        }
    }

    /// Replace a stored record wholesale. Returns the previous version.
    ///
    /// Derived fields are stored as given and nothing else in the month is
    /// recomputed; use [`audit`](Self::audit) to find records left stale.
    pub async fn update_record(
        &self,
        record: ConsumptionRecord,
    ) -> LedgerResult<ConsumptionRecord> {
        Reading::new(record.reading)?;

        loop {
            let current = self
                .store
                .get(&record.id)
                .await?
                .ok_or(LedgerError::RecordNotFound(record.id))?;
            let from = current.month_key();
            let to = record.month_key();
            let _guard = self.locks.lock_periods([from, to]).await;

            // The record may have been moved while we waited for the locks.
            match self.store.get(&record.id).await? {
                Some(locked) if locked.month_key() == from => {}
                Some(_) => continue,
                None => return Err(LedgerError::RecordNotFound(record.id)),
            }

            let occupied = self
                .store
                .query_by_exact_date(record.date)
                .await?
                .into_iter()
                .any(|other| other.id != record.id);
            if occupied {
                return Err(LedgerError::DuplicateDate { date: record.date });
            }

            let previous = self.store.update(&record).await?;
            debug!(id = %record.id, from = %previous.date, to = %record.date, "record updated");
            return Ok(previous);
        }
    }

    /// Delete a record. Returns the removed record.
    pub async fn delete_record(&self, id: RecordId) -> LedgerResult<ConsumptionRecord> {
        loop {
            let current = self
                .store
                .get(&id)
                .await?
                .ok_or(LedgerError::RecordNotFound(id))?;
            let month = current.month_key();
            let _guard = self.locks.lock_period(month).await;

            match self.store.get(&id).await? {
                Some(locked) if locked.month_key() == month => {}
                Some(_) => continue,
                None => return Err(LedgerError::RecordNotFound(id)),
            }

            let removed = self
                .store
                .delete(&id)
                .await?
                .ok_or(LedgerError::RecordNotFound(id))?;
            debug!(%id, date = %removed.date, "record deleted");
            return Ok(removed);
        }
    }

    /// Remove every record. Returns how many were removed.
    pub async fn clear(&self) -> LedgerResult<usize> {
        let _guard = self.locks.lock_all().await;
        let removed = self.store.delete_all().await?;
        debug!(removed, "ledger cleared");
        Ok(removed)
    }

    /// Audit the months covering `selector` and report findings within it.
    pub async fn audit(&self, selector: PeriodSelector) -> LedgerResult<AuditReport> {
        // A single day is audited in the context of its whole month.
        let scope = match selector {
            PeriodSelector::Day(date) => PeriodSelector::Month(date.month_key()),
            other => other,
        };
        let records = self.store.query(&scope).await?;
        let mut report = LedgerAuditor::audit(&records);
        report.findings.retain(|f| selector.contains(&f.date));
        Ok(report)
    }
}

/// Push-refreshed [`PeriodView`] of one period.
///
/// The first [`next`](Self::next) yields the current view. Each later call
/// waits for a change to the period and yields a view recomputed from the
/// period's full record set. The view ends once every calculator sharing
/// its store is dropped.
pub struct LiveView<S: ?Sized> {
    query: LiveQuery<S>,
}

impl<S: LedgerStore + ?Sized> LiveView<S> {
    pub fn selector(&self) -> PeriodSelector {
        self.query.selector()
    }

    /// `None` once the store is dropped.
    pub async fn next(&mut self) -> Option<LedgerResult<PeriodView>> {
        let records = self.query.next().await?;
        Some(
            records
                .map(|records| PeriodAggregator::aggregate(&records))
                .map_err(LedgerError::from),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use meter_store::{ChangeStream, InMemoryLedgerStore, StoreError, StoreResult};

    use super::*;
    use crate::clock::FixedClock;

    type Calc = ConsumptionCalculator<InMemoryLedgerStore, FixedClock>;

    fn date(day: u32, month: u32) -> CalendarDate {
        CalendarDate::new(day, month, 2024).unwrap()
    }

    fn june() -> MonthKey {
        MonthKey::new(6, 2024).unwrap()
    }

    fn calculator() -> Calc {
        ConsumptionCalculator::new(
            Arc::new(InMemoryLedgerStore::new()),
            FixedClock::new(date(1, 6), 1_000),
        )
    }

    /// Register `raw` as "today" = `day` of June, one second after the last.
    async fn register_on_day(calc: &Calc, day: u32, raw: f64) -> LedgerResult<ConsumptionRecord> {
        calc.clock().set_date(date(day, 6));
        calc.clock().advance(1_000);
        calc.register_reading(raw).await
    }

    async fn count(calc: &Calc) -> usize {
        calc.store().query_all().await.unwrap().len()
    }

    // -----------------------------------------------------------------------
    // Registration scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn first_reading_of_month() {
        let calc = calculator();
        let record = register_on_day(&calc, 1, 100.0).await.unwrap();
        assert_eq!(record.date, date(1, 6));
        assert_eq!(record.daily_delta, 100.0);
        assert_eq!(record.monthly_running_total, 100.0);
    }

    #[tokio::test]
    async fn second_reading_accumulates() {
        let calc = calculator();
        register_on_day(&calc, 1, 100.0).await.unwrap();
        let record = register_on_day(&calc, 2, 150.0).await.unwrap();
        assert_eq!(record.daily_delta, 50.0);
        assert_eq!(record.monthly_running_total, 150.0);
    }

    #[tokio::test]
    async fn same_day_is_rejected_and_store_unchanged() {
        let calc = calculator();
        register_on_day(&calc, 1, 100.0).await.unwrap();
        register_on_day(&calc, 2, 150.0).await.unwrap();

        let err = register_on_day(&calc, 2, 200.0).await.unwrap_err();
        assert_eq!(err, LedgerError::DuplicateDate { date: date(2, 6) });
        assert_eq!(count(&calc).await, 2);
    }

    #[tokio::test]
    async fn lower_reading_is_rejected_and_store_unchanged() {
        let calc = calculator();
        register_on_day(&calc, 1, 100.0).await.unwrap();
        register_on_day(&calc, 2, 150.0).await.unwrap();

        let err = register_on_day(&calc, 3, 120.0).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::NonMonotonicReading {
                reading: 120.0,
                reference: 150.0
            }
        );
        assert_eq!(count(&calc).await, 2);
    }

    #[tokio::test]
    async fn equal_reading_is_a_zero_consumption_day() {
        let calc = calculator();
        register_on_day(&calc, 1, 100.0).await.unwrap();
        register_on_day(&calc, 2, 150.0).await.unwrap();

        let record = register_on_day(&calc, 3, 150.0).await.unwrap();
        assert_eq!(record.daily_delta, 0.0);
        assert_eq!(record.monthly_running_total, 150.0);
    }

    #[tokio::test]
    async fn year_view_total_is_scoped_to_the_filter() {
        let calc = calculator();
        let readings = [
            (date(1, 1), 100.0),
            (date(15, 1), 140.0),
            (date(1, 2), 200.0),
            (date(20, 2), 260.0),
            (date(1, 3), 300.0),
            (date(9, 3), 325.0),
        ];
        for (day, raw) in readings {
            calc.clock().advance(1_000);
            calc.register_reading_on(day, raw).await.unwrap();
        }
        // A record in another year must not leak into the 2024 view.
        calc.register_reading_on(CalendarDate::new(1, 1, 2025).unwrap(), 999.0)
            .await
            .unwrap();

        let view = calc.view(PeriodSelector::Year(2024)).await.unwrap();
        assert_eq!(view.rows.len(), 6);
        // Last chronological record of the filter (March): 325.
        assert_eq!(view.total, 325.0);
    }

    #[tokio::test]
    async fn negative_and_nan_readings_are_invalid_input() {
        let calc = calculator();
        for raw in [-1.0, f64::NAN, f64::INFINITY] {
            let err = calc.register_reading(raw).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput { .. }), "{raw}: {err:?}");
        }
        assert_eq!(count(&calc).await, 0);
    }

    #[tokio::test]
    async fn new_month_starts_from_zero() {
        let calc = calculator();
        register_on_day(&calc, 30, 500.0).await.unwrap();
        calc.clock().set_date(date(1, 7));
        let record = calc.register_reading(520.0).await.unwrap();
        assert_eq!(record.daily_delta, 520.0);
        assert_eq!(record.monthly_running_total, 520.0);
    }

    #[tokio::test]
    async fn backfilled_day_uses_latest_created_as_reference() {
        let calc = calculator();
        register_on_day(&calc, 10, 100.0).await.unwrap();
        // Day 5 entered after day 10: measured against 100.
        let backfilled = calc.register_reading_on(date(5, 6), 110.0).await.unwrap();
        assert_eq!(backfilled.daily_delta, 10.0);
        assert_eq!(calc.latest_reading(june()).await.unwrap(), Some(110.0));
    }

    #[tokio::test]
    async fn creation_stamps_stay_ordered_when_clock_stalls_or_regresses() {
        let calc = calculator();
        let a = calc.register_reading_on(date(1, 6), 1.0).await.unwrap();
        let b = calc.register_reading_on(date(2, 6), 2.0).await.unwrap();
        calc.clock().set_ms(10);
        let c = calc.register_reading_on(date(3, 6), 3.0).await.unwrap();
        assert!(a.created_at < b.created_at && b.created_at < c.created_at);
    }

    #[tokio::test]
    async fn restart_with_stale_clock_respects_stored_stamps() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let first = ConsumptionCalculator::new(store.clone(), FixedClock::new(date(1, 6), 50_000));
        let old = first.register_reading_on(date(1, 6), 10.0).await.unwrap();

        // Fresh calculator whose wall clock is behind the stored record.
        let second = ConsumptionCalculator::new(store, FixedClock::new(date(2, 6), 1_000));
        let new = second.register_reading(12.0).await.unwrap();
        assert!(new.created_at > old.created_at);
        assert_eq!(new.daily_delta, 2.0);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn latest_reading_of_empty_month_is_absent() {
        let calc = calculator();
        assert_eq!(calc.latest_reading(june()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_for_period_is_oldest_first_and_idempotent() {
        let calc = calculator();
        for (day, raw) in [(1, 10.0), (2, 20.0), (3, 35.0)] {
            register_on_day(&calc, day, raw).await.unwrap();
        }
        let month = PeriodSelector::Month(june());
        let first = calc.records_for_period(month).await.unwrap();
        let second = calc.records_for_period(month).await.unwrap();
        assert_eq!(first, second);
        let days: Vec<u32> = first.iter().map(|r| r.date.day()).collect();
        assert_eq!(days, vec![1, 2, 3]);
    }

    // -----------------------------------------------------------------------
    // Edit, delete, clear, audit
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn update_does_not_recompute_later_records() {
        let calc = calculator();
        let first = register_on_day(&calc, 1, 100.0).await.unwrap();
        let second = register_on_day(&calc, 2, 150.0).await.unwrap();

        let mut edited = first.clone();
        edited.reading = 120.0;
        let previous = calc.update_record(edited.clone()).await.unwrap();
        assert_eq!(previous, first);

        let stored = calc.store().get(&second.id).await.unwrap().unwrap();
        assert_eq!(stored, second, "later record keeps its stale delta");

        let report = calc.audit(PeriodSelector::Month(june())).await.unwrap();
        assert!(!report.is_consistent());
        assert!(report.findings.iter().any(|f| f.id == second.id));
    }

    #[tokio::test]
    async fn update_onto_occupied_day_is_rejected() {
        let calc = calculator();
        let first = register_on_day(&calc, 1, 100.0).await.unwrap();
        register_on_day(&calc, 2, 150.0).await.unwrap();

        let mut moved = first.clone();
        moved.date = date(2, 6);
        let err = calc.update_record(moved).await.unwrap_err();
        assert_eq!(err, LedgerError::DuplicateDate { date: date(2, 6) });
        assert_eq!(calc.store().get(&first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn update_can_move_record_to_another_month() {
        let calc = calculator();
        let first = register_on_day(&calc, 1, 100.0).await.unwrap();
        let mut moved = first.clone();
        moved.date = date(1, 7);
        calc.update_record(moved).await.unwrap();

        assert_eq!(calc.latest_reading(june()).await.unwrap(), None);
        assert_eq!(
            calc.latest_reading(MonthKey::new(7, 2024).unwrap()).await.unwrap(),
            Some(100.0)
        );
    }

    #[tokio::test]
    async fn update_validates_reading_and_existence() {
        let calc = calculator();
        let record = register_on_day(&calc, 1, 100.0).await.unwrap();

        let mut negative = record.clone();
        negative.reading = -5.0;
        assert!(matches!(
            calc.update_record(negative).await,
            Err(LedgerError::InvalidInput { .. })
        ));

        let mut unknown = record;
        unknown.id = RecordId::new();
        assert_eq!(
            calc.update_record(unknown.clone()).await.unwrap_err(),
            LedgerError::RecordNotFound(unknown.id)
        );
    }

    #[tokio::test]
    async fn delete_then_register_on_freed_day() {
        let calc = calculator();
        let first = register_on_day(&calc, 1, 100.0).await.unwrap();
        let removed = calc.delete_record(first.id).await.unwrap();
        assert_eq!(removed, first);
        assert_eq!(
            calc.delete_record(first.id).await.unwrap_err(),
            LedgerError::RecordNotFound(first.id)
        );

        let again = register_on_day(&calc, 1, 90.0).await.unwrap();
        assert_eq!(again.daily_delta, 90.0);
    }

    #[tokio::test]
    async fn registering_after_delete_uses_remaining_records() {
        let calc = calculator();
        register_on_day(&calc, 1, 100.0).await.unwrap();
        let second = register_on_day(&calc, 2, 150.0).await.unwrap();
        calc.delete_record(second.id).await.unwrap();

        // Reference falls back to 100; the total is re-summed from the
        // remaining deltas.
        let third = register_on_day(&calc, 3, 170.0).await.unwrap();
        assert_eq!(third.daily_delta, 70.0);
        assert_eq!(third.monthly_running_total, 170.0);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let calc = calculator();
        register_on_day(&calc, 1, 100.0).await.unwrap();
        register_on_day(&calc, 2, 150.0).await.unwrap();
        assert_eq!(calc.clear().await.unwrap(), 2);
        assert_eq!(count(&calc).await, 0);
        assert_eq!(calc.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn audit_of_a_day_reports_only_that_day() {
        let calc = calculator();
        let first = register_on_day(&calc, 1, 100.0).await.unwrap();
        register_on_day(&calc, 2, 150.0).await.unwrap();
        register_on_day(&calc, 3, 170.0).await.unwrap();

        let mut edited = first;
        edited.reading = 110.0;
        calc.update_record(edited).await.unwrap();

        let month = calc.audit(PeriodSelector::Month(june())).await.unwrap();
        assert_eq!(month.findings.len(), 2);
        let day_two = calc.audit(PeriodSelector::Day(date(2, 6))).await.unwrap();
        assert_eq!(day_two.findings.len(), 1);
        assert_eq!(day_two.findings[0].date, date(2, 6));
    }

    // -----------------------------------------------------------------------
    // Store failures
    // -----------------------------------------------------------------------

    /// Delegates to an in-memory store; inserts fail while `broken` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryLedgerStore,
        broken: AtomicBool,
    }

    #[async_trait]
    impl LedgerStore for FlakyStore {
        async fn insert(&self, record: &ConsumptionRecord) -> StoreResult<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.insert(record).await
        }
        async fn update(&self, record: &ConsumptionRecord) -> StoreResult<ConsumptionRecord> {
            self.inner.update(record).await
        }
        async fn delete(&self, id: &RecordId) -> StoreResult<Option<ConsumptionRecord>> {
            self.inner.delete(id).await
        }
        async fn delete_all(&self) -> StoreResult<usize> {
            self.inner.delete_all().await
        }
        async fn get(&self, id: &RecordId) -> StoreResult<Option<ConsumptionRecord>> {
            self.inner.get(id).await
        }
        async fn query(&self, selector: &PeriodSelector) -> StoreResult<Vec<ConsumptionRecord>> {
            self.inner.query(selector).await
        }
        fn subscribe(&self, selector: PeriodSelector) -> ChangeStream {
            self.inner.subscribe(selector)
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_unavailable_and_writes_nothing() {
        let store = Arc::new(FlakyStore::default());
        let calc = ConsumptionCalculator::new(store.clone(), FixedClock::new(date(1, 6), 1_000));
        store.broken.store(true, Ordering::SeqCst);

        let err = calc.register_reading(100.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::StoreUnavailable(msg) if msg.contains("disk full")));
        assert!(store.inner.is_empty());

        // Not retried automatically; a later call succeeds on its own.
        store.broken.store(false, Ordering::SeqCst);
        assert!(calc.register_reading(100.0).await.is_ok());
    }

    #[tokio::test]
    async fn works_behind_a_trait_object() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let calc = ConsumptionCalculator::new(store, FixedClock::new(date(1, 6), 1_000));
        calc.register_reading(5.0).await.unwrap();
        assert_eq!(calc.latest_reading(june()).await.unwrap(), Some(5.0));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_day_registrations_accept_exactly_one() {
        let calc = Arc::new(calculator());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let calc = calc.clone();
            tasks.push(tokio::spawn(async move {
                calc.register_reading_on(date(7, 6), 100.0 + i as f64).await
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert!(matches!(err, LedgerError::DuplicateDate { .. })),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(count(&calc).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_days_in_one_month_keep_totals_consistent() {
        let calc = Arc::new(calculator());
        let mut tasks = Vec::new();
        for day in 1..=20 {
            let calc = calc.clone();
            tasks.push(tokio::spawn(async move {
                // Same reading everywhere: order does not matter, all accepted.
                calc.register_reading_on(date(day, 6), 50.0).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let report = calc.audit(PeriodSelector::Month(june())).await.unwrap();
        assert!(report.is_consistent(), "{:?}", report.findings);
        assert_eq!(calc.view(PeriodSelector::Month(june())).await.unwrap().total, 50.0);
    }

    // -----------------------------------------------------------------------
    // Live view
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn watch_recomputes_total_on_change() {
        let calc = calculator();
        let mut live = calc.watch(PeriodSelector::Month(june()));
        assert!(live.next().await.unwrap().unwrap().is_empty());

        register_on_day(&calc, 1, 100.0).await.unwrap();
        let view = tokio::time::timeout(Duration::from_secs(1), live.next())
            .await
            .expect("view should refresh")
            .unwrap()
            .unwrap();
        assert_eq!(view.total, 100.0);

        register_on_day(&calc, 2, 130.0).await.unwrap();
        let view = live.next().await.unwrap().unwrap();
        assert_eq!(view.total, 130.0);
        assert_eq!(view.rows.len(), 2);
    }

    #[tokio::test]
    async fn watch_ends_when_calculator_is_dropped() {
        let calc = calculator();
        let mut live = calc.watch(PeriodSelector::Month(june()));
        assert!(live.next().await.unwrap().unwrap().is_empty());

        drop(calc);
        let ended = tokio::time::timeout(Duration::from_secs(1), live.next())
            .await
            .expect("view should end with its store");
        assert!(ended.is_none());
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    mod props {
        use proptest::prelude::*;

        use super::*;

        fn run<F: std::future::Future>(fut: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(fut)
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn registering_keeps_ledger_invariants(
                attempts in prop::collection::vec((1u32..=28, 0u32..2_000), 1..40)
            ) {
                let records = run(async {
                    let calc = calculator();
                    let mut reference: Option<f64> = None;
                    for (day, raw) in attempts {
                        calc.clock().advance(1);
                        let raw = f64::from(raw);
                        if let Ok(record) = calc.register_reading_on(date(day, 6), raw).await {
                            // Post-accept reference never decreases.
                            if let Some(previous) = reference {
                                assert!(record.reading >= previous);
                            }
                            reference = Some(record.reading);
                        }
                    }
                    calc.records_for_period(PeriodSelector::Month(june())).await.unwrap()
                });

                // Monotonicity.
                prop_assert!(records.iter().all(|r| r.daily_delta >= 0.0));

                // Uniqueness per day.
                let mut days: Vec<u32> = records.iter().map(|r| r.date.day()).collect();
                let total_days = days.len();
                days.sort_unstable();
                days.dedup();
                prop_assert_eq!(days.len(), total_days);

                // Running-total correctness on the chronologically last record.
                if let Some(last) = records.last() {
                    let sum: f64 = records.iter().map(|r| r.daily_delta).sum();
                    prop_assert!((last.monthly_running_total - sum).abs() < 1e-6);
                }

                prop_assert!(LedgerAuditor::audit(&records).is_consistent());
            }
        }
    }
}
