use std::collections::BTreeMap;

use meter_types::{ConsumptionRecord, PeriodSelector, RecordId};

use crate::error::{StoreError, StoreResult};

/// In-memory record table shared by the store backends.
///
/// Mutations are split into a fallible `check_*` step and an infallible
/// apply step so a backend can persist between the two and leave the table
/// untouched when persistence fails.
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    records: BTreeMap<RecordId, ConsumptionRecord>,
}

impl RecordIndex {
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn get(&self, id: &RecordId) -> Option<&ConsumptionRecord> {
        self.records.get(id)
    }

    pub(crate) fn check_insert(&self, record: &ConsumptionRecord) -> StoreResult<()> {
        if self.records.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        Ok(())
    }

    pub(crate) fn check_update(&self, record: &ConsumptionRecord) -> StoreResult<()> {
        if !self.records.contains_key(&record.id) {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, record: ConsumptionRecord) {
        self.records.insert(record.id, record);
    }

    /// Replace a record, returning the previous version if there was one.
    pub(crate) fn replace(&mut self, record: ConsumptionRecord) -> Option<ConsumptionRecord> {
        self.records.insert(record.id, record)
    }

    pub(crate) fn remove(&mut self, id: &RecordId) -> Option<ConsumptionRecord> {
        self.records.remove(id)
    }

    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// Records within `selector`, newest first.
    pub(crate) fn select(&self, selector: &PeriodSelector) -> Vec<ConsumptionRecord> {
        let mut selected: Vec<ConsumptionRecord> = self
            .records
            .values()
            .filter(|r| selector.contains(&r.date))
            .cloned()
            .collect();
        selected.sort_by(ConsumptionRecord::newest_first);
        selected
    }

    /// Every record, oldest first.
    pub(crate) fn snapshot(&self) -> Vec<ConsumptionRecord> {
        let mut all: Vec<ConsumptionRecord> = self.records.values().cloned().collect();
        all.sort_by(ConsumptionRecord::oldest_first);
        all
    }
}
