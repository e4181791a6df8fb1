use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use meter_types::{ConsumptionRecord, PeriodSelector, RecordId};
use tracing::debug;

use crate::change::{ChangeFeed, ChangeStream, StoreChange};
use crate::error::{StoreError, StoreResult};
use crate::index::RecordIndex;
use crate::traits::LedgerStore;

/// In-memory ledger store.
///
/// Intended for tests and embedding. Records are held behind a `RwLock` and
/// cloned on read/write; nothing survives the process.
pub struct InMemoryLedgerStore {
    index: RwLock<RecordIndex>,
    feed: ChangeFeed,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(RecordIndex::default()),
            feed: ChangeFeed::default(),
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.read().map(|index| index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, RecordIndex>> {
        self.index
            .read()
            .map_err(|_| StoreError::Unavailable("ledger read lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, RecordIndex>> {
        self.index
            .write()
            .map_err(|_| StoreError::Unavailable("ledger write lock poisoned".into()))
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(&self, record: &ConsumptionRecord) -> StoreResult<()> {
        {
            let mut index = self.write()?;
            index.check_insert(record)?;
            index.insert(record.clone());
        }
        debug!(id = %record.id, date = %record.date, "record inserted");
        self.feed.publish(&StoreChange::Inserted(record.clone()));
        Ok(())
    }

    async fn update(&self, record: &ConsumptionRecord) -> StoreResult<ConsumptionRecord> {
        let previous = {
            let mut index = self.write()?;
            index.check_update(record)?;
            index
                .replace(record.clone())
                .ok_or(StoreError::NotFound(record.id))?
        };
        debug!(id = %record.id, "record updated");
        self.feed.publish(&StoreChange::Updated {
            previous: previous.clone(),
            current: record.clone(),
        });
        Ok(previous)
    }

    async fn delete(&self, id: &RecordId) -> StoreResult<Option<ConsumptionRecord>> {
        let removed = self.write()?.remove(id);
        if let Some(record) = &removed {
            debug!(id = %id, "record deleted");
            self.feed.publish(&StoreChange::Deleted(record.clone()));
        }
        Ok(removed)
    }

    async fn delete_all(&self) -> StoreResult<usize> {
        let removed = self.write()?.clear();
        debug!(removed, "store cleared");
        self.feed.publish(&StoreChange::Cleared { removed });
        Ok(removed)
    }

    async fn get(&self, id: &RecordId) -> StoreResult<Option<ConsumptionRecord>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn query(&self, selector: &PeriodSelector) -> StoreResult<Vec<ConsumptionRecord>> {
        Ok(self.read()?.select(selector))
    }

    fn subscribe(&self, selector: PeriodSelector) -> ChangeStream {
        self.feed.subscribe(selector)
    }
}

impl std::fmt::Debug for InMemoryLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedgerStore")
            .field("record_count", &self.len())
            .finish()
    }
}
