use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use meter_types::{ConsumptionRecord, PeriodSelector, RecordId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::change::{ChangeFeed, ChangeStream, StoreChange};
use crate::error::{StoreError, StoreResult};
use crate::index::RecordIndex;
use crate::traits::LedgerStore;
use crate::wal::{WalConfig, WriteAheadLog};

/// A single logged store mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Mutation {
    Insert(ConsumptionRecord),
    Update(ConsumptionRecord),
    Delete(RecordId),
}

/// Durable ledger store backed by a write-ahead log.
///
/// Every mutation is appended to the log before it is applied to the
/// in-memory index, under the index write lock. If the append fails the
/// index is left untouched, so callers never observe a record that is not
/// on disk. Opening the store replays the log.
pub struct WalLedgerStore {
    wal: WriteAheadLog,
    index: RwLock<RecordIndex>,
    feed: ChangeFeed,
}

impl WalLedgerStore {
    /// Open the store at `path`, replaying any existing log.
    pub fn open(path: &Path, config: WalConfig) -> StoreResult<Self> {
        let wal = WriteAheadLog::open(path, config)?;
        let mutations: Vec<Mutation> = wal.recover_and_repair()?;

        let mut index = RecordIndex::default();
        let replayed = mutations.len();
        for mutation in mutations {
            match mutation {
                Mutation::Insert(record) => index.insert(record),
                Mutation::Update(record) => {
                    index.replace(record);
                }
                Mutation::Delete(id) => {
                    index.remove(&id);
                }
            }
        }

        info!(path = %path.display(), replayed, records = index.len(), "ledger store opened");

        Ok(Self {
            wal,
            index: RwLock::new(index),
            feed: ChangeFeed::default(),
        })
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.read().map(|index| index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the underlying log in bytes.
    pub fn log_size(&self) -> u64 {
        self.wal.offset()
    }

    /// Rewrite the log as one insert per live record, dropping the history
    /// of updates and deletes.
    pub fn compact(&self) -> StoreResult<usize> {
        let index = self.write()?;
        let live: Vec<Mutation> = index.snapshot().into_iter().map(Mutation::Insert).collect();
        let before = self.wal.offset();
        self.wal.rewrite(&live)?;
        info!(records = live.len(), before, after = self.wal.offset(), "ledger log compacted");
        Ok(live.len())
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

#[async_trait]
impl LedgerStore for WalLedgerStore {
    async fn insert(&self, record: &ConsumptionRecord) -> StoreResult<()> {
        {
            let mut index = self.write()?;
            index.check_insert(record)?;
            self.wal.append(&Mutation::Insert(record.clone()))?;
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
            self.wal.append(&Mutation::Update(record.clone()))?;
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
        let removed = {
            let mut index = self.write()?;
            if index.get(id).is_none() {
                return Ok(None);
            }
            self.wal.append(&Mutation::Delete(*id))?;
            index.remove(id)
        };
        if let Some(record) = &removed {
            debug!(id = %id, "record deleted");
            self.feed.publish(&StoreChange::Deleted(record.clone()));
        }
        Ok(removed)
    }

    async fn delete_all(&self) -> StoreResult<usize> {
        let removed = {
            let mut index = self.write()?;
            self.wal.truncate()?;
            index.clear()
        };
        info!(removed, "ledger store cleared");
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

impl std::fmt::Debug for WalLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalLedgerStore")
            .field("path", &self.wal.path())
            .field("record_count", &self.len())
            .finish()
    }
}
