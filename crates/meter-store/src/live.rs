use std::sync::{Arc, Weak};

use meter_types::{ConsumptionRecord, PeriodSelector};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::change::ChangeStream;
use crate::error::StoreResult;
use crate::traits::LedgerStore;

/// A push-refreshed view of one period's records.
///
/// The first call to [`next`](Self::next) yields the current result set.
/// Each later call waits until a change affecting the period is committed
/// and yields the freshly re-queried result set (newest first, as the store
/// returns it). Dropping the query unsubscribes.
///
/// The query does not keep the store alive: once the last `Arc` to the
/// store is dropped, [`next`](Self::next) returns `None`.
pub struct LiveQuery<S: ?Sized> {
    store: Weak<S>,
    selector: PeriodSelector,
    changes: ChangeStream,
    primed: bool,
}

impl<S: LedgerStore + ?Sized> LiveQuery<S> {
    pub fn new(store: &Arc<S>, selector: PeriodSelector) -> Self {
        // Subscribe before the first query so no change can slip between.
        let changes = store.subscribe(selector);
        Self {
            store: Arc::downgrade(store),
            selector,
            changes,
            primed: false,
        }
    }

    pub fn selector(&self) -> PeriodSelector {
        self.selector
    }

    /// Wait for the next result set. `None` once the store is dropped.
    pub async fn next(&mut self) -> Option<StoreResult<Vec<ConsumptionRecord>>> {
        if !self.primed {
            self.primed = true;
            return self.query().await;
        }

        match self.changes.recv().await {
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, selector = ?self.selector, "live query lagged; re-querying");
            }
            Err(RecvError::Closed) => return None,
        }

        // Coalesce whatever else is already queued; one query covers it all.
        while self.changes.try_recv().is_ok() {}

        self.query().await
    }

    async fn query(&self) -> Option<StoreResult<Vec<ConsumptionRecord>>> {
        let store = self.store.upgrade()?;
        Some(store.query(&self.selector).await)
    }
}
