use std::sync::{PoisonError, RwLock};

use meter_types::{ConsumptionRecord, PeriodSelector};
use tokio::sync::broadcast;
use tracing::debug;

/// A committed mutation of the ledger store.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreChange {
    Inserted(ConsumptionRecord),
    Updated {
        previous: ConsumptionRecord,
        current: ConsumptionRecord,
    },
    Deleted(ConsumptionRecord),
    Cleared {
        removed: usize,
    },
}

impl StoreChange {
    /// Returns `true` if this change can alter the result set of `selector`.
    ///
    /// An update matches when either its old or its new date is in scope, so
    /// a record moved out of a period still refreshes that period.
    pub fn affects(&self, selector: &PeriodSelector) -> bool {
        match self {
            Self::Inserted(record) | Self::Deleted(record) => selector.contains(&record.date),
            Self::Updated { previous, current } => {
                selector.contains(&previous.date) || selector.contains(&current.date)
            }
            Self::Cleared { .. } => true,
        }
    }
}

/// A broadcast receiver of store changes matching one selector.
pub type ChangeStream = broadcast::Receiver<StoreChange>;

struct Subscriber {
    selector: PeriodSelector,
    sender: broadcast::Sender<StoreChange>,
}

/// Fan-out of store changes to period-filtered subscribers.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
}

impl ChangeFeed {
    /// Create a feed whose per-subscriber channels buffer `capacity` changes.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, selector: PeriodSelector) -> ChangeStream {
        let (sender, receiver) = broadcast::channel(self.capacity);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { selector, sender });
        receiver
    }

    /// Deliver a change to every subscriber whose selector it affects.
    /// Subscribers whose receivers have all been dropped are pruned.
    pub fn publish(&self, change: &StoreChange) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|sub| {
            if change.affects(&sub.selector) {
                sub.sender.send(change.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
        if subs.len() != before {
            debug!(pruned = before - subs.len(), "pruned closed subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
