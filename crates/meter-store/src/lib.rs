//! Ledger store for the Meter Ledger.
//!
//! Provides:
//! - The [`LedgerStore`] trait boundary (async, `Send + Sync`)
//! - A filtered change feed and [`LiveQuery`] for push-based refresh
//! - [`InMemoryLedgerStore`] for tests and embedding
//! - [`WalLedgerStore`], a durable backend built on a CRC-framed
//!   write-ahead log that is replayed on open

pub mod change;
pub mod durable;
pub mod error;
pub mod live;
pub mod memory;
pub mod traits;
pub mod wal;

mod index;

pub use change::{ChangeFeed, ChangeStream, StoreChange};
pub use durable::WalLedgerStore;
pub use error::{StoreError, StoreResult};
pub use live::LiveQuery;
pub use memory::InMemoryLedgerStore;
pub use traits::LedgerStore;
pub use wal::{SyncMode, WalConfig, WriteAheadLog};
