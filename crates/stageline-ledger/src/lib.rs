//! stageline-ledger - append-only history of promoted versions.
//!
//! Backed by [redb](https://docs.rs/redb). Entries are JSON-serialized into
//! `&[u8]` value columns under composite keys
//! `{namespace}/{label}/{sequence:020}`, so a prefix scan over one
//! (namespace, label) pair yields entries in promotion order.
//!
//! The ledger only answers one real question: which version ran before
//! the current one. It is advisory, not a source of truth.

pub mod error;
pub mod ledger;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{LedgerError, LedgerResult};
pub use ledger::HistoryLedger;
pub use store::LedgerStore;
pub use types::HistoryEntry;
