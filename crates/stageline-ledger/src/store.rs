//! LedgerStore - redb-backed history ledger.
//!
//! Supports both on-disk and in-memory backends (the latter for testing).
//! Each append runs in a single write transaction that bumps the sequence
//! counter and inserts the entry, so appends are atomic and totally ordered.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use stageline_core::epoch_secs;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{previous_version, HistoryLedger};
use crate::tables::*;
use crate::types::{pair_prefix, HistoryEntry};

/// Convert any `Display` error into a `LedgerError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| LedgerError::$variant(e.to_string())
    };
}

/// Thread-safe history ledger backed by redb.
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<Database>,
}

impl LedgerStore {
    /// Open (or create) a persistent ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "history ledger opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory ledger (for testing).
    pub fn open_in_memory() -> LedgerResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory history ledger opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> LedgerResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(HISTORY).map_err(map_err!(Table))?;
        txn.open_table(COUNTERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Total number of entries across all (namespace, label) pairs.
    pub fn len(&self) -> LedgerResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl HistoryLedger for LedgerStore {
    fn append(&self, namespace: &str, version: &str, label: &str) -> LedgerResult<HistoryEntry> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let entry;
        {
            let mut counters = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
            let sequence = counters
                .get(NEXT_SEQUENCE)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(1);
            counters
                .insert(NEXT_SEQUENCE, sequence + 1)
                .map_err(map_err!(Write))?;

            entry = HistoryEntry {
                namespace: namespace.to_string(),
                version: version.to_string(),
                label: label.to_string(),
                sequence,
                recorded_at: epoch_secs(),
            };
            let key = entry.table_key();
            let value = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;

            let mut table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%namespace, %label, %version, sequence = entry.sequence, "history entry appended");
        Ok(entry)
    }

    fn find_previous(
        &self,
        namespace: &str,
        current_version: &str,
        label: &str,
    ) -> LedgerResult<Option<String>> {
        let entries = self.entries(namespace, label)?;
        let previous = previous_version(&entries, current_version);
        debug!(
            %namespace,
            %label,
            %current_version,
            previous = previous.as_deref().unwrap_or("<none>"),
            "looked up previous version"
        );
        Ok(previous)
    }

    fn entries(&self, namespace: &str, label: &str) -> LedgerResult<Vec<HistoryEntry>> {
        let prefix = pair_prefix(namespace, label);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let record: HistoryEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            // A label or namespace containing `/` can share the key prefix.
            if record.namespace == namespace && record.label == label {
                results.push(record);
            }
        }
        results.sort_by_key(|e| e.sequence);
        Ok(results)
    }
}
