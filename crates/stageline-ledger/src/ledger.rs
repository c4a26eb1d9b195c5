//! The history ledger contract consumed by the promotion engine.

use crate::error::LedgerResult;
use crate::types::HistoryEntry;

/// Append-only, per-(namespace, label) ordered log of promoted versions.
///
/// Implementations must make each `append` atomic. Duplicate content is
/// legal: promoting the same version twice over time is real history.
pub trait HistoryLedger: Send + Sync {
    /// Record `version` as promoted for (`namespace`, `label`).
    fn append(&self, namespace: &str, version: &str, label: &str) -> LedgerResult<HistoryEntry>;

    /// The version recorded immediately before the most recent entry for
    /// `current_version`, restricted to the same (`namespace`, `label`).
    ///
    /// Entries carrying `current_version` itself are skipped, so the result
    /// is never the version already running. `None` means there is nothing
    /// to roll back to.
    fn find_previous(
        &self,
        namespace: &str,
        current_version: &str,
        label: &str,
    ) -> LedgerResult<Option<String>>;

    /// All entries for (`namespace`, `label`), oldest first.
    fn entries(&self, namespace: &str, label: &str) -> LedgerResult<Vec<HistoryEntry>>;
}

/// Pick the rollback target from entries sorted by ascending sequence.
pub fn previous_version(entries: &[HistoryEntry], current_version: &str) -> Option<String> {
    let anchor = entries
        .iter()
        .rev()
        .find(|e| e.version == current_version)?;
    entries
        .iter()
        .rev()
        .filter(|e| e.sequence < anchor.sequence && e.version != current_version)
        .map(|e| e.version.clone())
        .next()
}
