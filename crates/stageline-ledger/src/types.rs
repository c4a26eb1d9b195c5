//! Ledger record types.

use serde::{Deserialize, Serialize};

/// One promoted version. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub namespace: String,
    pub version: String,
    pub label: String,
    /// Global, strictly increasing insertion order.
    pub sequence: u64,
    /// Unix timestamp (seconds) when the entry was appended.
    pub recorded_at: u64,
}

impl HistoryEntry {
    pub fn table_key(&self) -> String {
        entry_key(&self.namespace, &self.label, self.sequence)
    }
}

/// Key prefix shared by every entry of one (namespace, label) pair.
pub fn pair_prefix(namespace: &str, label: &str) -> String {
    format!("{namespace}/{label}/")
}

/// Zero-padded so lexicographic key order matches sequence order.
pub fn entry_key(namespace: &str, label: &str, sequence: u64) -> String {
    format!("{}{sequence:020}", pair_prefix(namespace, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_sort_by_sequence() {
        let a = entry_key("prod", "api", 9);
        let b = entry_key("prod", "api", 10);
        assert!(a < b);
        assert!(a.starts_with(&pair_prefix("prod", "api")));
    }

    #[test]
    fn prefix_does_not_match_longer_label() {
        let key = entry_key("prod", "api-gateway", 1);
        assert!(!key.starts_with(&pair_prefix("prod", "api")));
    }
}
