//! redb table definitions for the history ledger.

use redb::TableDefinition;

/// History entries keyed by `{namespace}/{label}/{sequence:020}`.
pub const HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("release_history");

/// Counters keyed by name. Holds the next sequence number.
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Key of the global sequence counter in [`COUNTERS`].
pub const NEXT_SEQUENCE: &str = "next_sequence";
