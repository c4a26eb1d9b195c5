//! Per-(namespace, label) promotion locks.
//!
//! A lock is held from the decision through the ledger write. It is
//! released when the guard drops, before confirmation finishes. Locks
//! are in-process only.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

type Key = (String, String);

#[derive(Debug, Clone, Default)]
pub struct PromotionLocks {
    held: Arc<Mutex<HashSet<Key>>>,
}

impl PromotionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Key>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the lock for `(namespace, label)`, or `None` if another
    /// request holds it.
    pub fn try_acquire(&self, namespace: &str, label: &str) -> Option<PromotionGuard> {
        let key = (namespace.to_string(), label.to_string());
        if !self.lock().insert(key.clone()) {
            return None;
        }
        Some(PromotionGuard {
            locks: self.clone(),
            key,
        })
    }

    pub fn is_held(&self, namespace: &str, label: &str) -> bool {
        self.lock()
            .contains(&(namespace.to_string(), label.to_string()))
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct PromotionGuard {
    locks: PromotionLocks,
    key: Key,
}

impl Drop for PromotionGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.key);
    }
}
