//! Dedup Ledger
//!
//! Remembers which fingerprints have already been emitted. One ledger per
//! adapter task, single writer, no internal locking.
//!
//! Entries are never evicted: memory grows with the number of distinct
//! snapshots seen. Runs are short benchmark sessions, not long-lived services.
//!
//! Created: 2026-02-03

use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct DedupLedger<K = u64> {
    seen: HashSet<K>,
}

impl<K: Hash + Eq> DedupLedger<K> {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Has this key been marked before?
    pub fn seen(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    pub fn mark(&mut self, key: K) {
        self.seen.insert(key);
    }

    /// Marks the key and returns true if it was not seen before.
    pub fn first_sighting(&mut self, key: K) -> bool {
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl<K: Hash + Eq> Default for DedupLedger<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_and_mark() {
        let mut ledger: DedupLedger = DedupLedger::new();
        assert!(!ledger.seen(&42));
        ledger.mark(42);
        assert!(ledger.seen(&42));
        assert!(!ledger.seen(&43));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_first_sighting_only_once() {
        let mut ledger: DedupLedger = DedupLedger::new();
        let hits = (0..10).filter(|_| ledger.first_sighting(7)).count();
        assert_eq!(hits, 1, "same key should pass exactly once");
        assert!(ledger.first_sighting(8));
        assert_eq!(ledger.len(), 2);
    }
}
