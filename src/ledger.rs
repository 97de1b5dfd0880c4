//! Ledger liveness oracle.
//!
//! The ledger is the store's derived index mapping user keys to the SQN of
//! their latest write. Compaction never reads the ledger directly; it takes
//! a point-in-time view at job start and asks it one question per record:
//! is this `(ledger_key, sqn)` pair still what the ledger records?

use std::{collections::HashMap, sync::Arc};

use crate::codec::{LedgerKey, Sqn};

/// Answers record-liveness questions against a ledger snapshot.
///
/// Implementations only judge `(ledger_key, sqn)` currency; tombstone
/// handling and the SQN horizon are applied by the compaction filter.
pub trait LedgerOracle: Send + Sync {
    /// True iff the ledger still records exactly this `(key, sqn)` pair.
    fn is_current(&self, key: &LedgerKey, sqn: Sqn) -> bool;
}

/// Point-in-time ledger view handed to a compaction job: the oracle plus
/// the snapshot horizon. Records above `max_sqn` postdate the snapshot and
/// are always treated as live.
#[derive(Clone)]
pub struct LedgerView {
    /// Liveness oracle over the snapshot.
    pub oracle: Arc<dyn LedgerOracle>,
    /// Highest SQN covered by the snapshot.
    pub max_sqn: Sqn,
}

impl LedgerView {
    /// Bundle an oracle with its snapshot horizon.
    pub fn new(oracle: Arc<dyn LedgerOracle>, max_sqn: Sqn) -> Self {
        Self { oracle, max_sqn }
    }
}

/// In-memory ledger snapshot: a plain map from ledger key to current SQN.
#[derive(Clone, Debug, Default)]
pub struct LedgerSnapshot {
    entries: HashMap<LedgerKey, Sqn>,
}

impl LedgerSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` as currently written at `sqn`.
    pub fn insert(&mut self, key: LedgerKey, sqn: Sqn) {
        self.entries.insert(key, sqn);
    }

    /// Number of keys recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no keys are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(LedgerKey, Sqn)> for LedgerSnapshot {
    fn from_iter<I: IntoIterator<Item = (LedgerKey, Sqn)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl LedgerOracle for LedgerSnapshot {
    fn is_current(&self, key: &LedgerKey, sqn: Sqn) -> bool {
        self.entries.get(key) == Some(&sqn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Tag;

    #[test]
    fn snapshot_answers_exact_pairs_only() {
        let key = LedgerKey::new(Tag::OBJECT, "k1");
        let snapshot: LedgerSnapshot = [(key.clone(), 8)].into_iter().collect();
        assert!(snapshot.is_current(&key, 8));
        assert!(!snapshot.is_current(&key, 7));
        assert!(!snapshot.is_current(&LedgerKey::new(Tag::OBJECT, "k2"), 8));
    }
}
