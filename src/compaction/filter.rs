//! Per-record retention decisions.
//!
//! Each record pulled from a source file is classified against the ledger
//! view and the reload strategy of its tag. Tombstones are always live:
//! reaping them is a separate job with different safety conditions.

use crate::{
    codec::{self, JournalKey, JournalValue, KeyKind, ReloadStrategy, Sqn, StrategyMap},
    journal::FetchedRecord,
    ledger::LedgerOracle,
};

/// Outcome of classifying one record.
#[derive(Clone, Debug)]
pub enum Verdict {
    /// Copy the record to the destination unchanged.
    KeepOriginal,
    /// Write this rewritten record (key deltas only) instead.
    KeepCompacted(JournalKey, JournalValue),
    /// Superseded and reclaimable: write nothing.
    Drop,
    /// CRC mismatch: write nothing, and the job must not schedule the
    /// source file for deletion.
    Corrupt,
}

/// True when the ledger view still needs this record.
///
/// Records above the snapshot horizon postdate the view and are always
/// live; so are tombstones.
pub fn is_live(key: &JournalKey, oracle: &dyn LedgerOracle, max_sqn: Sqn) -> bool {
    key.is_tombstone() || key.sqn > max_sqn || oracle.is_current(&key.ledger_key, key.sqn)
}

/// Classify one fetched record.
pub fn classify(
    record: &FetchedRecord,
    strategies: &StrategyMap,
    oracle: &dyn LedgerOracle,
    max_sqn: Sqn,
) -> Verdict {
    if !record.crc_ok {
        return Verdict::Corrupt;
    }
    let key = &record.key;
    if is_live(key, oracle, max_sqn) {
        return Verdict::KeepOriginal;
    }
    match strategies.strategy_for(key.ledger_key.tag) {
        ReloadStrategy::Retain => {
            if key.kind == KeyKind::KeyDeltas {
                // Already deltas-only; nothing left to strip.
                return Verdict::KeepOriginal;
            }
            let Ok(value) = codec::decode_value(&record.value) else {
                return Verdict::Corrupt;
            };
            match codec::compact_retained(key, &value) {
                Some((new_key, new_value)) => Verdict::KeepCompacted(new_key, new_value),
                None => Verdict::KeepOriginal,
            }
        }
        ReloadStrategy::Recalc | ReloadStrategy::Recover => Verdict::Drop,
    }
}
