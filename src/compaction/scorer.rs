//! Sampled liveness scoring.
//!
//! The planner only needs a ranking, so each candidate file is scored from
//! a bounded sample of its records rather than a full scan. The score is
//! the percentage of sampled payload bytes (CRC overhead excluded) that the
//! ledger view still needs.

use super::{BATCHES_TO_CHECK, filter};
use crate::{
    codec::CRC_SIZE,
    journal::{JournalError, JournalFile},
    ledger::LedgerView,
    observability::log_warn,
};

/// Score one journal file: `100.0` means every sampled byte is still live
/// (the worst candidate), lower means more reclaimable.
///
/// A file yielding no sampled payload scores `100.0`; an empty sample is
/// not worth compacting. Read failures also score `100.0` so a flaky file
/// ranks last instead of aborting the job.
pub async fn score_file<F: JournalFile>(
    file: &F,
    ledger: &LedgerView,
    sample_size: usize,
    batch_size: usize,
) -> f64 {
    match sample_liveness(file, ledger, sample_size, batch_size).await {
        Ok((live, replaced)) => {
            let total = live + replaced;
            if total == 0 {
                100.0
            } else {
                100.0 * live as f64 / total as f64
            }
        }
        Err(err) => {
            log_warn!(
                component = "scorer",
                event = "score_read_failed",
                file = %file.filename().display(),
                error = %err,
            );
            100.0
        }
    }
}

async fn sample_liveness<F: JournalFile>(
    file: &F,
    ledger: &LedgerView,
    sample_size: usize,
    batch_size: usize,
) -> Result<(usize, usize), JournalError> {
    let positions = file.get_positions(Some(sample_size)).await?;
    let mut live = 0usize;
    let mut replaced = 0usize;
    for batch in positions.chunks(batch_size.max(1)).take(BATCHES_TO_CHECK) {
        for (key, size) in file.fetch_key_sizes(batch).await? {
            let payload = size.saturating_sub(CRC_SIZE);
            if filter::is_live(&key, ledger.oracle.as_ref(), ledger.max_sqn) {
                live += payload;
            } else {
                replaced += payload;
            }
        }
    }
    Ok((live, replaced))
}
