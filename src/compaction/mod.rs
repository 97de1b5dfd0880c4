//! The compaction clerk.
//!
//! A job flows through the submodules in order: [`scorer`] samples each
//! manifest file for liveness, [`planner`] picks the best contiguous run,
//! [`rewriter`] streams the run through [`filter`] into fresh destination
//! files, and [`clerk`] drives the whole job and talks to the journal
//! controller.

/// Mailbox actor and job coordinator.
pub mod clerk;
/// Compaction error type.
pub mod error;
/// Per-record retention decisions.
pub mod filter;
/// Run selection.
pub mod planner;
/// Run rewrite with destination rollover.
pub mod rewriter;
/// Sampled liveness scoring.
pub mod scorer;

use std::{path::PathBuf, sync::Arc};

use crate::codec::Sqn;

/// Positions sampled per file when scoring.
pub const SAMPLE_SIZE: usize = 200;
/// Records fetched per batch while scoring and rewriting.
pub const BATCH_SIZE: usize = 32;
/// Upper bound on batches examined per file while scoring.
pub const BATCHES_TO_CHECK: usize = 8;
/// Mean liveness a single-file run must beat to be worth compacting.
pub const SINGLE_FILE_TARGET: f64 = 60.0;
/// Mean liveness a full-length run must beat; longer runs amortize I/O, so
/// the target relaxes linearly between these two bounds.
pub const MAX_RUN_TARGET: f64 = 80.0;
/// Default cap on the number of files compacted in one run.
pub const DEFAULT_MAX_RUN_LENGTH: usize = 4;

/// One journal file eligible for compaction, scored for liveness.
#[derive(Debug)]
pub struct Candidate<F> {
    /// Smallest SQN present in the file.
    pub low_sqn: Sqn,
    /// Stable path of the file.
    pub filename: PathBuf,
    /// Shared read handle.
    pub file: Arc<F>,
    /// Percentage of sampled payload still live; 100.0 is the worst
    /// candidate (nothing to reclaim).
    pub compaction_perc: f64,
}

impl<F> Candidate<F> {
    /// Build a candidate.
    pub fn new(low_sqn: Sqn, filename: PathBuf, file: Arc<F>, compaction_perc: f64) -> Self {
        Self {
            low_sqn,
            filename,
            file,
            compaction_perc,
        }
    }
}

impl<F> Clone for Candidate<F> {
    fn clone(&self) -> Self {
        Self {
            low_sqn: self.low_sqn,
            filename: self.filename.clone(),
            file: Arc::clone(&self.file),
            compaction_perc: self.compaction_perc,
        }
    }
}

/// Order a run by ascending `low_sqn`. Stable for equal keys.
pub fn sort_run<F>(run: &mut [Candidate<F>]) {
    run.sort_by_key(|candidate| candidate.low_sqn);
}
