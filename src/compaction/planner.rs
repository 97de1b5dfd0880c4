//! Run selection.
//!
//! Candidates arrive in manifest order (ascending `low_sqn`); the planner
//! picks the contiguous window of length ≤ `max_run_length` with the best
//! score. A window's score is a length-aware target minus its mean
//! liveness: longer runs are rewarded with a laxer target because the I/O
//! spent per reclaimed byte amortizes, but the run must still sit below
//! target on average. Only positive scores are worth compacting.
//!
//! Selection is a greedy forward scan: the window either extends by the
//! next candidate (while under the cap and scoring better than starting
//! over) or resets to a singleton there, tracking the best window seen. A
//! greedy start can be unlucky, so when the scan does not already produce
//! a full-length run it is repeated from the next `max_run_length - 1`
//! starting offsets, keeping strictly better windows; ties keep the
//! earlier run.

use std::ops::Range;

use super::{Candidate, MAX_RUN_TARGET, SINGLE_FILE_TARGET};

/// Score a run of `run.len()` candidates against the length-aware target.
/// The empty run scores exactly `0.0`.
pub fn score_run<F>(run: &[Candidate<F>], max_run_length: usize) -> f64 {
    score_percs(
        run.iter().map(|candidate| candidate.compaction_perc),
        run.len(),
        max_run_length,
    )
}

/// Select the best contiguous run of length ≤ `max_run_length`.
///
/// Returns an empty run when no window scores above `0.0`.
pub fn plan<F>(candidates: &[Candidate<F>], max_run_length: usize) -> Vec<Candidate<F>> {
    let max_run_length = max_run_length.max(1);
    let percs: Vec<f64> = candidates
        .iter()
        .map(|candidate| candidate.compaction_perc)
        .collect();

    let naive = assess(&percs, max_run_length);
    let window = if naive.len() == max_run_length {
        naive
    } else {
        let mut best = naive;
        let mut best_score = window_score(&percs, &best, max_run_length);
        for offset in 1..max_run_length.min(percs.len()) {
            let local = assess(&percs[offset..], max_run_length);
            let shifted = local.start + offset..local.end + offset;
            let score = window_score(&percs, &shifted, max_run_length);
            if score > best_score {
                best = shifted;
                best_score = score;
            }
        }
        best
    };
    candidates[window].to_vec()
}

/// One greedy pass, returning the best window seen (possibly empty).
fn assess(percs: &[f64], max_run_length: usize) -> Range<usize> {
    let mut best = 0..0;
    let mut best_score = 0.0;
    let mut current = 0..0;
    for i in 0..percs.len() {
        let extended = if current.is_empty() {
            i..i + 1
        } else {
            current.start..i + 1
        };
        let singleton = i..i + 1;
        current = if extended.len() <= max_run_length
            && window_score(percs, &extended, max_run_length)
                > window_score(percs, &singleton, max_run_length)
        {
            extended
        } else {
            singleton
        };
        let score = window_score(percs, &current, max_run_length);
        if score > best_score {
            best = current.clone();
            best_score = score;
        }
    }
    best
}

fn window_score(percs: &[f64], window: &Range<usize>, max_run_length: usize) -> f64 {
    score_percs(
        percs[window.clone()].iter().copied(),
        window.len(),
        max_run_length,
    )
}

fn score_percs(percs: impl Iterator<Item = f64>, len: usize, max_run_length: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    let target = if max_run_length > 1 {
        SINGLE_FILE_TARGET
            + (MAX_RUN_TARGET - SINGLE_FILE_TARGET) * (len - 1) as f64 / (max_run_length - 1) as f64
    } else {
        SINGLE_FILE_TARGET
    };
    target - percs.sum::<f64>() / len as f64
}
