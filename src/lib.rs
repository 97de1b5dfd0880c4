#![deny(missing_docs)]
//! Journal compaction clerk for a log-structured key-value store.
//!
//! The store appends every write to an immutable journal file and keeps a
//! derived ledger mapping each user key to the sequence number (SQN) of its
//! latest write. Superseded journal records accumulate until a compaction
//! job rewrites a run of files with only the records still needed.
//!
//! This crate is that job:
//! - sample journal files and score how much of their payload is still live,
//! - select the best contiguous run of files under a length cap,
//! - rewrite the run through per-tag retention rules, rolling destinations
//!   at their size limit,
//! - hand the resulting manifest delta to the journal controller for an
//!   atomic swap, and ask it to schedule deletion of the consumed files.
//!
//! The journal file format, the ledger itself, and manifest ownership are
//! collaborators reached through the traits in [`journal`], [`ledger`] and
//! [`manifest`]; an in-memory reference store lives in [`journal::mem`].

/// Record encoding: journal keys/values, CRC framing, retention re-encoding.
pub mod codec;
/// The compaction clerk: scoring, planning, filtering, rewriting, and the
/// mailbox actor driving a job end-to-end.
pub mod compaction;
/// Journal file store traits and the in-memory reference implementation.
pub mod journal;
/// Ledger liveness oracle.
pub mod ledger;
/// Manifest types and the journal controller contract.
pub mod manifest;
/// Logging shims.
pub(crate) mod observability;

pub use crate::{
    codec::{JournalKey, JournalValue, KeyKind, LedgerKey, ReloadStrategy, Sqn, StrategyMap, Tag},
    compaction::{
        Candidate,
        clerk::{Clerk, ClerkOptions, CompactRequest},
        error::CompactionError,
    },
    journal::{JournalConfig, JournalError, JournalFile, JournalStore, JournalWriter},
    ledger::{LedgerOracle, LedgerSnapshot, LedgerView},
    manifest::{JournalController, ManifestEntry, ManifestSlice},
};
