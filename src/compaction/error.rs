use thiserror::Error;

use crate::{journal::JournalError, manifest::ControllerError};

/// Errors that can surface while running a compaction job.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// A source read or destination write failed.
    #[error("compaction journal error: {0}")]
    Journal(#[from] JournalError),
    /// The journal controller failed or refused the delta.
    #[error("compaction controller error: {0}")]
    Controller(#[from] ControllerError),
    /// The ledger snapshot could not be taken.
    #[error("ledger snapshot failed: {0}")]
    Snapshot(String),
    /// The clerk's mailbox is closed.
    #[error("compaction clerk mailbox is closed")]
    MailboxClosed,
}
