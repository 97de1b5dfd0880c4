//! Manifest types and the journal controller contract.
//!
//! The manifest is the ordered list of live journal files with their
//! starting SQN. It is owned and persisted by the journal controller; the
//! clerk only produces deltas. The controller applies a delta atomically:
//! observers see either the full compaction or none of it.

use std::{future::Future, path::PathBuf, pin::Pin, sync::Arc};

use thiserror::Error;

use crate::codec::Sqn;

/// One live journal file as recorded in the manifest.
#[derive(Debug)]
pub struct ManifestEntry<F> {
    /// Smallest SQN present in the file.
    pub start_sqn: Sqn,
    /// Stable path of the file.
    pub filename: PathBuf,
    /// Shared read handle.
    pub file: Arc<F>,
}

impl<F> ManifestEntry<F> {
    /// Build an entry.
    pub fn new(start_sqn: Sqn, filename: PathBuf, file: Arc<F>) -> Self {
        Self {
            start_sqn,
            filename,
            file,
        }
    }
}

impl<F> Clone for ManifestEntry<F> {
    fn clone(&self) -> Self {
        Self {
            start_sqn: self.start_sqn,
            filename: self.filename.clone(),
            file: Arc::clone(&self.file),
        }
    }
}

/// Ordered manifest delta produced by one compaction job. Entries are
/// appended in ascending `start_sqn` order.
pub type ManifestSlice<F> = Vec<ManifestEntry<F>>;

/// Failures surfaced by the journal controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The controller has shut down.
    #[error("journal controller closed")]
    Closed,
    /// The controller refused the manifest delta.
    #[error("manifest update rejected: {0}")]
    Rejected(String),
}

/// The journal owner, serializing manifest mutation for one journal.
///
/// Methods return boxed futures so controllers can be held behind `Arc`
/// without committing the clerk to a concrete controller type per call
/// site.
pub trait JournalController<F>: Send + Sync {
    /// Current manifest in ascending SQN order. The first entry is the
    /// active write tip and is never compacted.
    fn get_manifest(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ManifestEntry<F>>, ControllerError>> + Send + '_>>;

    /// Atomically swap `consumed` for `slice`, returning the manifest SQN
    /// of the new version.
    fn update_manifest(
        &self,
        slice: ManifestSlice<F>,
        consumed: Vec<ManifestEntry<F>>,
    ) -> Pin<Box<dyn Future<Output = Result<Sqn, ControllerError>> + Send + '_>>;

    /// Notification that the clerk has finished a job (with or without
    /// producing a delta).
    fn compaction_complete(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
