//! Journal file store contracts.
//!
//! The clerk reads immutable source files, writes fresh destination files,
//! and never owns the on-disk format: everything it needs from the store is
//! expressed by the three traits here. [`mem`] provides the in-memory
//! reference implementation used by tests and embedders.

/// Hash index table computation for sealed files.
pub mod hashtable;
/// In-memory journal store.
pub mod mem;

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use thiserror::Error;

use crate::codec::{CodecError, JournalKey, Sqn};

/// Offset of a record within a journal file, as enumerated by the store.
pub type Position = u64;

/// File extension for journal files.
pub const EXTENSION: &str = "cdb";

/// Default size limit for a destination file before it signals a roll.
pub const DEFAULT_MAX_FILE_BYTES: usize = 32 * 1024 * 1024;

/// File-store configuration held for the clerk's lifetime.
#[derive(Clone, Debug)]
pub struct JournalConfig {
    /// Directory destination files are created under.
    pub root: PathBuf,
    /// Size at which a destination file rolls.
    pub max_file_bytes: usize,
}

impl JournalConfig {
    /// Configuration rooted at `root` with the default size limit.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Override the destination size limit.
    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes.max(1);
        self
    }
}

/// Path of a compaction destination file whose first record is `first_sqn`.
///
/// The SQN keeps manifest ordering derivable from filenames alone; the
/// marker distinguishes compaction output from writer-rolled journal files.
pub fn compact_filename(root: &Path, first_sqn: Sqn) -> PathBuf {
    root.join(format!("{first_sqn:012}_compact.{EXTENSION}"))
}

/// Failures surfaced by a journal store.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Underlying I/O failure.
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),
    /// Record encoding failure.
    #[error("journal codec error: {0}")]
    Codec(#[from] CodecError),
    /// No sealed file is registered under this path.
    #[error("unknown journal file {0}")]
    UnknownFile(PathBuf),
    /// A file already exists under the path given to a writer.
    #[error("journal file {0} already exists")]
    AlreadyExists(PathBuf),
    /// A fetched position is outside the file.
    #[error("position {0} out of range")]
    BadPosition(Position),
    /// The file holds no records.
    #[error("journal file is empty")]
    Empty,
}

/// One record fetched from a source file with its CRC verdict.
#[derive(Clone, Debug)]
pub struct FetchedRecord {
    /// Position the record was read from.
    pub position: Position,
    /// Journal key.
    pub key: JournalKey,
    /// Encoded value bytes, trailing CRC included.
    pub value: Bytes,
    /// Whether the trailing CRC matched on read.
    pub crc_ok: bool,
}

/// Result of appending a batch to a destination file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The batch was written.
    Ok,
    /// The file is at its size limit and the batch was **not** written;
    /// seal this file and retry the batch on a fresh one.
    Roll,
}

/// A sealed, immutable journal file.
pub trait JournalFile: Send + Sync + 'static {
    /// Stable path of the file.
    fn filename(&self) -> &Path;

    /// Enumerate record positions in ascending order. `Some(n)` returns up
    /// to `n` positions uniformly spread across the file; `None` returns
    /// all of them.
    fn get_positions(
        &self,
        sample: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Position>, JournalError>> + Send;

    /// Fetch `(key, stored size)` for each position.
    fn fetch_key_sizes(
        &self,
        positions: &[Position],
    ) -> impl Future<Output = Result<Vec<(JournalKey, usize)>, JournalError>> + Send;

    /// Fetch full records with CRC verdicts for each position.
    fn fetch_records(
        &self,
        positions: &[Position],
    ) -> impl Future<Output = Result<Vec<FetchedRecord>, JournalError>> + Send;

    /// Key of the first record in the file.
    fn first_key(&self) -> impl Future<Output = Result<JournalKey, JournalError>> + Send;

    /// Move the file into the delete-pending state: it is removed once no
    /// reader observing a manifest older than `manifest_sqn` still holds
    /// it.
    fn delete_pending(&self, manifest_sqn: Sqn) -> impl Future<Output = ()> + Send;
}

/// An open destination file accepting appends until sealed.
pub trait JournalWriter: Send + Sized {
    /// Sealed-file type produced by the owning store.
    type File: JournalFile;

    /// Append a batch of encoded records. All-or-nothing: on
    /// [`WriteOutcome::Roll`] nothing was written. A freshly opened writer
    /// accepts its first batch regardless of size, so an oversized batch
    /// seals an oversized file rather than rolling forever.
    fn mput(
        &mut self,
        batch: &[(JournalKey, Bytes)],
    ) -> impl Future<Output = Result<WriteOutcome, JournalError>> + Send;

    /// Flush, build the hash index, and seal the file, returning the path
    /// to reopen it read-only under.
    fn complete(self) -> impl Future<Output = Result<PathBuf, JournalError>> + Send;
}

/// Factory for journal readers and writers.
pub trait JournalStore: Send + Sync + 'static {
    /// Sealed-file handle type.
    type File: JournalFile;
    /// Writer type.
    type Writer: JournalWriter<File = Self::File>;

    /// Create a destination file at `path`.
    fn open_writer(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Self::Writer, JournalError>> + Send;

    /// Open a sealed file read-only.
    fn open_reader(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<std::sync::Arc<Self::File>, JournalError>> + Send;
}
