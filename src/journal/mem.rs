//! In-memory journal store.
//!
//! Reference implementation of the store traits, used by the crate's own
//! tests and by embedders that want a journal without a disk format.
//! Records are held in append order; CRCs are verified on every fetch, and
//! sealing computes the same hash index a disk file would carry.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::{
    FetchedRecord, JournalConfig, JournalError, JournalFile, JournalStore, JournalWriter, Position,
    WriteOutcome,
    hashtable::{self, HashTree, IndexTable},
};
use crate::{
    codec::{self, JournalKey, JournalValue, KeyKind, LedgerKey, Sqn},
    observability::log_debug,
};

#[derive(Clone, Debug)]
struct StoredRecord {
    key: JournalKey,
    value: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileState {
    Sealed,
    DeletePending { manifest_sqn: Sqn },
}

/// A sealed in-memory journal file.
#[derive(Debug)]
pub struct MemFile {
    filename: PathBuf,
    records: RwLock<Vec<StoredRecord>>,
    index: IndexTable,
    state: Mutex<FileState>,
}

impl MemFile {
    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True when the file holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// True once [`JournalFile::delete_pending`] has been signalled.
    pub fn is_delete_pending(&self) -> bool {
        matches!(*self.state.lock(), FileState::DeletePending { .. })
    }

    /// Manifest SQN recorded with the delete-pending signal, if any.
    pub fn delete_manifest_sqn(&self) -> Option<Sqn> {
        match *self.state.lock() {
            FileState::DeletePending { manifest_sqn } => Some(manifest_sqn),
            FileState::Sealed => None,
        }
    }

    /// Probe the hash index for `(ledger_key, sqn)` and return the kind of
    /// the matching record, if present. Superseded records kept as key
    /// deltas remain findable under their original identity.
    pub fn keycheck(&self, ledger_key: &LedgerKey, sqn: Sqn) -> Option<KeyKind> {
        let records = self.records.read();
        for position in self.index.positions(codec::key_hash(sqn, ledger_key)) {
            if let Some(record) = records.get(position as usize)
                && record.key.sqn == sqn
                && record.key.ledger_key == *ledger_key
            {
                return Some(record.key.kind);
            }
        }
        None
    }

    /// Probe the hash index and decode the matching value, if present and
    /// intact.
    pub fn lookup(&self, ledger_key: &LedgerKey, sqn: Sqn) -> Option<JournalValue> {
        let records = self.records.read();
        for position in self.index.positions(codec::key_hash(sqn, ledger_key)) {
            if let Some(record) = records.get(position as usize)
                && record.key.sqn == sqn
                && record.key.ledger_key == *ledger_key
            {
                return codec::decode_value(&record.value).ok();
            }
        }
        None
    }

    /// Flip a payload byte at `position` so its CRC no longer matches.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn corrupt_value_at(&self, position: Position) {
        let mut records = self.records.write();
        let record = records
            .get_mut(position as usize)
            .expect("corrupt_value_at: position in range");
        let mut bytes = record.value.to_vec();
        bytes[0] ^= 0xff;
        record.value = Bytes::from(bytes);
    }
}

impl JournalFile for MemFile {
    fn filename(&self) -> &Path {
        &self.filename
    }

    async fn get_positions(&self, sample: Option<usize>) -> Result<Vec<Position>, JournalError> {
        let len = self.records.read().len();
        Ok(match sample {
            None => (0..len as Position).collect(),
            Some(0) => Vec::new(),
            Some(n) if n >= len => (0..len as Position).collect(),
            Some(n) => {
                // Uniform spread: fixed stride through the file.
                let step = len as f64 / n as f64;
                (0..n).map(|i| (i as f64 * step) as Position).collect()
            }
        })
    }

    async fn fetch_key_sizes(
        &self,
        positions: &[Position],
    ) -> Result<Vec<(JournalKey, usize)>, JournalError> {
        let records = self.records.read();
        positions
            .iter()
            .map(|&position| {
                records
                    .get(position as usize)
                    .map(|record| (record.key.clone(), record.value.len()))
                    .ok_or(JournalError::BadPosition(position))
            })
            .collect()
    }

    async fn fetch_records(
        &self,
        positions: &[Position],
    ) -> Result<Vec<FetchedRecord>, JournalError> {
        let records = self.records.read();
        positions
            .iter()
            .map(|&position| {
                let record = records
                    .get(position as usize)
                    .ok_or(JournalError::BadPosition(position))?;
                Ok(FetchedRecord {
                    position,
                    key: record.key.clone(),
                    value: record.value.clone(),
                    crc_ok: codec::verify_crc(&record.value),
                })
            })
            .collect()
    }

    async fn first_key(&self) -> Result<JournalKey, JournalError> {
        self.records
            .read()
            .first()
            .map(|record| record.key.clone())
            .ok_or(JournalError::Empty)
    }

    async fn delete_pending(&self, manifest_sqn: Sqn) {
        *self.state.lock() = FileState::DeletePending { manifest_sqn };
        log_debug!(
            component = "journal",
            event = "delete_pending",
            file = %self.filename.display(),
            manifest_sqn,
        );
    }
}

/// Destination file under construction.
#[derive(Debug)]
pub struct MemWriter {
    filename: PathBuf,
    max_file_bytes: usize,
    records: Vec<StoredRecord>,
    bytes: usize,
    files: Arc<Mutex<HashMap<PathBuf, Arc<MemFile>>>>,
}

impl JournalWriter for MemWriter {
    type File = MemFile;

    async fn mput(&mut self, batch: &[(JournalKey, Bytes)]) -> Result<WriteOutcome, JournalError> {
        let incoming: usize = batch.iter().map(|(_, value)| value.len()).sum();
        // First batch always lands, even oversized; see trait contract.
        if !self.records.is_empty() && self.bytes + incoming > self.max_file_bytes {
            return Ok(WriteOutcome::Roll);
        }
        for (key, value) in batch {
            self.records.push(StoredRecord {
                key: key.clone(),
                value: value.clone(),
            });
        }
        self.bytes += incoming;
        Ok(WriteOutcome::Ok)
    }

    async fn complete(self) -> Result<PathBuf, JournalError> {
        let mut tree = HashTree::new();
        for (position, record) in self.records.iter().enumerate() {
            tree.insert(
                codec::key_hash(record.key.sqn, &record.key.ledger_key),
                position as Position,
            );
        }
        let index = hashtable::calculate(&tree, 0);
        let record_count = self.records.len();
        let file = Arc::new(MemFile {
            filename: self.filename.clone(),
            records: RwLock::new(self.records),
            index,
            state: Mutex::new(FileState::Sealed),
        });
        self.files.lock().insert(self.filename.clone(), file);
        log_debug!(
            component = "journal",
            event = "file_sealed",
            file = %self.filename.display(),
            records = record_count,
            bytes = self.bytes,
        );
        Ok(self.filename)
    }
}

/// In-memory journal store.
#[derive(Clone, Debug)]
pub struct MemStore {
    config: JournalConfig,
    files: Arc<Mutex<HashMap<PathBuf, Arc<MemFile>>>>,
}

impl MemStore {
    /// Empty store using `config` for destination size limits.
    pub fn new(config: JournalConfig) -> Self {
        Self {
            config,
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of sealed files held.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }
}

impl JournalStore for MemStore {
    type File = MemFile;
    type Writer = MemWriter;

    async fn open_writer(&self, path: &Path) -> Result<MemWriter, JournalError> {
        if self.files.lock().contains_key(path) {
            return Err(JournalError::AlreadyExists(path.to_path_buf()));
        }
        Ok(MemWriter {
            filename: path.to_path_buf(),
            max_file_bytes: self.config.max_file_bytes,
            records: Vec::new(),
            bytes: 0,
            files: Arc::clone(&self.files),
        })
    }

    async fn open_reader(&self, path: &Path) -> Result<Arc<MemFile>, JournalError> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| JournalError::UnknownFile(path.to_path_buf()))
    }
}
