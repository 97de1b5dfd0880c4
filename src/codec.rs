//! Journal record model and wire encoding.
//!
//! A journal record is a `(JournalKey, JournalValue)` pair. Values are
//! stored length-prefixed with a trailing CRC32 over everything that
//! precedes it; readers surface CRC validity alongside the decoded bytes so
//! compaction can drop corrupted records without failing the job.

use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

/// Sequence number: globally unique, strictly increasing per write.
pub type Sqn = u64;

/// Bytes occupied by the trailing CRC on every stored value.
pub const CRC_SIZE: usize = 4;

/// Classifier carried inside a ledger key, selecting the reload strategy
/// applied when the record is superseded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag(u8);

impl Tag {
    /// Plain object writes.
    pub const OBJECT: Tag = Tag(b'o');
    /// Index specification writes.
    pub const INDEX: Tag = Tag(b'i');
    /// Head-only (metadata) writes.
    pub const HEAD: Tag = Tag(b'h');

    /// Build a tag from its raw byte.
    pub const fn new(raw: u8) -> Self {
        Tag(raw)
    }

    /// The raw byte stored on disk.
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Discriminates the three record shapes held in the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// A full object write: object payload plus its key deltas.
    Standard,
    /// A deletion marker. Never reaped by compaction.
    Tombstone,
    /// Key deltas retained after the object payload was compacted away.
    KeyDeltas,
}

/// Ledger-side identity of a record: retention tag plus the user key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    /// Retention tag.
    pub tag: Tag,
    /// Opaque user key bytes.
    pub key: Bytes,
}

impl LedgerKey {
    /// Build a ledger key.
    pub fn new(tag: Tag, key: impl Into<Bytes>) -> Self {
        Self {
            tag,
            key: key.into(),
        }
    }
}

/// Full journal key: `(sqn, kind, ledger_key)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalKey {
    /// Sequence number of the write.
    pub sqn: Sqn,
    /// Record shape.
    pub kind: KeyKind,
    /// Ledger identity.
    pub ledger_key: LedgerKey,
}

impl JournalKey {
    /// Build a journal key.
    pub fn new(sqn: Sqn, kind: KeyKind, ledger_key: LedgerKey) -> Self {
        Self {
            sqn,
            kind,
            ledger_key,
        }
    }

    /// True for deletion markers.
    pub fn is_tombstone(&self) -> bool {
        self.kind == KeyKind::Tombstone
    }
}

/// An index-side change recorded with an object write, retainable
/// independently of the object payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyDelta(pub Bytes);

/// Value payload stored against a journal key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalValue {
    /// Object payload plus key deltas.
    Standard {
        /// The object bytes.
        object: Bytes,
        /// Index deltas generated by the write.
        deltas: Vec<KeyDelta>,
    },
    /// Deletion marker; carries no payload.
    Tombstone,
    /// Key deltas only.
    KeyDeltas(Vec<KeyDelta>),
}

/// Decode failures surfaced by [`decode_value`].
#[derive(Debug, Error)]
pub enum CodecError {
    /// The buffer ended before the encoding was complete.
    #[error("value encoding truncated at {0} bytes")]
    Truncated(usize),
    /// Unknown record-shape discriminant.
    #[error("unknown value kind {0}")]
    UnknownKind(u8),
    /// Stored CRC does not match the payload.
    #[error("value crc mismatch")]
    CrcMismatch,
}

/// Serialize a value for the journal, appending the CRC32 of the encoding.
pub fn encode_value(value: &JournalValue) -> Bytes {
    let mut buf = Vec::with_capacity(16);
    match value {
        JournalValue::Standard { object, deltas } => {
            buf.push(0);
            put_bytes(&mut buf, object);
            put_deltas(&mut buf, deltas);
        }
        JournalValue::Tombstone => buf.push(1),
        JournalValue::KeyDeltas(deltas) => {
            buf.push(2);
            put_deltas(&mut buf, deltas);
        }
    }
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Bytes::from(buf)
}

/// Check the trailing CRC of an encoded value without decoding it.
pub fn verify_crc(encoded: &[u8]) -> bool {
    if encoded.len() < CRC_SIZE + 1 {
        return false;
    }
    let (payload, crc) = encoded.split_at(encoded.len() - CRC_SIZE);
    let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    crc32fast::hash(payload) == stored
}

/// Decode an encoded value, verifying its CRC first.
pub fn decode_value(encoded: &[u8]) -> Result<JournalValue, CodecError> {
    if !verify_crc(encoded) {
        if encoded.len() < CRC_SIZE + 1 {
            return Err(CodecError::Truncated(encoded.len()));
        }
        return Err(CodecError::CrcMismatch);
    }
    let payload = &encoded[..encoded.len() - CRC_SIZE];
    let mut cursor = Cursor {
        buf: payload,
        at: 1,
    };
    match payload[0] {
        0 => {
            let object = cursor.take_bytes()?;
            let deltas = cursor.take_deltas()?;
            Ok(JournalValue::Standard { object, deltas })
        }
        1 => Ok(JournalValue::Tombstone),
        2 => Ok(JournalValue::KeyDeltas(cursor.take_deltas()?)),
        other => Err(CodecError::UnknownKind(other)),
    }
}

/// Hash identifying `(sqn, ledger_key)` inside a file's hash index.
///
/// The record kind is deliberately excluded so a retained key-deltas record
/// remains findable under the identity of the standard record it replaced.
pub fn key_hash(sqn: Sqn, key: &LedgerKey) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&sqn.to_le_bytes());
    hasher.update(&[key.tag.raw()]);
    hasher.update(&key.key);
    hasher.finalize()
}

/// Re-encode a superseded standard record as a key-deltas-only record at
/// the same SQN, dropping the object payload.
///
/// Returns `None` for record shapes that carry no object to strip.
pub fn compact_retained(key: &JournalKey, value: &JournalValue) -> Option<(JournalKey, JournalValue)> {
    match (key.kind, value) {
        (KeyKind::Standard, JournalValue::Standard { deltas, .. }) => Some((
            JournalKey::new(key.sqn, KeyKind::KeyDeltas, key.ledger_key.clone()),
            JournalValue::KeyDeltas(deltas.clone()),
        )),
        _ => None,
    }
}

/// Per-tag policy governing whether and how a superseded record may be
/// discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadStrategy {
    /// Drop the object but keep the key deltas at the original SQN.
    Retain,
    /// Drop the whole record; deltas are regenerated from the object on
    /// reload.
    Recalc,
    /// Drop the whole record; delta loss is accepted and repaired by
    /// external anti-entropy.
    Recover,
}

/// Tag-to-strategy mapping with a fallback for unmapped tags.
///
/// Plumbed through clerk construction rather than read from a global, so
/// tests stay hermetic.
#[derive(Clone, Debug)]
pub struct StrategyMap {
    map: HashMap<Tag, ReloadStrategy>,
    fallback: ReloadStrategy,
}

impl StrategyMap {
    /// Build an empty map with the given fallback strategy.
    pub fn new(fallback: ReloadStrategy) -> Self {
        Self {
            map: HashMap::new(),
            fallback,
        }
    }

    /// Assign a strategy to one tag.
    pub fn with(mut self, tag: Tag, strategy: ReloadStrategy) -> Self {
        self.map.insert(tag, strategy);
        self
    }

    /// Strategy applied to records carrying `tag`.
    pub fn strategy_for(&self, tag: Tag) -> ReloadStrategy {
        self.map.get(&tag).copied().unwrap_or(self.fallback)
    }
}

impl Default for StrategyMap {
    /// System default: retain key deltas for every tag.
    fn default() -> Self {
        Self::new(ReloadStrategy::Retain)
            .with(Tag::OBJECT, ReloadStrategy::Retain)
            .with(Tag::INDEX, ReloadStrategy::Retain)
            .with(Tag::HEAD, ReloadStrategy::Retain)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn put_deltas(buf: &mut Vec<u8>, deltas: &[KeyDelta]) {
    buf.extend_from_slice(&(deltas.len() as u32).to_le_bytes());
    for delta in deltas {
        put_bytes(buf, &delta.0);
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    at: usize,
}

impl Cursor<'_> {
    fn take_u32(&mut self) -> Result<u32, CodecError> {
        let end = self.at + 4;
        let slice = self
            .buf
            .get(self.at..end)
            .ok_or(CodecError::Truncated(self.buf.len()))?;
        self.at = end;
        Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn take_bytes(&mut self) -> Result<Bytes, CodecError> {
        let len = self.take_u32()? as usize;
        let end = self.at + len;
        let slice = self
            .buf
            .get(self.at..end)
            .ok_or(CodecError::Truncated(self.buf.len()))?;
        self.at = end;
        Ok(Bytes::copy_from_slice(slice))
    }

    fn take_deltas(&mut self) -> Result<Vec<KeyDelta>, CodecError> {
        let count = self.take_u32()? as usize;
        let mut deltas = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            deltas.push(KeyDelta(self.take_bytes()?));
        }
        Ok(deltas)
    }
}
