//! Hash index table computation.
//!
//! Sealed journal files carry a bucketed hash index so point lookups touch
//! at most a handful of slots. The layout is classic constant-database
//! style: 256 buckets selected by the low hash byte, each holding twice as
//! many slots as entries, probed linearly from a slot derived from the
//! remaining hash bits.
//!
//! The computation is pure and shares no state with compaction; the clerk
//! also exposes it as a standalone task (see
//! [`Clerk::hashtable_calc`](crate::compaction::clerk::Clerk::hashtable_calc)).

use bytes::Bytes;

use super::Position;

/// Number of hash buckets in an index table.
pub const BUCKETS: usize = 256;

/// Serialized size of one slot: hash (u32) plus position (u64).
const SLOT_SIZE: usize = 12;

/// Accumulates `(hash, position)` pairs while a file is being written.
#[derive(Clone, Debug)]
pub struct HashTree {
    buckets: Vec<Vec<(u32, Position)>>,
}

impl HashTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); BUCKETS],
        }
    }

    /// Record a hash at a position. The low hash byte selects the bucket.
    pub fn insert(&mut self, hash: u32, position: Position) {
        self.buckets[(hash & 0xff) as usize].push((hash, position));
    }

    /// Total number of recorded entries.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }
}

impl Default for HashTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Location of one bucket's slot run inside the serialized table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Absolute offset of the bucket's first slot.
    pub offset: u64,
    /// Number of slots in the bucket.
    pub slots: u64,
}

/// Computed index: 256 bucket descriptors plus the serialized slot runs.
#[derive(Clone, Debug)]
pub struct IndexTable {
    start_pos: u64,
    index: Vec<IndexEntry>,
    slots: Bytes,
}

impl IndexTable {
    /// Bucket descriptors in bucket order.
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Serialized slot runs, laid out from `start_pos`.
    pub fn slots(&self) -> &Bytes {
        &self.slots
    }

    /// Candidate positions for `hash`, in probe order.
    ///
    /// Every position inserted under `hash` is returned; hash collisions
    /// mean the caller must verify the record key.
    pub fn positions(&self, hash: u32) -> Vec<Position> {
        let entry = self.index[(hash & 0xff) as usize];
        let nslots = entry.slots as usize;
        if nslots == 0 {
            return Vec::new();
        }
        let base = (entry.offset - self.start_pos) as usize;
        let mut found = Vec::new();
        let mut slot = ((hash >> 8) as usize) % nslots;
        for _ in 0..nslots {
            let at = base + slot * SLOT_SIZE;
            let stored_hash = u32::from_le_bytes(self.slots[at..at + 4].try_into().expect("slot"));
            let stored_pos =
                u64::from_le_bytes(self.slots[at + 4..at + SLOT_SIZE].try_into().expect("slot"));
            if stored_pos == 0 {
                break;
            }
            if stored_hash == hash {
                found.push(stored_pos - 1);
            }
            slot = (slot + 1) % nslots;
        }
        found
    }
}

/// Compute the index table for a hash tree, laying slot runs out from
/// `start_pos`.
pub fn calculate(tree: &HashTree, start_pos: u64) -> IndexTable {
    let mut index = Vec::with_capacity(BUCKETS);
    let mut slots = Vec::with_capacity(tree.len() * 2 * SLOT_SIZE);
    let mut offset = start_pos;
    for bucket in &tree.buckets {
        let nslots = bucket.len() * 2;
        // Stored positions are one-based so an all-zero slot reads as empty.
        let mut run = vec![(0u32, 0u64); nslots];
        for &(hash, position) in bucket {
            let mut slot = ((hash >> 8) as usize) % nslots;
            while run[slot].1 != 0 {
                slot = (slot + 1) % nslots;
            }
            run[slot] = (hash, position + 1);
        }
        for (hash, position) in run {
            slots.extend_from_slice(&hash.to_le_bytes());
            slots.extend_from_slice(&position.to_le_bytes());
        }
        index.push(IndexEntry {
            offset,
            slots: nslots as u64,
        });
        offset += (nslots * SLOT_SIZE) as u64;
    }
    IndexTable {
        start_pos,
        index,
        slots: Bytes::from(slots),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_is_findable() {
        let mut tree = HashTree::new();
        let hashes: Vec<u32> = (0..500u32).map(|i| i.wrapping_mul(2654435761)).collect();
        for (pos, &hash) in hashes.iter().enumerate() {
            tree.insert(hash, pos as Position);
        }
        let table = calculate(&tree, 4096);
        for (pos, &hash) in hashes.iter().enumerate() {
            assert!(
                table.positions(hash).contains(&(pos as Position)),
                "hash {hash:#x} lost position {pos}"
            );
        }
    }

    #[test]
    fn offsets_are_consistent_with_slot_counts() {
        let mut tree = HashTree::new();
        for i in 0..64u32 {
            tree.insert(i * 7919, Position::from(i));
        }
        let table = calculate(&tree, 128);
        let mut expected = 128u64;
        for entry in table.index() {
            assert_eq!(entry.offset, expected);
            expected += entry.slots * SLOT_SIZE as u64;
        }
        assert_eq!(
            table.slots().len() as u64,
            expected - 128,
            "slot buffer covers every bucket run"
        );
    }

    #[test]
    fn colliding_hashes_return_all_positions() {
        let mut tree = HashTree::new();
        tree.insert(0xdead_beef, 3);
        tree.insert(0xdead_beef, 9);
        let table = calculate(&tree, 0);
        let mut positions = table.positions(0xdead_beef);
        positions.sort_unstable();
        assert_eq!(positions, vec![3, 9]);
    }

    #[test]
    fn empty_bucket_probes_nothing() {
        let table = calculate(&HashTree::new(), 0);
        assert!(table.positions(42).is_empty());
        assert!(table.slots().is_empty());
    }

    #[test]
    fn position_zero_survives_the_empty_slot_sentinel() {
        let mut tree = HashTree::new();
        tree.insert(7, 0);
        let table = calculate(&tree, 0);
        assert_eq!(table.positions(7), vec![0]);
    }
}
