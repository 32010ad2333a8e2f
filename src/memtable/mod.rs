pub mod skiplist;

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::types::{Entry, Record};
use skiplist::SkipList;

/// In-memory sorted buffer for writes. Wraps a SkipList behind a
/// reader/writer lock: many concurrent readers, one writer per mutation.
///
/// Every write goes here after the WAL. When the size reaches the limit
/// the engine freezes the table (it becomes immutable) and a background
/// worker flushes it to a segment.
///
/// Deletes are tombstones. You can't just remove the key because older
/// versions may exist in immutable tables or segments on disk.
pub struct MemTable {
    data: RwLock<SkipList>,
    size_limit: usize,
}

impl MemTable {
    /// Create a new empty memtable with given size limit.
    pub fn new(size_limit: usize) -> Self {
        MemTable {
            data: RwLock::new(SkipList::new()),
            size_limit,
        }
    }

    /// Unconditional upsert; clears any tombstone for the key.
    pub fn set(&self, timestamp: u64, key: Bytes, value: Bytes) {
        self.apply(Record::set(timestamp, key, value));
    }

    /// Mark a key as deleted by writing a tombstone.
    pub fn delete(&self, timestamp: u64, key: Bytes) {
        self.apply(Record::delete(timestamp, key));
    }

    /// Apply a set or delete record.
    pub fn apply(&self, record: Record) {
        self.data.write().insert(record);
    }

    /// Look up a key.
    ///
    /// `None`: this table knows nothing about the key.
    /// `Some(Entry::Tombstone)`: the key was deleted here.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.data.read().get(key).map(|r| r.entry.clone())
    }

    /// Number of distinct keys held (tombstones count).
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Current memory usage in bytes.
    pub fn size(&self) -> usize {
        self.data.read().size_bytes()
    }

    /// Check if memtable has reached the flush threshold.
    pub fn is_full(&self) -> bool {
        self.size() >= self.size_limit
    }

    /// Sorted iterator over all records (tombstones included).
    ///
    /// Holds the read lock until dropped, so only use it on a frozen table
    /// or for short scans: writers to this table wait meanwhile.
    pub fn iter(&self) -> MemTableIter<'_> {
        let guard = self.data.read();
        let current = guard.first_index();
        MemTableIter { guard, current }
    }
}

/// Sorted iterator over a memtable's records. See [`MemTable::iter`].
pub struct MemTableIter<'a> {
    guard: RwLockReadGuard<'a, SkipList>,
    current: Option<usize>,
}

impl Iterator for MemTableIter<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let idx = self.current?;
        self.current = self.guard.next_index(idx);
        Some(self.guard.record_at(idx).clone())
    }
}
