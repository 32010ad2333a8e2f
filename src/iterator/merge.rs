use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bytes::Bytes;

use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::types::Record;

/// Merges multiple sorted iterators into a single sorted stream.
///
/// Sources are ordered by priority: index 0 is the newest. When several
/// sources hold the same key, only the record from the newest source is
/// yielded; the rest are skipped. Tombstones are yielded like any other
/// record so the caller decides whether they survive.
///
/// This is the same algorithm as external merge sort: a min-heap keyed by
/// (key, source index).
pub struct MergeIterator {
    iters: Vec<Box<dyn StorageIterator + Send>>,
    heap: BinaryHeap<HeapEntry>,
    current: Option<Record>,
}

struct HeapEntry {
    key: Bytes,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Reversed: BinaryHeap is a max-heap, we want the smallest key and,
    // among equal keys, the smallest (newest) source on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl MergeIterator {
    /// Create a MergeIterator from sorted sources, newest first.
    pub fn new(iters: Vec<Box<dyn StorageIterator + Send>>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(iters.len());
        for (source, iter) in iters.iter().enumerate() {
            if let Some(record) = iter.current() {
                heap.push(HeapEntry {
                    key: record.key.clone(),
                    source,
                });
            }
        }

        let mut merged = MergeIterator {
            iters,
            heap,
            current: None,
        };
        merged.advance()?;
        Ok(merged)
    }

    /// Pop the winning record for the smallest key and step every source
    /// positioned at that key past it.
    fn advance(&mut self) -> Result<()> {
        let Some(top) = self.heap.pop() else {
            self.current = None;
            return Ok(());
        };

        self.current = self.iters[top.source].current().cloned();
        self.step(top.source)?;

        while self.heap.peek().is_some_and(|next| next.key == top.key) {
            if let Some(shadowed) = self.heap.pop() {
                self.step(shadowed.source)?;
            }
        }
        Ok(())
    }

    fn step(&mut self, source: usize) -> Result<()> {
        let iter = &mut self.iters[source];
        iter.next()?;
        if let Some(record) = iter.current() {
            self.heap.push(HeapEntry {
                key: record.key.clone(),
                source,
            });
        }
        Ok(())
    }
}

impl StorageIterator for MergeIterator {
    fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }

    fn next(&mut self) -> Result<()> {
        self.advance()
    }
}
