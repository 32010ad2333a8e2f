use rand::Rng;

use crate::types::{Entry, Record};

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Fixed per-entry overhead counted by [`SkipList::size_bytes`]:
/// timestamp, entry tag and the record's Bytes headers.
const ENTRY_OVERHEAD: usize = 48;

/// A single node in the skip list.
///
/// Each node has `height` forward pointers. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
///
/// Pointers are indices into the `SkipList::nodes` arena: no unsafe, good
/// cache locality, and nodes are never removed (deletes are tombstones).
struct SkipNode {
    record: Record,
    forward: Vec<Option<usize>>,
}

/// A probabilistic sorted map from key to the newest [`Record`] for it.
///
/// Average case: O(log n) insert, O(log n) lookup, O(n) iteration.
/// Inserting an existing key replaces its record in place.
pub struct SkipList {
    nodes: Vec<SkipNode>,
    /// Forward pointers of the head sentinel.
    head: [Option<usize>; MAX_HEIGHT],
    /// Current max level in use.
    height: usize,
    len: usize,
    size_bytes: usize,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    /// Create a new empty skip list.
    pub fn new() -> Self {
        SkipList {
            nodes: Vec::new(),
            head: [None; MAX_HEIGHT],
            height: 1,
            len: 0,
            size_bytes: 0,
        }
    }

    /// Insert a record. Overwrites the record if the key already exists.
    ///
    /// Algorithm:
    ///   1. Find the insertion point at each level (track predecessors)
    ///   2. Generate a random height for the new node
    ///   3. Splice into the list at each level up to the node's height
    pub fn insert(&mut self, record: Record) {
        let preds = self.find_predecessors(&record.key);

        if let Some(next) = self.forward(preds[0], 0) {
            let node = &mut self.nodes[next];
            if node.record.key == record.key {
                self.size_bytes -= payload_size(&node.record);
                self.size_bytes += payload_size(&record);
                node.record = record;
                return;
            }
        }

        let height = random_height();
        if height > self.height {
            // preds above the old height are already None (the head).
            self.height = height;
        }

        let idx = self.nodes.len();
        let forward = (0..height).map(|level| self.forward(preds[level], level)).collect();
        self.size_bytes += payload_size(&record) + height * std::mem::size_of::<usize>();
        self.nodes.push(SkipNode { record, forward });

        for (level, pred) in preds.iter().enumerate().take(height) {
            self.set_forward(*pred, level, Some(idx));
        }
        self.len += 1;
    }

    /// Look up a key.
    pub fn get(&self, key: &[u8]) -> Option<&Record> {
        let preds = self.find_predecessors(key);
        let candidate = self.forward(preds[0], 0)?;
        let record = &self.nodes[candidate].record;
        (record.key.as_ref() == key).then_some(record)
    }

    /// Number of distinct keys (tombstones included).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate memory usage in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Iterate over all records in ascending key order.
    pub fn iter(&self) -> SkipListIterator<'_> {
        SkipListIterator {
            list: self,
            current: self.first_index(),
        }
    }

    pub(crate) fn first_index(&self) -> Option<usize> {
        self.head[0]
    }

    pub(crate) fn next_index(&self, idx: usize) -> Option<usize> {
        self.nodes[idx].forward[0]
    }

    pub(crate) fn record_at(&self, idx: usize) -> &Record {
        &self.nodes[idx].record
    }

    /// For every level, the last node whose key is < `key` (None = head).
    fn find_predecessors(&self, key: &[u8]) -> [Option<usize>; MAX_HEIGHT] {
        let mut preds = [None; MAX_HEIGHT];
        let mut current = None;
        for level in (0..self.height).rev() {
            while let Some(next) = self.forward(current, level) {
                if self.nodes[next].record.key.as_ref() < key {
                    current = Some(next);
                } else {
                    break;
                }
            }
            preds[level] = current;
        }
        preds
    }

    fn forward(&self, at: Option<usize>, level: usize) -> Option<usize> {
        match at {
            None => self.head[level],
            Some(idx) => self.nodes[idx].forward[level],
        }
    }

    fn set_forward(&mut self, at: Option<usize>, level: usize, to: Option<usize>) {
        match at {
            None => self.head[level] = to,
            Some(idx) => self.nodes[idx].forward[level] = to,
        }
    }
}

/// Each level has a 1/4 probability (LevelDB uses 1/4, not 1/2).
fn random_height() -> usize {
    let mut rng = rand::thread_rng();
    let mut height = 1;
    while height < MAX_HEIGHT && rng.gen_ratio(1, 4) {
        height += 1;
    }
    height
}

fn payload_size(record: &Record) -> usize {
    let value_len = match &record.entry {
        Entry::Value(v) => v.len(),
        Entry::Tombstone => 0,
    };
    record.key.len() + value_len + ENTRY_OVERHEAD
}

/// Iterator over skip list records in sorted order.
///
/// Simply follows level 0 forward pointers: level 0 is a sorted linked
/// list containing every entry.
pub struct SkipListIterator<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

impl<'a> Iterator for SkipListIterator<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        self.current = self.list.next_index(idx);
        Some(self.list.record_at(idx))
    }
}
