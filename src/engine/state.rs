use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::memtable::MemTable;
use crate::segment::Segment;
use crate::types::Entry;

/// The set of tables a read consults, newest first.
///
/// Never mutated in place: writers clone it, edit the copy and swap the
/// `Arc` under the engine's state lock. A reader that cloned the `Arc`
/// keeps a consistent view (and keeps its segments alive) for as long as
/// it needs.
#[derive(Clone)]
pub struct LsmState {
    /// The only mutable table.
    pub active: Arc<MemTable>,
    /// Frozen tables awaiting flush, newest first.
    pub immutables: Vec<Arc<MemTable>>,
    /// `levels[0]` is the freshest level. Each level is ordered by
    /// segment id descending.
    pub levels: Vec<Vec<Arc<Segment>>>,
}

impl LsmState {
    pub fn new(active: Arc<MemTable>, max_levels: usize) -> Self {
        LsmState {
            active,
            immutables: Vec::new(),
            levels: vec![Vec::new(); max_levels],
        }
    }

    /// First definitive answer for `key`: active table, then immutable
    /// tables newest first, then segments level by level.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if let Some(entry) = self.active.get(key) {
            return Ok(Some(entry));
        }
        for table in &self.immutables {
            if let Some(entry) = table.get(key) {
                return Ok(Some(entry));
            }
        }
        for segment in self.levels.iter().flatten() {
            if let Some(entry) = segment.get(key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Drop a flushed table and publish its segment at the front of level 0.
    pub fn install_flush(&mut self, table: &Arc<MemTable>, segment: Arc<Segment>) {
        self.immutables.retain(|t| !Arc::ptr_eq(t, table));
        self.levels[0].insert(0, segment);
    }

    /// Replace compaction inputs with their outputs.
    pub fn install_compaction(
        &mut self,
        level: usize,
        sources: &[Arc<Segment>],
        overlapping: &[Arc<Segment>],
        outputs: Vec<Arc<Segment>>,
    ) {
        let target = level + 1;
        self.levels[level].retain(|s| !contains(sources, s));
        self.levels[target].retain(|s| !contains(overlapping, s));
        self.levels[target].extend(outputs);
        self.levels[target].sort_by(|a, b| b.id().cmp(&a.id()));
    }

    pub fn segments_per_level(&self) -> Vec<usize> {
        self.levels.iter().map(Vec::len).collect()
    }
}

/// Holder of the current [`LsmState`].
///
/// Readers take the lock only long enough to clone the `Arc`.
pub struct StateCell {
    current: RwLock<Arc<LsmState>>,
}

impl StateCell {
    pub fn new(state: LsmState) -> Self {
        StateCell {
            current: RwLock::new(Arc::new(state)),
        }
    }

    /// The current state. Stays consistent however long it is held.
    pub fn snapshot(&self) -> Arc<LsmState> {
        Arc::clone(&self.current.read())
    }

    /// Copy-on-write update, published atomically to readers.
    pub fn write_with<R>(&self, update: impl FnOnce(&mut LsmState) -> R) -> R {
        let mut current = self.current.write();
        let mut next = LsmState::clone(&current);
        let result = update(&mut next);
        *current = Arc::new(next);
        result
    }
}

fn contains(set: &[Arc<Segment>], segment: &Arc<Segment>) -> bool {
    set.iter().any(|s| Arc::ptr_eq(s, segment))
}
