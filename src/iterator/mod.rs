pub mod merge;

use crate::error::Result;
use crate::types::Record;

pub use merge::MergeIterator;

/// The central iteration abstraction for sorted record sources.
///
/// Segments and merged views implement this trait, which lets
/// [`MergeIterator`] combine any number of them for compaction.
pub trait StorageIterator {
    /// The record the iterator is positioned at, or `None` once exhausted.
    fn current(&self) -> Option<&Record>;

    /// Advances to the next record. Returns error on IO failure.
    fn next(&mut self) -> Result<()>;

    /// Returns true if the iterator is positioned at a valid record.
    fn is_valid(&self) -> bool {
        self.current().is_some()
    }
}
