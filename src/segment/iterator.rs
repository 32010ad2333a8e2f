use std::sync::Arc;

use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::segment::reader::Segment;
use crate::types::Record;

/// Full scan over a segment, one data block in memory at a time.
///
/// Owns an `Arc<Segment>`, so the segment file stays alive for as long as
/// the scan does.
pub struct SegmentIterator {
    segment: Arc<Segment>,
    next_block: usize,
    records: std::vec::IntoIter<Record>,
    current: Option<Record>,
}

impl SegmentIterator {
    /// Position at the first record of the segment.
    pub fn new(segment: Arc<Segment>) -> Result<Self> {
        let mut iter = SegmentIterator {
            segment,
            next_block: 0,
            records: Vec::new().into_iter(),
            current: None,
        };
        iter.advance()?;
        Ok(iter)
    }

    fn advance(&mut self) -> Result<()> {
        loop {
            if let Some(record) = self.records.next() {
                self.current = Some(record);
                return Ok(());
            }
            if self.next_block >= self.segment.block_count() {
                self.current = None;
                return Ok(());
            }
            let block = self.segment.read_block(self.next_block)?;
            self.next_block += 1;
            self.records = block.into_records().into_iter();
        }
    }
}

impl StorageIterator for SegmentIterator {
    fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }

    fn next(&mut self) -> Result<()> {
        self.advance()
    }
}
