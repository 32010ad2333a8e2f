use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};
use crate::memtable::MemTable;
use crate::types::Record;

/// Reads WAL records from a file for crash recovery.
///
/// Loads the entire file into memory, then decodes record by record.
/// A record cut short at the end of the file was in flight when the
/// process stopped and was never acknowledged: it is dropped. A record
/// that fails to decode for any other reason is corruption.
pub struct WALReader {
    data: Vec<u8>,
}

/// Outcome of replaying one WAL into a memtable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Replay {
    /// Records applied.
    pub records: usize,
    /// Length of the decodable prefix. Anything past it is a torn tail.
    pub valid_len: u64,
    /// Bytes of torn tail that were dropped.
    pub dropped_bytes: u64,
    /// Largest record timestamp seen (0 for an empty log).
    pub max_timestamp: u64,
}

impl WALReader {
    /// Open a WAL file for reading. A missing file reads as empty.
    pub fn new(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(WALReader { data })
    }

    /// Iterate over the records in the log.
    pub fn iter(&self) -> WALIterator<'_> {
        WALIterator {
            data: &self.data,
            offset: 0,
            done: false,
        }
    }

    /// Apply every record to `table` in log order.
    ///
    /// Fails with [`Error::Corruption`] if a malformed record is found
    /// before the end of the log; `table` may then hold a partial replay
    /// and must be discarded.
    pub fn replay_into(&self, table: &MemTable) -> Result<Replay> {
        let mut iter = self.iter();
        let mut replay = Replay::default();

        for record in iter.by_ref() {
            let record = record?;
            replay.max_timestamp = replay.max_timestamp.max(record.timestamp);
            table.apply(record);
            replay.records += 1;
        }

        replay.valid_len = iter.offset() as u64;
        replay.dropped_bytes = self.data.len() as u64 - replay.valid_len;
        Ok(replay)
    }

    /// Bytes from `offset` to the end of the log.
    pub fn tail(&self, offset: u64) -> &[u8] {
        let start = usize::try_from(offset).map_or(self.data.len(), |o| o.min(self.data.len()));
        &self.data[start..]
    }

    /// Size of the log in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Iterator over WAL records.
///
/// Ends quietly at EOF or at a torn tail record. Yields one
/// `Err(Corruption)` and then ends if a record is malformed.
pub struct WALIterator<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl WALIterator<'_> {
    /// Byte offset just past the last record yielded.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for WALIterator<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.data.len() {
            return None;
        }

        match Record::decode(&self.data[self.offset..]) {
            Ok((record, consumed)) => {
                self.offset += consumed;
                Some(Ok(record))
            }
            Err(Error::Incomplete) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(Error::Corruption(format!(
                    "malformed WAL record at offset {}: {e}",
                    self.offset
                ))))
            }
        }
    }
}
