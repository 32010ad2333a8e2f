use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::types::{Entry, Record};

/// Size of the checksum trailer.
const CRC_SIZE: usize = 4;

/// Accumulates sorted records and serializes them into a data block.
///
/// On-disk layout of a block:
/// ```text
/// ┌───────────────────────────────────────────────┐
/// │ Record 0 (WAL encoding)                       │
/// │ Record 1 ...                                  │
/// │ Record N                                      │
/// ├───────────────────────────────────────────────┤
/// │ crc32 of the records above (4B LE)            │
/// └───────────────────────────────────────────────┘
/// ```
///
/// Blocks are small, so a lookup decodes the block front to back instead
/// of keeping an offset array.
pub struct BlockBuilder {
    data: Vec<u8>,
    entries: usize,
    block_size: usize,
}

impl BlockBuilder {
    /// Create a new block builder with target block size.
    pub fn new(block_size: usize) -> Self {
        BlockBuilder {
            data: Vec::with_capacity(block_size),
            entries: 0,
            block_size,
        }
    }

    /// Add a record to the block.
    /// Returns false if the block is full (record doesn't fit).
    /// The first record is always accepted even if it exceeds block_size.
    pub fn add(&mut self, record: &Record) -> bool {
        if self.entries > 0 && self.estimated_size() + record.encoded_size() > self.block_size {
            return false;
        }
        record.encode_into(&mut self.data);
        self.entries += 1;
        true
    }

    /// Finalize the block: append the checksum.
    pub fn build(self) -> Vec<u8> {
        let mut block = self.data;
        let crc = crc32fast::hash(&block);
        block.put_u32_le(crc);
        block
    }

    /// Current size of the block once built.
    pub fn estimated_size(&self) -> usize {
        self.data.len() + CRC_SIZE
    }

    /// Whether the block is empty (no records added).
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

/// A decoded, checksum-verified data block.
pub struct Block {
    records: Vec<Record>,
}

impl Block {
    /// Verify the checksum and decode every record.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < CRC_SIZE {
            return Err(Error::Corruption("block too short".into()));
        }
        let (body, mut trailer) = data.split_at(data.len() - CRC_SIZE);
        let stored = trailer.get_u32_le();
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(Error::Corruption(format!(
                "block checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        let mut records = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            let (record, consumed) = Record::decode(&body[offset..]).map_err(|e| match e {
                Error::Incomplete => Error::Corruption("record truncated inside block".into()),
                other => other,
            })?;
            records.push(record);
            offset += consumed;
        }
        Ok(Block { records })
    }

    /// Find `key` in the block. Records are sorted, so binary search.
    pub fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.records
            .binary_search_by(|r| r.key.as_ref().cmp(key))
            .ok()
            .map(|idx| &self.records[idx].entry)
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
