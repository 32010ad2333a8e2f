use xxhash_rust::xxh3::xxh3_128;

use crate::bloom::BloomFilter;

/// Builds a bloom filter while a segment is being written.
///
/// The final key count is only known once the segment is finished
/// (compaction output size depends on how many keys survive the merge),
/// so key hashes are buffered and the filter is sized in `build()`.
pub struct BloomFilterBuilder {
    hashes: Vec<u128>,
    false_positive_rate: f64,
}

impl BloomFilterBuilder {
    pub fn new(false_positive_rate: f64) -> Self {
        BloomFilterBuilder {
            hashes: Vec::new(),
            false_positive_rate,
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.hashes.push(xxh3_128(key));
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Size the filter for the keys seen and insert them.
    pub fn build(&self) -> BloomFilter {
        let mut filter = BloomFilter::new(self.hashes.len().max(1), self.false_positive_rate);
        for hash in &self.hashes {
            filter.insert_hash(*hash);
        }
        filter
    }
}
