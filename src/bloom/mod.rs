pub mod builder;

use bytes::{Buf, BufMut};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::{Error, Result};

pub use builder::BloomFilterBuilder;

/// Probabilistic data structure: "is this key in the set?"
///
/// - If any bit is 0 → key is DEFINITELY NOT in the set
/// - If all bits are 1 → key is PROBABLY in the set (false positive possible)
///
/// Each segment carries one so point lookups skip segments that cannot
/// hold the key without touching their data blocks.
///
/// Sizing:
///   bits_per_key = -1.44 * log2(false_positive_rate)
///   num_hashes = bits_per_key * ln(2)
///
/// Double hashing: h_i(key) = h1(key) + i * h2(key) (mod m), where h1 and
/// h2 are the two halves of one 128-bit xxh3 hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_hashes: u32,
    num_bits: u32,
}

/// Serialized header: num_hashes (4B) + num_bits (4B).
const HEADER_SIZE: usize = 8;

impl BloomFilter {
    /// Create a new bloom filter sized for expected_items at the given FPR.
    ///
    /// # Panics
    /// Panics if expected_items is 0 or FPR is not in (0, 1).
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "FPR must be in (0, 1)"
        );

        let bits_per_key = -1.44 * false_positive_rate.log2();

        let num_bits = ((expected_items as f64) * bits_per_key).ceil() as u32;
        let num_bits = num_bits.max(64);

        let num_hashes = (bits_per_key * 2.0f64.ln()).ceil() as u32;
        let num_hashes = num_hashes.max(1);

        let num_u64s = (num_bits as usize).div_ceil(64);

        Self {
            bits: vec![0u64; num_u64s],
            num_hashes,
            num_bits,
        }
    }

    /// Add a key to the bloom filter.
    pub fn insert(&mut self, key: &[u8]) {
        self.insert_hash(xxh3_128(key));
    }

    /// Add a key by its precomputed 128-bit hash.
    pub(crate) fn insert_hash(&mut self, hash: u128) {
        let (h1, h2) = split_hash(hash);
        for i in 0..self.num_hashes {
            let pos = self.get_position(h1, h2, i);
            self.set_bit(pos);
        }
    }

    /// Check if a key MIGHT be in the set.
    /// false → definitely not here. true → probably here.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = split_hash(xxh3_128(key));
        (0..self.num_hashes).all(|i| self.check_bit(self.get_position(h1, h2, i)))
    }

    /// Serialize the bloom filter: num_hashes, num_bits, then the bit array,
    /// all little-endian.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.bits.len() * 8);
        buf.put_u32_le(self.num_hashes);
        buf.put_u32_le(self.num_bits);
        for word in &self.bits {
            buf.put_u64_le(*word);
        }
        buf
    }

    /// Deserialize a bloom filter written by [`BloomFilter::serialize`].
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption("bloom filter too short".into()));
        }
        let mut buf = data;
        let num_hashes = buf.get_u32_le();
        let num_bits = buf.get_u32_le();

        if num_hashes == 0 || num_bits == 0 {
            return Err(Error::Corruption(format!(
                "bloom filter header invalid: {num_hashes} hashes, {num_bits} bits"
            )));
        }
        let num_u64s = (num_bits as usize).div_ceil(64);
        if buf.remaining() != num_u64s * 8 {
            return Err(Error::Corruption(format!(
                "bloom filter expects {} bytes of bits, found {}",
                num_u64s * 8,
                buf.remaining()
            )));
        }

        let bits = (0..num_u64s).map(|_| buf.get_u64_le()).collect();
        Ok(Self {
            bits,
            num_hashes,
            num_bits,
        })
    }

    /// Get the number of hash functions used.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Get the total number of bits in the filter.
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// h_i = (h1 + i * h2) mod num_bits
    fn get_position(&self, h1: u64, h2: u64, i: u32) -> u32 {
        let i = i as u64;
        (h1.wrapping_add(i.wrapping_mul(h2)) % (self.num_bits as u64)) as u32
    }

    fn set_bit(&mut self, pos: u32) {
        self.bits[(pos / 64) as usize] |= 1 << (pos % 64);
    }

    fn check_bit(&self, pos: u32) -> bool {
        (self.bits[(pos / 64) as usize] >> (pos % 64)) & 1 == 1
    }
}

/// Split a 128-bit hash into two 64-bit halves for double hashing.
fn split_hash(hash: u128) -> (u64, u64) {
    (hash as u64, (hash >> 64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basics() {
        let mut bf = BloomFilter::new(100, 0.01);
        bf.insert(b"hello");
        assert!(bf.may_contain(b"hello"));
        assert!(!bf.may_contain(b"world"));
    }

    #[test]
    fn serialized_filter_answers_identically() {
        let mut bf = BloomFilter::new(500, 0.01);
        for i in 0..500u32 {
            bf.insert(format!("key_{i}").as_bytes());
        }
        let restored = BloomFilter::deserialize(&bf.serialize()).unwrap();
        assert_eq!(restored, bf);
        for i in 0..500u32 {
            assert!(restored.may_contain(format!("key_{i}").as_bytes()));
        }
    }

    #[test]
    fn deserialize_rejects_wrong_length() {
        let mut data = BloomFilter::new(10, 0.01).serialize();
        data.pop();
        assert!(matches!(
            BloomFilter::deserialize(&data),
            Err(Error::Corruption(_))
        ));
    }
}
