use bytes::{Buf, BufMut};

use crate::encoding::{get_length_prefixed, get_varint, put_length_prefixed, put_varint};
use crate::error::{Error, Result};

/// Magic number to identify segment files.
pub const SEGMENT_MAGIC: u64 = 0x4C534D5F53454700; // "LSM_SEG\0"

/// Metadata about a segment, stored in its meta block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Segment id: the clock tick it was created at. Larger is newer.
    pub id: u64,
    /// Level this segment belongs to (0 = freshly flushed).
    pub level: u32,
    /// Smallest key in the segment.
    pub min_key: Vec<u8>,
    /// Largest key in the segment.
    pub max_key: Vec<u8>,
    /// File size in bytes.
    pub file_size: u64,
    /// Number of records (tombstones included).
    pub entry_count: u64,
}

impl SegmentMeta {
    /// Whether `key` falls inside [min_key, max_key].
    pub fn may_contain_key(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }

    /// Whether the segment's key range intersects [min, max].
    pub fn overlaps_range(&self, min: &[u8], max: &[u8]) -> bool {
        self.min_key.as_slice() <= max && min <= self.max_key.as_slice()
    }

    /// Encode the meta block: id, level, entry count, min key, max key and
    /// the serialized bloom filter.
    /// Format: [id(v)][level(v)][entry_count(v)][min_key(lp)][max_key(lp)][bloom(lp)]
    pub fn encode(&self, bloom: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        put_varint(&mut buf, self.id);
        put_varint(&mut buf, self.level as u64);
        put_varint(&mut buf, self.entry_count);
        put_length_prefixed(&mut buf, &self.min_key);
        put_length_prefixed(&mut buf, &self.max_key);
        put_length_prefixed(&mut buf, bloom);
        buf
    }

    /// Decode a meta block, returning the meta and the raw bloom filter.
    /// `file_size` is not stored; the caller supplies it.
    pub fn decode(data: &[u8], file_size: u64) -> Result<(Self, Vec<u8>)> {
        let mut buf = data;
        let truncated = corrupt_if_incomplete("meta block truncated");

        let id = get_varint(&mut buf).map_err(truncated)?;
        let level = get_varint(&mut buf).map_err(truncated)?;
        let entry_count = get_varint(&mut buf).map_err(truncated)?;
        let min_key = get_length_prefixed(&mut buf).map_err(truncated)?;
        let max_key = get_length_prefixed(&mut buf).map_err(truncated)?;
        let bloom = get_length_prefixed(&mut buf).map_err(truncated)?;

        let level = u32::try_from(level)
            .map_err(|_| Error::Corruption(format!("meta block level out of range: {level}")))?;

        Ok((
            SegmentMeta {
                id,
                level,
                min_key,
                max_key,
                file_size,
                entry_count,
            },
            bloom,
        ))
    }
}

/// An entry in the segment's index block.
/// Maps a block's last key to its location in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Last (largest) key in the block.
    pub last_key: Vec<u8>,
    /// Byte offset of the block in the file.
    pub offset: u64,
    /// Size of the block in bytes.
    pub size: u64,
}

impl IndexEntry {
    /// Encode this index entry.
    /// Format: [key_len(v)][key][offset(v)][size(v)]
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        put_length_prefixed(buf, &self.last_key);
        put_varint(buf, self.offset);
        put_varint(buf, self.size);
    }

    /// Decode an index entry, advancing `buf`.
    pub fn decode(buf: &mut &[u8]) -> Result<Self> {
        let truncated = corrupt_if_incomplete("index entry truncated");
        let last_key = get_length_prefixed(buf).map_err(truncated)?;
        let offset = get_varint(buf).map_err(truncated)?;
        let size = get_varint(buf).map_err(truncated)?;
        Ok(IndexEntry {
            last_key,
            offset,
            size,
        })
    }

    /// Decode a whole index block.
    pub fn decode_all(data: &[u8]) -> Result<Vec<Self>> {
        let mut buf = data;
        let mut entries = Vec::new();
        while buf.has_remaining() {
            entries.push(Self::decode(&mut buf)?);
        }
        Ok(entries)
    }
}

/// Inside a fully written file, running out of bytes means corruption.
fn corrupt_if_incomplete(what: &'static str) -> impl Fn(Error) -> Error + Copy {
    move |e| match e {
        Error::Incomplete => Error::Corruption(what.into()),
        other => other,
    }
}

/// The footer sits at the end of the segment file.
/// It tells the reader where to find the index block and meta block.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Index block offset (8B)              │
/// │ Index block size (8B)                │
/// │ Meta block offset (8B)               │
/// │ Meta block size (8B)                 │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub index_block_offset: u64,
    pub index_block_size: u64,
    pub meta_block_offset: u64,
    pub meta_block_size: u64,
    pub magic: u64,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 8 * 5;

    pub fn new(index_block: (u64, u64), meta_block: (u64, u64)) -> Self {
        Footer {
            index_block_offset: index_block.0,
            index_block_size: index_block.1,
            meta_block_offset: meta_block.0,
            meta_block_size: meta_block.1,
            magic: SEGMENT_MAGIC,
        }
    }

    /// Encode footer to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.put_u64_le(self.index_block_offset);
        buf.put_u64_le(self.index_block_size);
        buf.put_u64_le(self.meta_block_offset);
        buf.put_u64_le(self.meta_block_size);
        buf.put_u64_le(self.magic);
        buf
    }

    /// Decode footer from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corruption("footer too short".into()));
        }
        let mut buf = data;
        let index_block_offset = buf.get_u64_le();
        let index_block_size = buf.get_u64_le();
        let meta_block_offset = buf.get_u64_le();
        let meta_block_size = buf.get_u64_le();
        let magic = buf.get_u64_le();

        if magic != SEGMENT_MAGIC {
            return Err(Error::Corruption(format!(
                "bad magic: expected {SEGMENT_MAGIC:#x}, got {magic:#x}"
            )));
        }

        Ok(Footer {
            index_block_offset,
            index_block_size,
            meta_block_offset,
            meta_block_size,
            magic,
        })
    }

    /// Check that the blocks the footer points at lie inside a file of
    /// `file_size` bytes.
    pub fn validate(&self, file_size: u64) -> Result<()> {
        let body = file_size.saturating_sub(Self::SIZE as u64);
        for (name, offset, size) in [
            ("index", self.index_block_offset, self.index_block_size),
            ("meta", self.meta_block_offset, self.meta_block_size),
        ] {
            let end = offset.checked_add(size);
            if end.is_none_or(|end| end > body) {
                return Err(Error::Corruption(format!(
                    "{name} block [{offset}, +{size}) outside file body of {body} bytes"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_roundtrip() {
        let footer = Footer::new((4096, 512), (3000, 1096));
        let encoded = footer.encode();
        assert_eq!(encoded.len(), Footer::SIZE);
        let decoded = Footer::decode(&encoded).unwrap();
        assert_eq!(decoded, footer);
    }

    #[test]
    fn footer_bad_magic() {
        let mut encoded = Footer::new((0, 0), (0, 0)).encode();
        encoded[32] = 0xFF;
        assert!(Footer::decode(&encoded).is_err());
    }

    #[test]
    fn footer_too_short() {
        assert!(Footer::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn footer_pointing_past_body_is_rejected() {
        let footer = Footer::new((100, 50), (0, 100));
        assert!(footer.validate(100 + Footer::SIZE as u64).is_err());
        assert!(footer.validate(150 + Footer::SIZE as u64).is_ok());
    }

    #[test]
    fn index_block_decodes_in_order() {
        let entries = vec![
            IndexEntry {
                last_key: b"cherry".to_vec(),
                offset: 0,
                size: 4096,
            },
            IndexEntry {
                last_key: b"melon".to_vec(),
                offset: 4096,
                size: 1200,
            },
        ];
        let mut buf = Vec::new();
        for e in &entries {
            e.encode_into(&mut buf);
        }
        assert_eq!(IndexEntry::decode_all(&buf).unwrap(), entries);

        buf.pop();
        assert!(matches!(
            IndexEntry::decode_all(&buf),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn meta_block_carries_level_and_bloom() {
        let meta = SegmentMeta {
            id: 77,
            level: 3,
            min_key: b"a".to_vec(),
            max_key: b"z".to_vec(),
            file_size: 999,
            entry_count: 26,
        };
        let encoded = meta.encode(b"bloom-bits");
        let (decoded, bloom) = SegmentMeta::decode(&encoded, 999).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(bloom, b"bloom-bits");
    }

    #[test]
    fn overlap_is_inclusive() {
        let meta = |min: &[u8], max: &[u8]| SegmentMeta {
            id: 0,
            level: 1,
            min_key: min.to_vec(),
            max_key: max.to_vec(),
            file_size: 0,
            entry_count: 0,
        };
        assert!(meta(b"a", b"c").overlaps_range(b"c", b"f"));
        assert!(!meta(b"a", b"c").overlaps_range(b"d", b"f"));
        assert!(meta(b"a", b"z").overlaps_range(b"m", b"n"));
        assert!(meta(b"m", b"n").overlaps_range(b"a", b"z"));
    }
}
