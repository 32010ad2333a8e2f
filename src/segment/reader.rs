use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::segment::block::Block;
use crate::segment::footer::{Footer, IndexEntry, SegmentMeta};
use crate::segment::parse_segment_name;
use crate::types::Entry;
use crate::wal::sync_dir;

/// An opened segment file. Supports point lookups and full scans.
///
/// On open:
/// 1. Read footer (last 40 bytes) → find index and meta block positions
/// 2. Read meta block → key range, level, bloom filter
/// 3. Read and parse index block → Vec<IndexEntry>
/// 4. Ready for queries (data blocks read on demand)
///
/// Segments are shared as `Arc<Segment>`. The file is deleted by
/// [`Segment::retire`] only once no other reference remains.
pub struct Segment {
    path: PathBuf,
    /// Seek + read must happen together, hence the mutex.
    file: Mutex<File>,
    index: Vec<IndexEntry>,
    meta: SegmentMeta,
    bloom: BloomFilter,
}

impl Segment {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < Footer::SIZE as u64 {
            return Err(Error::Corruption(format!(
                "{}: file too short to contain footer",
                path.display()
            )));
        }

        file.seek(SeekFrom::Start(file_size - Footer::SIZE as u64))?;
        let mut footer_buf = vec![0u8; Footer::SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;
        footer.validate(file_size)?;

        let meta_buf = read_at(&mut file, footer.meta_block_offset, footer.meta_block_size)?;
        let (mut meta, bloom) = SegmentMeta::decode(&meta_buf, file_size)?;
        let bloom = BloomFilter::deserialize(&bloom)?;

        // The filename is authoritative for recency.
        if let Some(id) = path.file_name().and_then(|n| n.to_str()).and_then(parse_segment_name) {
            meta.id = id;
        }

        let index_buf = read_at(&mut file, footer.index_block_offset, footer.index_block_size)?;
        let index = IndexEntry::decode_all(&index_buf)?;

        Ok(Segment {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index,
            meta,
            bloom,
        })
    }

    /// Point lookup.
    ///
    /// Algorithm:
    /// 1. Key outside [min_key, max_key] → None
    /// 2. Bloom filter says definitely absent → None
    /// 3. Binary search index → the only block that can hold the key
    /// 4. Read that block, verify its checksum, search it
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if !self.meta.may_contain_key(key) || !self.bloom.may_contain(key) {
            return Ok(None);
        }

        // Index is sorted by last_key: the first block with last_key >= key.
        let block_idx = self
            .index
            .partition_point(|entry| entry.last_key.as_slice() < key);
        if block_idx >= self.index.len() {
            return Ok(None);
        }

        let block = self.read_block(block_idx)?;
        tracing::trace!(segment = self.meta.id, block = block_idx, "segment block read");
        Ok(block.get(key).cloned())
    }

    /// Read and decode data block `idx`.
    pub fn read_block(&self, idx: usize) -> Result<Block> {
        let entry = &self.index[idx];
        let data = {
            let mut file = self.file.lock();
            read_at(&mut file, entry.offset, entry.size)?
        };
        Block::decode(&data).map_err(|e| match e {
            Error::Corruption(msg) => {
                Error::Corruption(format!("{} block {idx}: {msg}", self.path.display()))
            }
            other => other,
        })
    }

    /// Number of data blocks.
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn id(&self) -> u64 {
        self.meta.id
    }

    pub fn level(&self) -> u32 {
        self.meta.level
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the segment's file once every other reference is gone.
    ///
    /// Blocks the calling (background) thread while readers or iterators
    /// still hold the segment.
    pub fn retire(segment: Arc<Segment>) -> Result<()> {
        let started = Instant::now();
        let mut segment = segment;
        let mut warned = false;
        let segment = loop {
            match Arc::try_unwrap(segment) {
                Ok(segment) => break segment,
                Err(shared) => {
                    if !warned && started.elapsed() > Duration::from_secs(5) {
                        tracing::warn!(
                            segment = shared.id(),
                            refs = Arc::strong_count(&shared),
                            "obsolete segment still referenced, waiting to delete"
                        );
                        warned = true;
                    }
                    segment = shared;
                    thread::sleep(Duration::from_millis(1));
                }
            }
        };

        let Segment { path, file, .. } = segment;
        drop(file);
        fs::remove_file(&path)?;
        if let Some(dir) = path.parent() {
            sync_dir(dir)?;
        }
        tracing::debug!(path = %path.display(), "deleted obsolete segment");
        Ok(())
    }
}

fn read_at(file: &mut File, offset: u64, size: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; size as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
