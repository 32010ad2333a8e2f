use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::bloom::BloomFilterBuilder;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::segment::block::BlockBuilder;
use crate::segment::footer::{Footer, IndexEntry, SegmentMeta};
use crate::segment::{segment_path, temp_path};
use crate::types::Record;
use crate::wal::sync_dir;

/// Builds a segment file from a sorted stream of records.
///
/// Used during:
/// - Memtable flush (sorted memtable → level 0 segment)
/// - Compaction (merged segments → segments one level down)
///
/// Build process:
/// 1. Add records one by one (strictly ascending keys)
/// 2. Records fill up blocks; when a block is full it's written out
/// 3. finish() writes the last block, meta, index, footer, fsyncs, and
///    renames the temporary file into place
///
/// A builder dropped without `finish()` removes its temporary file, so a
/// segment only ever appears under its final name complete and durable.
pub struct SegmentBuilder {
    /// Current block being filled with records.
    block_builder: BlockBuilder,
    /// Index entries: one per flushed data block.
    index_entries: Vec<IndexEntry>,
    /// Tracks current write position in the file.
    data_offset: u64,
    writer: BufWriter<File>,
    dir: PathBuf,
    tmp_path: PathBuf,
    id: u64,
    level: u32,
    block_size: usize,
    bloom: BloomFilterBuilder,
    min_key: Option<Vec<u8>>,
    /// Last key added (also the last key of the current block).
    last_key: Option<Vec<u8>>,
    entry_count: u64,
    finished: bool,
}

impl SegmentBuilder {
    /// Start writing segment `id` at `level` in `dir`.
    pub fn new(dir: &Path, id: u64, level: u32, options: &Options) -> Result<Self> {
        let tmp_path = temp_path(dir, id);
        let file = File::create(&tmp_path)?;
        Ok(SegmentBuilder {
            block_builder: BlockBuilder::new(options.block_size),
            index_entries: Vec::new(),
            data_offset: 0,
            writer: BufWriter::new(file),
            dir: dir.to_path_buf(),
            tmp_path,
            id,
            level,
            block_size: options.block_size,
            bloom: BloomFilterBuilder::new(options.bloom_false_positive_rate),
            min_key: None,
            last_key: None,
            entry_count: 0,
            finished: false,
        })
    }

    /// Add a record. Keys MUST be strictly ascending.
    pub fn add(&mut self, record: &Record) -> Result<()> {
        if let Some(last) = &self.last_key {
            if record.key.as_ref() <= last.as_slice() {
                return Err(Error::Corruption(format!(
                    "segment {} keys out of order: {:?} after {:?}",
                    self.id, record.key, last
                )));
            }
        }

        if !self.block_builder.add(record) {
            // Block is full: flush it, then add to a fresh block
            self.flush_block()?;
            self.block_builder.add(record);
        }

        if self.min_key.is_none() {
            self.min_key = Some(record.key.to_vec());
        }
        self.last_key = Some(record.key.to_vec());
        self.bloom.add_key(&record.key);
        self.entry_count += 1;
        Ok(())
    }

    /// Approximate size of the file so far.
    pub fn estimated_size(&self) -> u64 {
        self.data_offset + self.block_builder.estimated_size() as u64
    }

    /// Write the current block and record an index entry for it.
    fn flush_block(&mut self) -> Result<()> {
        if self.block_builder.is_empty() {
            return Ok(());
        }

        let old_builder = std::mem::replace(
            &mut self.block_builder,
            BlockBuilder::new(self.block_size),
        );
        let block_data = old_builder.build();
        let block_size = block_data.len() as u64;

        self.writer.write_all(&block_data)?;

        self.index_entries.push(IndexEntry {
            last_key: self.last_key.clone().unwrap_or_default(),
            offset: self.data_offset,
            size: block_size,
        });

        self.data_offset += block_size;
        Ok(())
    }

    /// Finalize the segment and make it durable under its final name.
    pub fn finish(mut self) -> Result<SegmentMeta> {
        // 1. Last data block
        self.flush_block()?;

        // 2. Meta block (key range, level, bloom filter)
        let bloom = self.bloom.build();
        let mut meta = SegmentMeta {
            id: self.id,
            level: self.level,
            min_key: self.min_key.take().unwrap_or_default(),
            max_key: self.last_key.take().unwrap_or_default(),
            file_size: 0,
            entry_count: self.entry_count,
        };
        let meta_block = meta.encode(&bloom.serialize());
        let meta_block_offset = self.data_offset;
        self.writer.write_all(&meta_block)?;

        // 3. Index block
        let index_block_offset = meta_block_offset + meta_block.len() as u64;
        let mut index_block = Vec::new();
        for entry in &self.index_entries {
            entry.encode_into(&mut index_block);
        }
        self.writer.write_all(&index_block)?;

        // 4. Footer
        let footer = Footer::new(
            (index_block_offset, index_block.len() as u64),
            (meta_block_offset, meta_block.len() as u64),
        );
        self.writer.write_all(&footer.encode())?;

        // 5. Flush buffer + fsync, then publish under the final name
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.tmp_path, segment_path(&self.dir, self.id))?;
        self.finished = true;
        sync_dir(&self.dir)?;

        meta.file_size = index_block_offset + index_block.len() as u64 + Footer::SIZE as u64;
        Ok(meta)
    }
}

impl Drop for SegmentBuilder {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                tracing::warn!(
                    path = %self.tmp_path.display(),
                    error = %e,
                    "failed to remove abandoned segment file"
                );
            }
        }
    }
}
