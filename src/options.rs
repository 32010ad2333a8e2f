use crate::error::{Error, Result};

/// Engine configuration.
///
/// Sizes are approximate: the memtable limit counts key and value bytes
/// plus per-entry overhead, not allocator usage.
#[derive(Debug, Clone)]
pub struct Options {
    /// Freeze the active memtable once it holds at least this many bytes.
    pub memtable_size_limit: usize,
    /// Capacity of the flush queue. Freezes block while it is full.
    pub max_immutable_tables: usize,
    /// A level holding more segments than this is compacted one level down.
    pub level_fanout: usize,
    /// Number of levels. The last one is the bottom level, where
    /// tombstones are dropped.
    pub max_levels: usize,
    /// Target size of a data block inside a segment.
    pub block_size: usize,
    /// Compaction output is split into segments of roughly this size.
    pub segment_target_size: usize,
    /// Per-segment bloom filter false positive rate.
    pub bloom_false_positive_rate: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            memtable_size_limit: 4 * 1024 * 1024,
            max_immutable_tables: 4,
            level_fanout: 10,
            max_levels: 7,
            block_size: 4096,
            segment_target_size: 2 * 1024 * 1024,
            bloom_false_positive_rate: 0.01,
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(Error::Config("memtable_size_limit must be > 0".into()));
        }
        if self.max_immutable_tables == 0 {
            return Err(Error::Config("max_immutable_tables must be > 0".into()));
        }
        if self.level_fanout < 1 {
            return Err(Error::Config("level_fanout must be >= 1".into()));
        }
        if self.max_levels < 2 {
            return Err(Error::Config(format!(
                "max_levels must be >= 2, got {}",
                self.max_levels
            )));
        }
        if self.block_size < 64 {
            return Err(Error::Config(format!(
                "block_size must be >= 64, got {}",
                self.block_size
            )));
        }
        if self.segment_target_size < self.block_size {
            return Err(Error::Config(format!(
                "segment_target_size ({}) must be >= block_size ({})",
                self.segment_target_size, self.block_size
            )));
        }
        if !(self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0) {
            return Err(Error::Config(format!(
                "bloom_false_positive_rate must be in (0, 1), got {}",
                self.bloom_false_positive_rate
            )));
        }
        Ok(())
    }

    /// Index of the bottom level.
    pub fn bottom_level(&self) -> usize {
        self.max_levels - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Options::default().validate().unwrap();
    }

    #[test]
    fn rejects_single_level() {
        let opts = Options {
            max_levels: 1,
            ..Options::default()
        };
        assert!(matches!(opts.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_bad_fpr() {
        let opts = Options {
            bloom_false_positive_rate: 1.0,
            ..Options::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn rejects_segment_smaller_than_block() {
        let opts = Options {
            block_size: 8192,
            segment_target_size: 4096,
            ..Options::default()
        };
        assert!(opts.validate().is_err());
    }
}
