//! Leveled compaction.
//!
//! A level holding more than `level_fanout` segments is merged one level
//! down: every segment of level L together with the segments of L+1 whose
//! key ranges overlap L's. Sources are fed to a [`MergeIterator`] newest
//! first (L before L+1, each level by id descending), so the newest record
//! per key survives. Tombstones are carried forward unless L+1 is the
//! bottom level, where nothing older can exist beneath them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::iterator::{MergeIterator, StorageIterator};
use crate::options::Options;
use crate::segment::{segment_path, Segment, SegmentBuilder, SegmentIterator};

/// One planned compaction: `sources` (all of `level`) merged with the
/// `overlapping` segments of `target_level`.
pub struct CompactionTask {
    pub level: usize,
    pub target_level: usize,
    /// Segments of `level`, newest first.
    pub sources: Vec<Arc<Segment>>,
    /// Segments of `target_level` overlapping the sources' key range, newest first.
    pub overlapping: Vec<Arc<Segment>>,
    /// Whether `target_level` is the bottom level (tombstones are dropped).
    pub bottom: bool,
}

impl CompactionTask {
    /// Number of input segments.
    pub fn input_count(&self) -> usize {
        self.sources.len() + self.overlapping.len()
    }
}

/// Pick the shallowest level above the bottom that exceeds the fan-out.
pub fn pick(levels: &[Vec<Arc<Segment>>], options: &Options) -> Option<CompactionTask> {
    let bottom = options.bottom_level();
    let level = (0..bottom).find(|&l| levels.get(l).is_some_and(|s| s.len() > options.level_fanout))?;
    let sources = levels[level].clone();

    let min_key = sources.iter().map(|s| s.meta().min_key.as_slice()).min()?;
    let max_key = sources.iter().map(|s| s.meta().max_key.as_slice()).max()?;

    let target_level = level + 1;
    let overlapping = levels
        .get(target_level)
        .map(|segments| {
            segments
                .iter()
                .filter(|s| s.meta().overlaps_range(min_key, max_key))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    Some(CompactionTask {
        level,
        target_level,
        sources,
        overlapping,
        bottom: target_level == bottom,
    })
}

/// Merge the task's inputs into new segments at the target level.
///
/// Outputs are durable when this returns. On error every output already
/// written is removed again, so a failed compaction leaves no trace.
pub fn execute(
    task: &CompactionTask,
    dir: &Path,
    clock: &Clock,
    options: &Options,
) -> Result<Vec<Arc<Segment>>> {
    let mut written = Vec::new();
    let result = merge_into_segments(task, dir, clock, options, &mut written);
    if result.is_err() {
        for path in &written {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial compaction output");
            }
        }
    }
    result
}

fn merge_into_segments(
    task: &CompactionTask,
    dir: &Path,
    clock: &Clock,
    options: &Options,
    written: &mut Vec<PathBuf>,
) -> Result<Vec<Arc<Segment>>> {
    let mut inputs: Vec<Box<dyn StorageIterator + Send>> = Vec::with_capacity(task.input_count());
    for segment in task.sources.iter().chain(&task.overlapping) {
        inputs.push(Box::new(SegmentIterator::new(Arc::clone(segment))?));
    }
    let mut merged = MergeIterator::new(inputs)?;

    let target_size = options.segment_target_size as u64;
    let level = task.target_level as u32;
    let mut outputs = Vec::new();
    let mut builder: Option<SegmentBuilder> = None;
    let mut dropped = 0u64;

    while let Some(record) = merged.current() {
        if task.bottom && record.entry.is_tombstone() {
            dropped += 1;
        } else {
            let mut current = match builder.take() {
                Some(b) => b,
                None => SegmentBuilder::new(dir, clock.tick(), level, options)?,
            };
            current.add(record)?;
            if current.estimated_size() >= target_size {
                outputs.push(finish_output(current, dir, written)?);
            } else {
                builder = Some(current);
            }
        }
        merged.next()?;
    }

    if let Some(last) = builder.take() {
        outputs.push(finish_output(last, dir, written)?);
    }

    if dropped > 0 {
        tracing::debug!(level, dropped, "dropped tombstones at bottom level");
    }
    Ok(outputs)
}

fn finish_output(builder: SegmentBuilder, dir: &Path, written: &mut Vec<PathBuf>) -> Result<Arc<Segment>> {
    let meta = builder.finish()?;
    let path = segment_path(dir, meta.id);
    written.push(path.clone());
    Ok(Arc::new(Segment::open(&path)?))
}
