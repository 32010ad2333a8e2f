use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::compaction::{self, CompactionTask};
use crate::engine::EngineInner;
use crate::error::{Error, Result};
use crate::memtable::MemTable;
use crate::segment::{segment_path, Segment, SegmentBuilder};
use crate::wal::writer::WALManager;

/// Completion channel for callers that wait on background work.
pub(crate) type Done = Sender<Result<()>>;

/// Work for the background thread.
pub(crate) enum Job {
    /// Write a frozen table to a level 0 segment, then delete its sealed WAL.
    Flush {
        table: Arc<MemTable>,
        wal: PathBuf,
        done: Option<Done>,
    },
    /// Compact until no level exceeds the fan-out.
    Compact(Done),
    /// Retry outstanding flushes and report once everything queued before
    /// it has completed.
    Barrier(Done),
    /// Finish outstanding flushes and exit.
    Shutdown,
}

/// A frozen table whose flush has not succeeded yet.
struct PendingFlush {
    table: Arc<MemTable>,
    wal: PathBuf,
}

/// The single background thread. Runs flushes in the order tables were
/// frozen, and compaction after each flush, so at most one of them is
/// ever in progress.
pub(crate) struct Worker {
    inner: Arc<EngineInner>,
    jobs: Receiver<Job>,
    /// Failed flushes, oldest first. A newer table is never flushed ahead
    /// of an older one, otherwise its segment could be shadowed by the
    /// older table's data once that lands in a newer segment.
    pending: VecDeque<PendingFlush>,
}

impl Worker {
    pub(crate) fn new(inner: Arc<EngineInner>, jobs: Receiver<Job>) -> Self {
        Worker {
            inner,
            jobs,
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn run(mut self) {
        tracing::debug!("background worker started");
        while let Ok(job) = self.jobs.recv() {
            match job {
                Job::Flush { table, wal, done } => {
                    self.pending.push_back(PendingFlush { table, wal });
                    let result = self.drain_pending().and_then(|()| self.compact_all());
                    report(done, result, "flush");
                }
                Job::Compact(done) => {
                    let result = self.drain_pending().and_then(|()| self.compact_all());
                    report(Some(done), result, "compaction");
                }
                Job::Barrier(done) => {
                    let result = self.drain_pending().and_then(|()| self.compact_all());
                    report(Some(done), result, "flush");
                }
                Job::Shutdown => {
                    if let Err(e) = self.drain_pending() {
                        tracing::error!(
                            error = %e,
                            unflushed = self.pending.len(),
                            "flush failed during shutdown, tables stay in their WALs"
                        );
                    }
                    break;
                }
            }
        }
        tracing::debug!("background worker stopped");
    }

    /// Flush pending tables oldest first, stopping at the first failure.
    fn drain_pending(&mut self) -> Result<()> {
        while let Some(next) = self.pending.front() {
            self.flush(&next.table, &next.wal)?;
            self.pending.pop_front();
        }
        Ok(())
    }

    /// Write `table` to a level 0 segment.
    ///
    /// Order matters for crash safety: the segment is durable before the
    /// sealed WAL is deleted, and readers switch from table to segment in
    /// one state swap after both.
    fn flush(&self, table: &Arc<MemTable>, wal: &Path) -> Result<()> {
        let inner = &self.inner;

        if table.is_empty() {
            WALManager::delete_wal(wal)?;
            inner.state.write_with(|state| state.immutables.retain(|t| !Arc::ptr_eq(t, table)));
            return Ok(());
        }

        let id = inner.clock.tick();
        let mut builder = SegmentBuilder::new(&inner.dir, id, 0, &inner.options)?;
        for record in table.iter() {
            builder.add(&record)?;
        }
        let meta = builder.finish()?;

        let path = segment_path(&inner.dir, id);
        let segment = match Segment::open(&path) {
            Ok(segment) => Arc::new(segment),
            Err(e) => {
                remove_orphan(&path);
                return Err(e);
            }
        };

        if let Err(e) = WALManager::delete_wal(wal) {
            // Once the log is unlinked the segment is the only durable copy.
            if wal.exists() {
                drop(segment);
                remove_orphan(&path);
                return Err(e);
            }
            tracing::warn!(
                wal = %wal.display(),
                error = %e,
                "sealed WAL removed but directory sync failed"
            );
        }

        inner.state.write_with(|state| state.install_flush(table, segment));
        tracing::info!(
            segment = id,
            entries = meta.entry_count,
            bytes = meta.file_size,
            "flushed memtable to level 0"
        );
        Ok(())
    }

    /// Compact until every level above the bottom is within the fan-out.
    fn compact_all(&self) -> Result<()> {
        loop {
            let task = {
                let state = self.inner.state.snapshot();
                compaction::pick(&state.levels, &self.inner.options)
            };
            match task {
                Some(task) => self.compact(task)?,
                None => return Ok(()),
            }
        }
    }

    fn compact(&self, task: CompactionTask) -> Result<()> {
        let inner = &self.inner;
        let outputs = compaction::execute(&task, &inner.dir, &inner.clock, &inner.options)?;
        let output_count = outputs.len();

        inner.state.write_with(|state| {
            state.install_compaction(task.level, &task.sources, &task.overlapping, outputs)
        });
        tracing::info!(
            level = task.level,
            target = task.target_level,
            inputs = task.input_count(),
            outputs = output_count,
            "compaction finished"
        );

        retire_inputs(task);
        Ok(())
    }
}

/// Delete compaction inputs: target level first, then the source level.
///
/// If a target-level input cannot be deleted the source inputs are kept on
/// disk: they hold the tombstones that shadow it after a restart.
fn retire_inputs(task: CompactionTask) {
    let CompactionTask {
        sources,
        overlapping,
        ..
    } = task;

    for segment in overlapping {
        let id = segment.id();
        if let Err(e) = Segment::retire(segment) {
            tracing::warn!(
                segment = id,
                error = %e,
                "failed to delete compacted segment, keeping its newer inputs"
            );
            return;
        }
    }
    for segment in sources {
        let id = segment.id();
        if let Err(e) = Segment::retire(segment) {
            tracing::warn!(segment = id, error = %e, "failed to delete compacted segment");
        }
    }
}

fn remove_orphan(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove unpublished segment");
    }
}

fn report(done: Option<Done>, result: Result<()>, what: &str) {
    match (done, result) {
        (Some(done), result) => {
            if let Err(e) = &result {
                tracing::error!(error = %e, "background {what} failed");
            }
            // The waiter may have given up; nothing to do then.
            let _ = done.send(result);
        }
        (None, Err(e)) => tracing::error!(error = %e, "background {what} failed"),
        (None, Ok(())) => {}
    }
}

/// Channel a caller waits on for one background job.
pub(crate) fn done_channel() -> (Done, Receiver<Result<()>>) {
    crossbeam_channel::bounded(1)
}

/// Block until the worker reports. A vanished worker means the engine is
/// shutting down.
pub(crate) fn wait(done: Receiver<Result<()>>) -> Result<()> {
    done.recv().map_err(|_| Error::Closed)?
}
