//! The storage engine: write path, read path, recovery and lifecycle.
//!
//! Locking:
//! - `wal` is the exclusive write section. A set/delete holds it across the
//!   WAL append and the memtable update, and a freeze holds it across the
//!   WAL rotation and the active table swap, so WAL order always equals
//!   apply order and no writer sees zero or two active tables.
//! - `state` is only held long enough to clone or swap an `Arc`.
//!
//! The background worker never takes the `wal` lock, so a writer blocked
//! on a full job queue while holding it cannot deadlock.

pub mod state;
mod worker;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::memtable::MemTable;
use crate::options::Options;
use crate::segment::{self, Segment};
use crate::types::{Entry, Record};
use crate::wal::{self, Replay, WALReader, writer::WALManager};
use state::{LsmState, StateCell};
use worker::{Done, Job, Worker};

/// Shared between the engine handle and the background worker.
pub(crate) struct EngineInner {
    pub(crate) dir: PathBuf,
    pub(crate) options: Options,
    pub(crate) state: StateCell,
    pub(crate) clock: Clock,
    wal: Mutex<WALManager>,
    closed: AtomicBool,
}

/// Point-in-time counters, see [`Engine::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Keys held by the active memtable (tombstones count).
    pub active_entries: usize,
    /// Approximate bytes held by the active memtable.
    pub active_bytes: usize,
    /// Frozen tables not yet flushed.
    pub immutable_tables: usize,
    /// Segment count of each level, level 0 first.
    pub segments_per_level: Vec<usize>,
}

/// An embedded LSM key-value store rooted at one directory.
///
/// All methods take `&self`; share the engine across threads with `Arc`.
pub struct Engine {
    inner: Arc<EngineInner>,
    jobs: Sender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Open (or create) the store in `dir` and recover its contents.
    ///
    /// Recovery:
    /// 1. Remove half-written segments.
    /// 2. Load every segment into its stored level.
    /// 3. Replay sealed WALs oldest first into immutable tables; they are
    ///    queued for flush once the worker runs.
    /// 4. Replay `wal.log` into the active table, cutting off a torn tail.
    ///
    /// A dropped tail is first copied to `wal-<id>.torn` next to the logs.
    ///
    /// Fails with [`Error::Corruption`] if a WAL holds a malformed record
    /// before its end or a segment cannot be read.
    pub fn open(dir: impl AsRef<Path>, options: Options) -> Result<Engine> {
        options.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        segment::remove_temp_files(&dir)?;

        let clock = Clock::new();
        let levels = load_segments(&dir, &options, &clock)?;
        let mut state = LsmState::new(
            Arc::new(MemTable::new(options.memtable_size_limit)),
            options.max_levels,
        );
        state.levels = levels;

        let sealed = wal::list_sealed(&dir)?;
        let next_seq = sealed.last().map_or(0, |(seq, _)| seq + 1);
        let mut recovered_records = 0;
        let mut unflushed = Vec::new();
        for (_, path) in sealed {
            let table = Arc::new(MemTable::new(options.memtable_size_limit));
            let replay = replay_wal(&dir, &path, &table, &clock)?;
            recovered_records += replay.records;

            if table.is_empty() {
                WALManager::delete_wal(&path)?;
                continue;
            }
            state.immutables.insert(0, Arc::clone(&table));
            unflushed.push((table, path));
        }

        let replay = replay_wal(&dir, &wal::active_path(&dir), &state.active, &clock)?;
        recovered_records += replay.records;

        let mut wal = WALManager::new(&dir, next_seq)?;
        if replay.dropped_bytes > 0 {
            wal.active().truncate(replay.valid_len)?;
        }

        let segments_per_level = state.segments_per_level();
        let inner = Arc::new(EngineInner {
            dir,
            state: StateCell::new(state),
            clock,
            wal: Mutex::new(wal),
            closed: AtomicBool::new(false),
            options,
        });

        let (jobs, queue) = crossbeam_channel::bounded(inner.options.max_immutable_tables);
        let worker = Worker::new(Arc::clone(&inner), queue);
        let handle = thread::Builder::new()
            .name("lsm-worker".into())
            .spawn(move || worker.run())?;

        let engine = Engine {
            inner,
            jobs,
            worker: Mutex::new(Some(handle)),
        };

        for (table, wal) in unflushed {
            engine
                .jobs
                .send(Job::Flush {
                    table,
                    wal,
                    done: None,
                })
                .map_err(|_| Error::Closed)?;
        }

        tracing::info!(
            dir = %engine.inner.dir.display(),
            recovered_records,
            ?segments_per_level,
            "engine opened"
        );
        Ok(engine)
    }

    /// Latest value of `key`, or `None` if it was never set or is deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.check_open()?;
        let state = self.inner.state.snapshot();
        Ok(state.get(key)?.and_then(Entry::into_value))
    }

    /// Durably set `key` to `value`.
    pub fn set(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<()> {
        self.write(|timestamp| Record::set(timestamp, key, value))
    }

    /// Durably delete `key`.
    pub fn delete(&self, key: impl Into<Bytes>) -> Result<()> {
        self.write(|timestamp| Record::delete(timestamp, key))
    }

    /// Append to the WAL, then apply to the active table, in one exclusive
    /// section. The record is durable before it becomes visible.
    fn write(&self, make: impl FnOnce(u64) -> Record) -> Result<()> {
        let mut wal = self.inner.wal.lock();
        self.check_open()?;

        let record = make(self.inner.clock.tick());
        wal.append(&record)?;

        let active = Arc::clone(&self.inner.state.snapshot().active);
        active.apply(record);

        if active.is_full() {
            // The write is already durable and visible; a failed freeze is
            // retried by the next write.
            if let Err(e) = self.freeze(&mut wal, None) {
                tracing::warn!(error = %e, "failed to freeze full memtable");
            }
        }
        Ok(())
    }

    /// Seal the WAL, swap in a fresh active table and queue the old one
    /// for flush. Caller holds the `wal` lock.
    fn freeze(&self, wal: &mut WALManager, done: Option<Done>) -> Result<()> {
        self.wait_for_flush_capacity()?;
        let sealed = wal.rotate()?;
        let limit = self.inner.options.memtable_size_limit;
        let table = self.inner.state.write_with(|state| {
            let frozen = std::mem::replace(&mut state.active, Arc::new(MemTable::new(limit)));
            state.immutables.insert(0, Arc::clone(&frozen));
            frozen
        });

        tracing::info!(
            entries = table.len(),
            bytes = table.size(),
            wal = %sealed.display(),
            "froze memtable"
        );
        self.jobs
            .send(Job::Flush {
                table,
                wal: sealed,
                done,
            })
            .map_err(|_| Error::Closed)
    }

    /// Block until there is room for another immutable table. If the
    /// queued flushes fail the freeze is refused, so frozen tables never
    /// pile up past `max_immutable_tables` while the disk misbehaves.
    fn wait_for_flush_capacity(&self) -> Result<()> {
        let limit = self.inner.options.max_immutable_tables;
        let queued = self.inner.state.snapshot().immutables.len();
        if queued < limit {
            return Ok(());
        }

        tracing::debug!(queued, limit, "immutable tables at capacity, waiting for flushes");
        let (done, finished) = worker::done_channel();
        self.send(Job::Barrier(done))?;
        worker::wait(finished)
    }

    /// Freeze the active table even below its size limit and wait until
    /// it, and every table frozen before it, is in a segment.
    pub fn flush(&self) -> Result<()> {
        let (done, finished) = worker::done_channel();
        {
            let mut wal = self.inner.wal.lock();
            self.check_open()?;
            if self.inner.state.snapshot().active.is_empty() {
                self.send(Job::Barrier(done))?;
            } else {
                self.freeze(&mut wal, Some(done))?;
            }
        }
        worker::wait(finished)
    }

    /// Compact until no level above the bottom exceeds the fan-out, and
    /// wait for it.
    pub fn compact(&self) -> Result<()> {
        let (done, finished) = worker::done_channel();
        {
            // Under the write section so the job cannot land behind shutdown.
            let _wal = self.inner.wal.lock();
            self.check_open()?;
            self.send(Job::Compact(done))?;
        }
        worker::wait(finished)
    }

    pub fn stats(&self) -> Result<Stats> {
        self.check_open()?;
        let state = self.inner.state.snapshot();
        Ok(Stats {
            active_entries: state.active.len(),
            active_bytes: state.active.size(),
            immutable_tables: state.immutables.len(),
            segments_per_level: state.segments_per_level(),
        })
    }

    /// Directory the engine stores its files in.
    pub fn path(&self) -> &Path {
        &self.inner.dir
    }

    /// Stop accepting operations, finish queued flushes, stop the worker
    /// and sync the WAL. Every later call fails with [`Error::Closed`];
    /// calling `shutdown` again is a no-op.
    ///
    /// Tables whose flush fails here stay in their WALs and are recovered
    /// on the next open.
    pub fn shutdown(&self) -> Result<()> {
        let mut wal = self.inner.wal.lock();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // The worker may already be gone; joining below still succeeds.
        self.jobs.send(Job::Shutdown).ok();
        if let Some(handle) = self.worker.lock().take() {
            handle
                .join()
                .map_err(|_| Error::Io(io::Error::other("background worker panicked")))?;
        }

        wal.sync()?;
        tracing::info!(dir = %self.inner.dir.display(), "engine shut down");
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn send(&self, job: Job) -> Result<()> {
        self.jobs.send(job).map_err(|_| Error::Closed)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "shutdown on drop failed");
        }
    }
}

/// Replay one WAL into `table` and move the clock past its timestamps.
/// An undecodable tail is saved aside before anyone cuts it off.
fn replay_wal(dir: &Path, path: &Path, table: &MemTable, clock: &Clock) -> Result<Replay> {
    let reader = WALReader::new(path)?;
    let replay = reader.replay_into(table)?;
    clock.observe(replay.max_timestamp);

    if replay.dropped_bytes > 0 {
        let saved = wal::save_torn_tail(dir, clock.tick(), reader.tail(replay.valid_len))?;
        tracing::warn!(
            path = %path.display(),
            offset = replay.valid_len,
            dropped = replay.dropped_bytes,
            saved = %saved.display(),
            "discarded truncated record at end of WAL"
        );
    }
    Ok(replay)
}

/// Open every segment in `dir` and group them by level, newest first.
fn load_segments(dir: &Path, options: &Options, clock: &Clock) -> Result<Vec<Vec<Arc<Segment>>>> {
    let bottom = options.bottom_level();
    let mut levels: Vec<Vec<Arc<Segment>>> = vec![Vec::new(); options.max_levels];

    for (id, path) in segment::list_segments(dir)? {
        let segment = Segment::open(&path)?;
        clock.observe(id);

        let mut level = segment.level() as usize;
        if level > bottom {
            tracing::warn!(
                segment = id,
                level,
                bottom,
                "segment level beyond configured levels, placing it at the bottom"
            );
            level = bottom;
        }
        levels[level].push(Arc::new(segment));
    }

    for level in &mut levels {
        level.sort_by(|a, b| b.id().cmp(&a.id()));
    }
    Ok(levels)
}
