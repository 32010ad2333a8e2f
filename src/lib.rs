//! # LSM-Tree Key-Value Engine
//!
//! An embeddable key-value storage engine using the Log-Structured
//! Merge-Tree design.
//!
//! ## Core idea
//! Every mutation is appended to a write-ahead log and fsync'd, then
//! applied to an in-memory table. Full tables are frozen, flushed by a
//! background worker into sorted segment files, and segments are merged
//! level by level so reads touch few files.
//!
//! ```text
//! set/delete ──► WAL (fsync) ──► active MemTable ──freeze──► immutable tables
//!                                                               │ flush
//!                                                               ▼
//!                                    level 0 ──compact──► level 1 ──► ... ──► bottom
//! ```

pub mod bloom;
pub mod clock;
pub mod compaction;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod iterator;
pub mod memtable;
pub mod options;
pub mod segment;
pub mod types;
pub mod wal;

// Public re-exports for the top-level API
pub use engine::{Engine, Stats};
pub use error::{Error, Result};
pub use options::Options;
pub use types::{Entry, Key, OpCode, Record, Value};
