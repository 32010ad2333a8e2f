//! Immutable sorted on-disk segments (`snapshot-<id>.sst`).
//!
//! File layout:
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Data block 0: records + crc32                │
//! │ ...                                          │
//! │ Data block N                                 │
//! ├──────────────────────────────────────────────┤
//! │ Meta block: id, level, counts, key range,    │
//! │             bloom filter                     │
//! ├──────────────────────────────────────────────┤
//! │ Index block: one entry per data block        │
//! ├──────────────────────────────────────────────┤
//! │ Footer (40B)                                 │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Records inside data blocks use the WAL record encoding, sorted by key
//! ascending, one record per key.

pub mod block;
pub mod builder;
pub mod footer;
pub mod iterator;
pub mod reader;

use std::io;
use std::path::{Path, PathBuf};

pub use builder::SegmentBuilder;
pub use footer::SegmentMeta;
pub use iterator::SegmentIterator;
pub use reader::Segment;

const PREFIX: &str = "snapshot-";
const SUFFIX: &str = ".sst";
const TMP_SUFFIX: &str = ".tmp";

/// Final path of segment `id`.
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{PREFIX}{id}{SUFFIX}"))
}

/// Path a segment is written to before it is renamed into place.
pub fn temp_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{PREFIX}{id}{SUFFIX}{TMP_SUFFIX}"))
}

/// Parse the id out of a segment filename.
pub fn parse_segment_name(name: &str) -> Option<u64> {
    name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?.parse().ok()
}

/// Segment files found in `dir`, in no particular order.
pub fn list_segments(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str().and_then(parse_segment_name) {
            found.push((id, entry.path()));
        }
    }
    Ok(found)
}

/// Delete segments left half-written by a crash. Returns how many.
pub fn remove_temp_files(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let is_temp = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(PREFIX) && name.ends_with(TMP_SUFFIX));
        if is_temp {
            tracing::warn!(path = %entry.path().display(), "removing stale temporary segment");
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        let dir = Path::new("/data");
        let path = segment_path(dir, 1_700_000_000_000_000_000);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, "snapshot-1700000000000000000.sst");
        assert_eq!(parse_segment_name(name), Some(1_700_000_000_000_000_000));

        let tmp = temp_path(dir, 5);
        assert_eq!(parse_segment_name(tmp.file_name().unwrap().to_str().unwrap()), None);
        assert_eq!(parse_segment_name("wal.log"), None);
    }
}
