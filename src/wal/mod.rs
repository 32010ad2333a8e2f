pub mod reader;
pub mod record;
pub mod writer;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub use reader::{Replay, WALReader};
pub use writer::WALWriter;

/// Name of the active WAL inside the engine directory.
pub const ACTIVE_WAL: &str = "wal.log";

/// Path of the active WAL.
pub fn active_path(dir: &Path) -> PathBuf {
    dir.join(ACTIVE_WAL)
}

/// Path of a sealed WAL: the log of a frozen memtable awaiting flush.
pub fn sealed_path(dir: &Path, seq: u64) -> PathBuf {
    dir.join(format!("wal-{seq:020}.log"))
}

/// Parse the sequence number out of a sealed WAL filename.
pub fn parse_sealed_name(name: &str) -> Option<u64> {
    name.strip_prefix("wal-")?.strip_suffix(".log")?.parse().ok()
}

/// All sealed WALs in `dir`, oldest first.
pub fn list_sealed(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut sealed = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(seq) = name.to_str().and_then(parse_sealed_name) {
            sealed.push((seq, entry.path()));
        }
    }
    sealed.sort_by_key(|(seq, _)| *seq);
    Ok(sealed)
}

/// Path of a file holding the discarded tail of a WAL.
pub fn torn_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("wal-{id:020}.torn"))
}

/// Keep the undecodable tail of a WAL in its own file before the log is
/// cut back. A length field damaged in place reads exactly like a torn
/// final write, and the records behind it would otherwise be gone for good.
pub fn save_torn_tail(dir: &Path, id: u64, tail: &[u8]) -> io::Result<PathBuf> {
    let path = torn_path(dir, id);
    let mut file = File::create(&path)?;
    file.write_all(tail)?;
    file.sync_all()?;
    sync_dir(dir)?;
    Ok(path)
}

/// fsync a directory so renames and unlinks inside it are durable.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
