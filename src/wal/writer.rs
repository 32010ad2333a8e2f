use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::Record;
use crate::wal::{active_path, sealed_path, sync_dir};

/// Appends records to a WAL file.
///
/// Every append is forced to disk before it returns: a record that was
/// acknowledged to a caller is always durable. Each record goes out as a
/// single `write_all` of its encoding followed by `sync_all`, so there is
/// no user-space buffer to lose.
pub struct WALWriter {
    file: File,
    path: PathBuf,
    /// Length of the durable prefix (end of the last acknowledged record).
    offset: u64,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl WALWriter {
    /// Open (or create) a WAL for appending.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = file.metadata()?.len();

        Ok(WALWriter {
            file,
            path: path.to_path_buf(),
            offset,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append a record and fsync it.
    ///
    /// On failure the file is cut back to the previous durable length so a
    /// torn record never sits in front of later appends.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let encoded = record.encode();

        let written = self
            .file
            .write_all(&encoded)
            .and_then(|()| self.sync_file());

        if let Err(e) = written {
            if let Err(cut) = self.file.set_len(self.offset) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %cut,
                    "failed to discard partial WAL append"
                );
            }
            return Err(e.into());
        }

        self.offset += encoded.len() as u64;
        Ok(())
    }

    /// Discard everything past `len`. Used after recovery to drop a torn
    /// tail record before new appends land behind it.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.offset = len;
        Ok(())
    }

    /// Force fsync to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn sync_file(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(io::Error::other("simulated fsync failure"));
        }
        self.file.sync_all()
    }

    /// Make the next append fail after its bytes reach the file.
    #[cfg(test)]
    pub(crate) fn fail_next_sync(&mut self) {
        self.fail_next_sync = true;
    }

    /// Current file offset (bytes durably written).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Manages WAL file rotation.
///
/// The active log is always `wal.log`. When the active memtable is frozen:
/// 1. `wal.log` is renamed to `wal-<seq>.log` (sealed)
/// 2. A fresh `wal.log` is opened for the new active memtable
/// 3. The sealed file is deleted once its memtable is durably in a segment
///
/// CRITICAL INVARIANT: a sealed WAL is only deleted AFTER its segment is
/// fully written and fsync'd. Violating this loses data.
pub struct WALManager {
    dir: PathBuf,
    active: WALWriter,
    next_seq: u64,
}

impl WALManager {
    /// Open the active WAL in `dir`. `next_seq` must be greater than every
    /// sealed WAL sequence already on disk.
    pub fn new(dir: &Path, next_seq: u64) -> Result<Self> {
        let active = WALWriter::new(&active_path(dir))?;
        Ok(WALManager {
            dir: dir.to_path_buf(),
            active,
            next_seq,
        })
    }

    /// Durably append a record to the active WAL.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        self.active.append(record)
    }

    /// Seal the active WAL and start a new one.
    /// Returns the sealed path (caller deletes it after the segment flush).
    ///
    /// Once the rename has happened the rotation always completes: a
    /// failed directory sync is only logged, since the next directory
    /// sync (segment publish or WAL delete) makes the rename durable too.
    pub fn rotate(&mut self) -> Result<PathBuf> {
        self.active.sync()?;

        // The writer may still sit on a sealed name if an earlier rotation
        // could not reopen `wal.log`; renaming it onto itself is a no-op.
        let sealed = sealed_path(&self.dir, self.next_seq);
        fs::rename(self.active.path(), &sealed)?;
        self.active.path = sealed.clone();

        let fresh = active_path(&self.dir);
        match WALWriter::new(&fresh) {
            Ok(writer) => self.active = writer,
            Err(e) => {
                // Put the old log back so appends keep going to `wal.log`.
                match fs::rename(&sealed, &fresh) {
                    Ok(()) => self.active.path = fresh,
                    Err(back) => tracing::warn!(
                        sealed = %sealed.display(),
                        error = %back,
                        "failed to restore active WAL after aborted rotation"
                    ),
                }
                return Err(e);
            }
        }
        self.next_seq += 1;

        if let Err(e) = sync_dir(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "directory sync after WAL rotation failed");
        }
        tracing::debug!(sealed = %sealed.display(), "rotated WAL");
        Ok(sealed)
    }

    /// Delete a sealed WAL (safe only after its segment is fsync'd).
    /// A log that is already gone counts as deleted.
    pub fn delete_wal(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(dir) = path.parent() {
            sync_dir(dir)?;
        }
        Ok(())
    }

    pub fn active(&mut self) -> &mut WALWriter {
        &mut self.active
    }

    pub fn sync(&mut self) -> Result<()> {
        self.active.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::WALReader;

    #[test]
    fn failed_append_is_cut_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = active_path(dir.path());
        let first = Record::set(1, "a", "1");
        let mut writer = WALWriter::new(&path).unwrap();
        writer.append(&first).unwrap();

        writer.fail_next_sync();
        assert!(writer.append(&Record::set(2, "b", "lost")).is_err());
        assert_eq!(writer.offset(), first.encoded_size() as u64);
        assert_eq!(fs::metadata(&path).unwrap().len(), writer.offset());

        writer.append(&Record::set(3, "c", "3")).unwrap();
        let records: Vec<Record> = WALReader::new(&path)
            .unwrap()
            .iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records, vec![first, Record::set(3, "c", "3")]);
    }

    #[test]
    fn rotate_recovers_writer_left_on_sealed_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = WALManager::new(dir.path(), 0).unwrap();
        manager.append(&Record::set(1, "k", "v")).unwrap();

        // Renamed, but `wal.log` was never reopened.
        let stranded = sealed_path(dir.path(), 0);
        fs::rename(active_path(dir.path()), &stranded).unwrap();
        manager.active.path = stranded.clone();

        assert_eq!(manager.rotate().unwrap(), stranded);
        assert!(active_path(dir.path()).exists());
        manager.append(&Record::set(2, "k2", "v2")).unwrap();
        assert_eq!(manager.rotate().unwrap(), sealed_path(dir.path(), 1));
    }
}
