use bytes::Bytes;

use crate::error::{Error, Result};

/// Raw key bytes. Ordered lexicographically inside segments.
pub type Key = Bytes;

/// Raw value bytes. The engine never interprets them.
pub type Value = Bytes;

/// Distinguishes sets from deletes in the storage engine.
/// A Delete writes a tombstone. The key isn't removed, it's marked as deleted.
///
/// The discriminant is the opcode byte written to the WAL and to segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Upsert of a value.
    Set = b'S',
    /// Tombstone marker.
    Delete = b'D',
}

impl OpCode {
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            b'S' => Ok(OpCode::Set),
            b'D' => Ok(OpCode::Delete),
            _ => Err(Error::Corruption(format!("invalid opcode: {byte:#04x}"))),
        }
    }
}

/// The definitive answer a table or segment gives for a key it holds.
///
/// Lookups return `Option<Entry>`: `None` means "not here, keep looking in
/// older sources", while `Some(Entry::Tombstone)` ends the search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Value(Value),
    Tombstone,
}

impl Entry {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Entry::Tombstone)
    }

    /// Collapse into the caller-facing view: tombstones read as absent.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Tombstone => None,
        }
    }
}

/// One mutation: the unit written to the WAL, held by memtables and
/// stored in segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Monotonic nanoseconds, see [`crate::clock::Clock`].
    pub timestamp: u64,
    pub key: Key,
    pub entry: Entry,
}

impl Record {
    pub fn set(timestamp: u64, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Record {
            timestamp,
            key: key.into(),
            entry: Entry::Value(value.into()),
        }
    }

    pub fn delete(timestamp: u64, key: impl Into<Key>) -> Self {
        Record {
            timestamp,
            key: key.into(),
            entry: Entry::Tombstone,
        }
    }

    pub fn op(&self) -> OpCode {
        match self.entry {
            Entry::Value(_) => OpCode::Set,
            Entry::Tombstone => OpCode::Delete,
        }
    }
}
