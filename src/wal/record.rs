use bytes::{Buf, BufMut, Bytes};

use crate::encoding::{get_varint, put_varint, varint_len};
use crate::error::{Error, Result};
use crate::types::{Entry, OpCode, Record};

/// WAL record codec.
///
/// On-disk format (all integers are little-endian base-128 varints):
/// ```text
/// ┌───────────────┬────────────┬─────────────┬─────────┬───────────────┬───────────┐
/// │ timestamp (v) │ opcode (1B)│ key_len (v) │ key     │ value_len (v) │ value     │
/// └───────────────┴────────────┴─────────────┴─────────┴───────────────┴───────────┘
///                                                       └── only when opcode == 'S' ──┘
/// ```
///
/// There is no framing between records: each is self-describing, and a
/// reader decodes them back to back. Segments store records in the same
/// encoding.
impl Record {
    /// Serialize this record.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf);
        buf
    }

    /// Append the encoding of this record to `buf`.
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        put_varint(buf, self.timestamp);
        buf.put_u8(self.op() as u8);
        put_varint(buf, self.key.len() as u64);
        buf.put_slice(&self.key);
        if let Entry::Value(value) = &self.entry {
            put_varint(buf, value.len() as u64);
            buf.put_slice(value);
        }
    }

    /// Decode one record from the front of `data`, returning the record and
    /// the number of bytes it occupied.
    ///
    /// [`Error::Incomplete`] means `data` ends before the record does (a
    /// torn tail write). Anything else that fails is [`Error::Corruption`].
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut buf = data;

        let timestamp = get_varint(&mut buf)?;

        if !buf.has_remaining() {
            return Err(Error::Incomplete);
        }
        let op = OpCode::from_u8(buf.get_u8())?;

        let key = take_bytes(&mut buf)?;

        let entry = match op {
            OpCode::Set => Entry::Value(take_bytes(&mut buf)?),
            OpCode::Delete => Entry::Tombstone,
        };

        let consumed = data.len() - buf.len();
        Ok((
            Record {
                timestamp,
                key,
                entry,
            },
            consumed,
        ))
    }

    /// Size of this record when serialized.
    pub fn encoded_size(&self) -> usize {
        let mut size = varint_len(self.timestamp)
            + 1
            + varint_len(self.key.len() as u64)
            + self.key.len();
        if let Entry::Value(value) = &self.entry {
            size += varint_len(value.len() as u64) + value.len();
        }
        size
    }
}

fn take_bytes(buf: &mut &[u8]) -> Result<Bytes> {
    let len = get_varint(buf)?;
    if (buf.remaining() as u64) < len {
        return Err(Error::Incomplete);
    }
    Ok(buf.copy_to_bytes(len as usize))
}
