// WAL Reader tests
// Replay into a memtable, torn tails, and mid-log corruption.

use lsm_kv::memtable::MemTable;
use lsm_kv::wal::{WALReader, WALWriter};
use lsm_kv::{Entry, Error, Record};

fn write_log(path: &std::path::Path, records: &[Record]) {
    let mut writer = WALWriter::new(path).unwrap();
    for r in records {
        writer.append(r).unwrap();
    }
}

fn sample_records() -> Vec<Record> {
    vec![
        Record::set(1, "alpha", "1"),
        Record::set(2, "beta", "2"),
        Record::delete(3, "alpha"),
        Record::set(4, "gamma", "a longer value to make the record span bytes"),
    ]
}

// =============================================================================
// Test 1: Missing file reads as an empty log
// =============================================================================
#[test]
fn missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let reader = WALReader::new(&dir.path().join("wal.log")).unwrap();
    assert!(reader.is_empty());
    assert_eq!(reader.iter().count(), 0);
}

// =============================================================================
// Test 2: Replay applies sets and deletes in order
// =============================================================================
#[test]
fn replay_applies_records_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    write_log(&path, &sample_records());

    let table = MemTable::new(1 << 20);
    let replay = WALReader::new(&path).unwrap().replay_into(&table).unwrap();

    assert_eq!(replay.records, 4);
    assert_eq!(replay.dropped_bytes, 0);
    assert_eq!(replay.valid_len, std::fs::metadata(&path).unwrap().len());
    assert_eq!(replay.max_timestamp, 4);

    assert_eq!(table.get(b"alpha"), Some(Entry::Tombstone));
    assert_eq!(table.get(b"beta"), Some(Entry::Value("2".into())));
    assert_eq!(table.len(), 3);
}

// =============================================================================
// Test 3: Truncating anywhere inside the last record drops only that record
// =============================================================================
#[test]
fn truncated_last_record_is_dropped_at_every_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let records = sample_records();
    write_log(&path, &records);

    let full = std::fs::read(&path).unwrap();
    let last_len = records.last().unwrap().encoded_size();
    let last_start = full.len() - last_len;

    for cut in last_start..full.len() {
        std::fs::write(&path, &full[..cut]).unwrap();

        let table = MemTable::new(1 << 20);
        let replay = WALReader::new(&path).unwrap().replay_into(&table).unwrap();

        assert_eq!(replay.records, records.len() - 1, "cut at {cut}");
        assert_eq!(replay.valid_len, last_start as u64, "cut at {cut}");
        assert_eq!(replay.dropped_bytes, (cut - last_start) as u64);
        assert_eq!(table.get(b"gamma"), None, "cut at {cut}");
        assert_eq!(table.get(b"beta"), Some(Entry::Value("2".into())));
    }
}

// =============================================================================
// Test 4: A malformed record before the end is corruption
// =============================================================================
#[test]
fn malformed_record_mid_log_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let records = sample_records();
    write_log(&path, &records);

    // Opcode byte of the second record.
    let mut data = std::fs::read(&path).unwrap();
    let opcode_at = records[0].encoded_size() + 1;
    data[opcode_at] = b'?';
    std::fs::write(&path, &data).unwrap();

    let reader = WALReader::new(&path).unwrap();
    let results: Vec<_> = reader.iter().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::Corruption(_))));

    let table = MemTable::new(1 << 20);
    assert!(matches!(
        reader.replay_into(&table),
        Err(Error::Corruption(_))
    ));
}

// =============================================================================
// Test 5: Iterator offset tracks the end of the last decoded record
// =============================================================================
#[test]
fn iterator_offset_tracks_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let records = sample_records();
    write_log(&path, &records);

    let reader = WALReader::new(&path).unwrap();
    let mut iter = reader.iter();
    let mut expected = 0;
    for r in &records {
        assert_eq!(iter.next().unwrap().unwrap(), *r);
        expected += r.encoded_size();
        assert_eq!(iter.offset(), expected);
    }
    assert!(iter.next().is_none());
}
