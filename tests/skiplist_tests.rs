// Skip List tests
// Insert, lookup, sorted iteration and size accounting.

use lsm_kv::memtable::skiplist::SkipList;
use lsm_kv::{Entry, Record};
use rand::seq::SliceRandom;

// =============================================================================
// Test 1: Insert one key, get it back
// =============================================================================
#[test]
fn insert_one_key_get_it_back() {
    let mut sl = SkipList::new();
    sl.insert(Record::set(1, "hello", "world"));

    let record = sl.get(b"hello").unwrap();
    assert_eq!(record.entry, Entry::Value("world".into()));
    assert_eq!(record.timestamp, 1);
    assert!(sl.get(b"hell").is_none());
}

// =============================================================================
// Test 2: Duplicate key overwrites in place
// =============================================================================
#[test]
fn insert_duplicate_key_overwrites() {
    let mut sl = SkipList::new();
    sl.insert(Record::set(1, "key", "old"));
    sl.insert(Record::set(2, "key", "new"));

    assert_eq!(sl.len(), 1);
    assert_eq!(sl.get(b"key").unwrap().entry, Entry::Value("new".into()));
}

// =============================================================================
// Test 3: A tombstone replaces the value and still counts as an entry
// =============================================================================
#[test]
fn tombstone_replaces_value() {
    let mut sl = SkipList::new();
    sl.insert(Record::set(1, "key", "value"));
    sl.insert(Record::delete(2, "key"));

    assert_eq!(sl.len(), 1);
    assert!(sl.get(b"key").unwrap().entry.is_tombstone());
}

// =============================================================================
// Test 4: Iteration is sorted regardless of insert order
// =============================================================================
#[test]
fn iteration_is_sorted() {
    let mut keys: Vec<String> = (0..1000).map(|i| format!("key{i:05}")).collect();
    let mut shuffled = keys.clone();
    shuffled.shuffle(&mut rand::thread_rng());

    let mut sl = SkipList::new();
    for (ts, key) in shuffled.into_iter().enumerate() {
        sl.insert(Record::set(ts as u64, key, "v"));
    }

    keys.sort();
    let iterated: Vec<_> = sl.iter().map(|r| r.key.clone()).collect();
    assert_eq!(iterated.len(), keys.len());
    for (got, want) in iterated.iter().zip(&keys) {
        assert_eq!(got, want.as_bytes());
    }
}

// =============================================================================
// Test 5: Keys compare as raw bytes, not as strings
// =============================================================================
#[test]
fn byte_ordering() {
    let mut sl = SkipList::new();
    sl.insert(Record::set(1, vec![0xFFu8], "high"));
    sl.insert(Record::set(2, vec![0x00u8], "low"));
    sl.insert(Record::set(3, vec![0x00u8, 0x00], "longer"));
    sl.insert(Record::set(4, Vec::<u8>::new(), "empty"));

    let keys: Vec<Vec<u8>> = sl.iter().map(|r| r.key.to_vec()).collect();
    assert_eq!(keys, vec![vec![], vec![0x00], vec![0x00, 0x00], vec![0xFF]]);
}

// =============================================================================
// Test 6: Size grows with payload and is zero when empty
// =============================================================================
#[test]
fn size_tracks_payload() {
    let mut sl = SkipList::new();
    assert!(sl.is_empty());
    assert_eq!(sl.size_bytes(), 0);

    sl.insert(Record::set(1, "a", "1"));
    let one = sl.size_bytes();
    assert!(one >= 2);

    sl.insert(Record::set(2, "b", vec![0u8; 1000]));
    assert!(sl.size_bytes() >= one + 1001);

    // Shrinking a value shrinks the size.
    let before = sl.size_bytes();
    sl.insert(Record::delete(3, "b"));
    assert!(sl.size_bytes() < before);
}
