// Bloom Filter tests
// Membership, false positive rate, and the segment-time builder.

use lsm_kv::bloom::{BloomFilter, BloomFilterBuilder};

fn measured_fpr(filter: &BloomFilter, prefix: &str, range: std::ops::Range<usize>) -> f64 {
    let checks = range.len();
    let hits = range
        .filter(|i| filter.may_contain(format!("{prefix}{i}").as_bytes()))
        .count();
    hits as f64 / checks as f64
}

// =============================================================================
// Test 1: Empty filter rejects everything
// =============================================================================
#[test]
fn empty_filter_rejects() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(!bf.may_contain(b"any_key"));
    assert!(!bf.may_contain(b""));
}

// =============================================================================
// Test 2: No false negatives, including empty and binary keys
// =============================================================================
#[test]
fn inserted_keys_always_found() {
    let mut bf = BloomFilter::new(1000, 0.01);
    let keys: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0x00, 0x01, 0xFF, 0xFE],
        vec![0u8; 64 * 1024],
        b"apple".to_vec(),
    ];
    for k in &keys {
        bf.insert(k);
    }
    for i in 0..900 {
        bf.insert(format!("key_{i}").as_bytes());
    }

    for k in &keys {
        assert!(bf.may_contain(k));
    }
    for i in 0..900 {
        assert!(bf.may_contain(format!("key_{i}").as_bytes()));
    }
}

// =============================================================================
// Test 3: Measured false positive rate stays near the target
// =============================================================================
#[test]
fn false_positive_rate_near_target() {
    for target in [0.1, 0.05, 0.01, 0.001] {
        let n = 5000;
        let mut bf = BloomFilter::new(n, target);
        for i in 0..n {
            bf.insert(format!("member_{i}").as_bytes());
        }

        let actual = measured_fpr(&bf, "member_", n..n * 3);
        assert!(
            actual < target * 3.0,
            "target {target}: measured {actual}"
        );
    }
}

// =============================================================================
// Test 4: Builder sizes the filter for the keys it saw
// =============================================================================
#[test]
fn builder_sizes_for_added_keys() {
    let mut builder = BloomFilterBuilder::new(0.01);
    assert!(builder.is_empty());
    for i in 0..10_000 {
        builder.add_key(format!("k{i}").as_bytes());
    }
    assert_eq!(builder.len(), 10_000);

    let bf = builder.build();
    for i in 0..10_000 {
        assert!(bf.may_contain(format!("k{i}").as_bytes()));
    }
    assert!(measured_fpr(&bf, "k", 10_000..30_000) < 0.02);
    // ~9.6 bits per key at 1%.
    assert!(bf.num_bits() >= 90_000);
}

// =============================================================================
// Test 5: A builder with no keys still yields a usable filter
// =============================================================================
#[test]
fn empty_builder_builds() {
    let bf = BloomFilterBuilder::new(0.01).build();
    assert!(!bf.may_contain(b"anything"));
    assert!(bf.num_hashes() >= 1);
}

// =============================================================================
// Test 6: Serialized filters answer identically and reject damage
// =============================================================================
#[test]
fn serialize_round_trip_and_truncation() {
    let mut builder = BloomFilterBuilder::new(0.01);
    for i in 0..500 {
        builder.add_key(format!("s{i}").as_bytes());
    }
    let bf = builder.build();
    let data = bf.serialize();

    let restored = BloomFilter::deserialize(&data).unwrap();
    assert_eq!(restored, bf);

    assert!(BloomFilter::deserialize(&data[..4]).is_err());
    assert!(BloomFilter::deserialize(&data[..data.len() - 1]).is_err());
}
