use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::tempdir;

use lsm_kv::memtable::MemTable;
use lsm_kv::segment::{self, Segment, SegmentBuilder};
use lsm_kv::{Engine, Options, Record};

const N: usize = 1_000;
const VAL_SIZE: usize = 100;

fn key(i: usize) -> String {
    format!("key{i:08}")
}

fn memtable_set(c: &mut Criterion) {
    c.bench_function("memtable_set_1k", |b| {
        b.iter_batched(
            || MemTable::new(usize::MAX),
            |mt| {
                for i in 0..N {
                    mt.apply(Record::set(i as u64, key(i), vec![b'x'; VAL_SIZE]));
                }
                mt
            },
            BatchSize::SmallInput,
        );
    });
}

/// Every set pays for an fsync.
fn engine_set(c: &mut Criterion) {
    c.bench_function("engine_set_100_fsync", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = Engine::open(dir.path(), Options::default()).unwrap();
                (dir, engine)
            },
            |(dir, engine)| {
                for i in 0..100 {
                    engine.set(key(i), vec![b'x'; VAL_SIZE]).unwrap();
                }
                (dir, engine)
            },
            BatchSize::PerIteration,
        );
    });
}

fn engine_get(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), Options::default()).unwrap();
    for i in 0..N {
        engine.set(key(i), vec![b'x'; VAL_SIZE]).unwrap();
    }

    c.bench_function("engine_get_memtable_1k", |b| {
        b.iter(|| {
            for i in 0..N {
                assert!(engine.get(key(i).as_bytes()).unwrap().is_some());
            }
        });
    });

    engine.flush().unwrap();
    c.bench_function("engine_get_segment_1k", |b| {
        b.iter(|| {
            for i in 0..N {
                assert!(engine.get(key(i).as_bytes()).unwrap().is_some());
            }
        });
    });

    c.bench_function("engine_get_missing_1k", |b| {
        b.iter(|| {
            for i in N..2 * N {
                assert!(engine.get(key(i).as_bytes()).unwrap().is_none());
            }
        });
    });
}

fn segment_build(c: &mut Criterion) {
    let records: Vec<Record> = (0..10 * N)
        .map(|i| Record::set(i as u64, key(i), vec![b'x'; VAL_SIZE]))
        .collect();
    let options = Options::default();

    c.bench_function("segment_build_10k", |b| {
        b.iter_batched(
            tempdir,
            |dir| {
                let dir = dir.unwrap();
                let mut builder = SegmentBuilder::new(dir.path(), 1, 0, &options).unwrap();
                for r in &records {
                    builder.add(r).unwrap();
                }
                builder.finish().unwrap();
                Segment::open(&segment::segment_path(dir.path(), 1)).unwrap()
            },
            BatchSize::PerIteration,
        );
    });
}

criterion_group!(benches, memtable_set, engine_set, engine_get, segment_build);
criterion_main!(benches);
