//! Benchmarks for hgindex key ordering and index operations

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use hgindex::codec::{KeyCodec, VkvvCodec};
use hgindex::comparator::ComparatorAdapter;
use hgindex::config::{Config, WalSyncStrategy};
use hgindex::engine::Engine;
use hgindex::index::{I32Converter, StringConverter};
use hgindex::manager::IndexManager;
use tempfile::TempDir;

fn codec_benchmarks(c: &mut Criterion) {
    let codec = VkvvCodec;
    let adapter = ComparatorAdapter::with_comparators("bench", None, None);
    let a = codec.encode(b"user:000123", b"value-a").unwrap();
    let b = codec.encode(b"user:000123", b"value-b").unwrap();
    let edge = codec.last_key(b"user:000123").unwrap();

    c.bench_function("vkvv_encode", |bench| {
        bench.iter(|| codec.encode(black_box(b"user:000123"), black_box(b"value-a")))
    });
    c.bench_function("adapter_compare_values", |bench| {
        bench.iter(|| adapter.compare_engine_keys(black_box(&a), black_box(&b)))
    });
    c.bench_function("adapter_compare_edge", |bench| {
        bench.iter(|| adapter.compare_engine_keys(black_box(&a), black_box(&edge)))
    });
}

fn index_benchmarks(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 1000 })
        .wal_compaction_threshold(0)
        .build();
    let engine = Engine::open(&config, Vec::new()).unwrap();
    let manager = IndexManager::new(engine.clone());
    let index = manager
        .get_bidirectional_index::<i32, String>(
            "bench",
            Arc::new(I32Converter),
            Arc::new(StringConverter),
            None,
            None,
            true,
        )
        .unwrap()
        .unwrap();

    let tx = engine.begin().unwrap();
    for key in 0..1000 {
        index.add_entry(&tx, &key, &format!("v{}", key % 10)).unwrap();
    }
    tx.commit().unwrap();

    c.bench_function("index_add_commit", |bench| {
        let mut key = 1000;
        bench.iter(|| {
            let tx = engine.begin().unwrap();
            index.add_entry(&tx, &key, &"fresh".to_string()).unwrap();
            tx.commit().unwrap();
            key += 1;
        })
    });

    c.bench_function("index_find_first", |bench| {
        let tx = engine.begin().unwrap();
        bench.iter(|| index.find_first(&tx, black_box(&500)).unwrap())
    });

    c.bench_function("index_find_by_value", |bench| {
        bench.iter_batched(
            || engine.begin().unwrap(),
            |tx| index.find_by_value(&tx, &"v3".to_string()).unwrap().count(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, codec_benchmarks, index_benchmarks);
criterion_main!(benches);
