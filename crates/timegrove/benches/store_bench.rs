//! Benchmarks for the write path and the merge read path.
//!
//! Run with: cargo bench --package timegrove

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::TempDir;
use timegrove::item::{DataItem, TICKS_PER_MILLISECOND};
use timegrove::settings::FolderSettings;
use timegrove::store::{StoreOptions, TimeStore};

const ITEMS: usize = 10_000;

fn open_store(dir: &TempDir) -> TimeStore {
    TimeStore::with_options(
        dir.path(),
        StoreOptions {
            defaults: FolderSettings {
                desired_items_per_file: Some(1_000),
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .unwrap()
}

fn generate_items(key: &str, count: usize) -> Vec<DataItem> {
    (0..count)
        .map(|i| {
            DataItem::new(
                key,
                (i as i64) * TICKS_PER_MILLISECOND,
                (i as u64).to_le_bytes().to_vec(),
            )
        })
        .collect()
}

fn bench_sequential_write(c: &mut Criterion) {
    let items = generate_items("bench", ITEMS);

    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Elements(ITEMS as u64));
    group.bench_function("sequential_10k", |b| {
        b.iter(|| {
            let dir = TempDir::new().unwrap();
            let store = open_store(&dir);
            let mut writer = store.writer("bench").unwrap();
            for item in &items {
                writer.write(black_box(item.clone())).unwrap();
            }
            writer.flush().unwrap();
        })
    });
    group.finish();
}

fn bench_merge_read(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    for key in ["a", "b", "c"] {
        let mut writer = store.writer(key).unwrap();
        for item in generate_items(key, ITEMS / 2) {
            writer.write(item).unwrap();
        }
        writer.flush().unwrap();
    }

    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Elements((ITEMS / 2 * 3) as u64));
    group.bench_function("merge_three_streams", |b| {
        b.iter(|| {
            let mut reader = store.reader(&["a", "b", "c"]).unwrap();
            reader.seek(0).unwrap();
            let mut count = 0usize;
            while let Some(item) = reader.read().unwrap() {
                black_box(item);
                count += 1;
            }
            assert_eq!(count, ITEMS / 2 * 3);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_sequential_write, bench_merge_read);
criterion_main!(benches);
