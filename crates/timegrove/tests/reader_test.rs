//! Integration tests for reading a single stream: order, seeking, and
//! direction changes.

use std::sync::Arc;

use tempfile::TempDir;
use timegrove::item::{DataItem, TieBreak, TICKS_PER_SECOND};
use timegrove::settings::FolderSettings;
use timegrove::store::{StoreOptions, TimeStore};
use timegrove::stream::Direction;
use timegrove::StoreError;

fn store_with_file_size(dir: &TempDir, desired: usize) -> TimeStore {
    TimeStore::with_options(
        dir.path(),
        StoreOptions {
            defaults: FolderSettings {
                desired_items_per_file: Some(desired),
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .unwrap()
}

fn write_seconds(store: &TimeStore, key: &str, seconds: &[i64]) {
    let mut writer = store.writer(key).unwrap();
    for &s in seconds {
        writer
            .write(DataItem::new(key, s * TICKS_PER_SECOND, s.to_le_bytes().to_vec()))
            .unwrap();
    }
    writer.flush().unwrap();
}

fn read_all_seconds(reader: &mut timegrove::MergeReader) -> Vec<i64> {
    let mut out = Vec::new();
    while let Some(item) = reader.read().unwrap() {
        out.push(item.timestamp() / TICKS_PER_SECOND);
    }
    out
}

#[test]
fn test_forward_roundtrip_across_files() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 7);
    write_seconds(&store, "s", &(0..25).collect::<Vec<_>>());

    let mut reader = store.reader(&["s"]).unwrap();
    reader.seek(0).unwrap();
    assert!(reader.has_data());
    assert_eq!(read_all_seconds(&mut reader), (0..25).collect::<Vec<_>>());
    assert!(!reader.has_data());
}

#[test]
fn test_backward_roundtrip_across_files() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 7);
    write_seconds(&store, "s", &(0..25).collect::<Vec<_>>());

    let mut reader = store.reader(&["s"]).unwrap();
    reader.set_direction(Direction::Backward).unwrap();
    reader.seek(24 * TICKS_PER_SECOND).unwrap();
    assert_eq!(
        read_all_seconds(&mut reader),
        (0..25).rev().collect::<Vec<_>>()
    );
}

#[test]
fn test_read_before_seek_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 7);
    write_seconds(&store, "s", &[1, 2, 3]);

    let mut reader = store.reader(&["s"]).unwrap();
    assert!(!reader.has_data());
    assert!(reader.read().unwrap().is_none());
}

#[test]
fn test_seek_boundaries() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 10);
    // Two files: [0..9] and [20..29] seconds.
    write_seconds(&store, "s", &(0..10).chain(20..30).collect::<Vec<_>>());

    let mut reader = store.reader(&["s"]).unwrap();

    // Seeking exactly at a file's first timestamp lands on that file.
    reader.seek(20 * TICKS_PER_SECOND).unwrap();
    assert_eq!(reader.read().unwrap().unwrap().timestamp(), 20 * TICKS_PER_SECOND);

    // Seeking into the gap lands on the next file forward.
    reader.seek(15 * TICKS_PER_SECOND).unwrap();
    assert_eq!(reader.read().unwrap().unwrap().timestamp(), 20 * TICKS_PER_SECOND);

    // Past the newest item: nothing forward.
    reader.seek(30 * TICKS_PER_SECOND).unwrap();
    assert!(reader.read().unwrap().is_none());

    // Backward from the gap lands on the earlier file's last item.
    let mut backward = store.reader(&["s"]).unwrap();
    backward.set_direction(Direction::Backward).unwrap();
    backward.seek(15 * TICKS_PER_SECOND).unwrap();
    assert_eq!(
        backward.read().unwrap().unwrap().timestamp(),
        9 * TICKS_PER_SECOND
    );
}

#[test]
fn test_direction_change_mid_read() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 100);
    write_seconds(&store, "s", &(0..10).collect::<Vec<_>>());

    let mut reader = store.reader(&["s"]).unwrap();
    reader.seek(0).unwrap();
    for expected in 0..5 {
        assert_eq!(
            reader.read().unwrap().unwrap().timestamp(),
            expected * TICKS_PER_SECOND
        );
    }

    // After consuming 0..4, backward reading continues below the last
    // consumed item.
    reader.set_direction(Direction::Backward).unwrap();
    assert_eq!(reader.direction(), Direction::Backward);
    assert_eq!(read_all_seconds(&mut reader), vec![3, 2, 1, 0]);
}

#[test]
fn test_direction_change_with_unloaded_seek_is_an_error() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 100);
    write_seconds(&store, "near", &(0..10).collect::<Vec<_>>());
    write_seconds(&store, "far", &(100..110).collect::<Vec<_>>());

    let mut reader = store.reader(&["near", "far"]).unwrap();
    reader.seek(0).unwrap();
    // Seeking loads only the head stream; "far" still holds an unloaded
    // seek result, so the merge is non-sequential.
    assert!(matches!(
        reader.set_direction(Direction::Backward),
        Err(StoreError::OperationOrder(_))
    ));
    assert_eq!(reader.direction(), Direction::Forward);

    // Draining the merge loads every stream, after which reversal is legal.
    while reader.read().unwrap().is_some() {}
    reader.set_direction(Direction::Backward).unwrap();
}

#[test]
fn test_duplicate_timestamps_with_tie_break() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 100);
    let tie: TieBreak = Arc::new(|a, b| a.payload().cmp(b.payload()));

    let mut writer = store.writer_with("s", Some(tie.clone())).unwrap();
    for tag in [3u8, 1, 2] {
        writer
            .write(DataItem::new("s", 5 * TICKS_PER_SECOND, vec![tag]))
            .unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let mut reader = store.reader_with(&["s"], Some(tie)).unwrap();
    reader.seek(0).unwrap();
    let mut payloads = Vec::new();
    while let Some(item) = reader.read().unwrap() {
        assert_eq!(item.timestamp(), 5 * TICKS_PER_SECOND);
        payloads.push(item.payload()[0]);
    }
    assert_eq!(payloads, vec![1, 2, 3]);
}

#[test]
fn test_seek_rewind_after_reading() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 4);
    write_seconds(&store, "s", &(0..12).collect::<Vec<_>>());

    let mut reader = store.reader(&["s"]).unwrap();
    reader.seek(8 * TICKS_PER_SECOND).unwrap();
    assert_eq!(reader.read().unwrap().unwrap().timestamp(), 8 * TICKS_PER_SECOND);

    // Seeking back replays from the requested time.
    reader.seek(2 * TICKS_PER_SECOND).unwrap();
    assert_eq!(read_all_seconds(&mut reader), (2..12).collect::<Vec<_>>());
}
