//! Integration tests for the k-way merge: global ordering, resumable
//! positions, and restore verification warnings.

use std::sync::Arc;

use tempfile::TempDir;
use timegrove::item::{DataItem, TieBreak, TICKS_PER_SECOND};
use timegrove::settings::FolderSettings;
use timegrove::store::{StoreOptions, TimeStore};
use timegrove::stream::ReadingPosition;
use timegrove::RestoreWarning;

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

fn tie_break() -> TieBreak {
    // Stream key then payload: deterministic order among equal timestamps.
    Arc::new(|a: &DataItem, b: &DataItem| {
        a.routing_key()
            .cmp(b.routing_key())
            .then_with(|| a.payload().cmp(b.payload()))
    })
}

fn write_seconds(store: &TimeStore, key: &str, seconds: &[i64]) {
    let mut writer = store.writer_with(key, Some(tie_break())).unwrap();
    for (i, &s) in seconds.iter().enumerate() {
        writer
            .write(DataItem::new(key, s * TICKS_PER_SECOND, vec![i as u8]))
            .unwrap();
    }
    writer.flush().unwrap();
}

fn read_all(reader: &mut timegrove::MergeReader) -> Vec<(String, i64)> {
    let mut out = Vec::new();
    while let Some(item) = reader.read().unwrap() {
        out.push((
            item.routing_key().to_string(),
            item.timestamp() / TICKS_PER_SECOND,
        ));
    }
    out
}

#[test]
fn test_merge_yields_globally_sorted_sequence() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 4);

    let a: Vec<i64> = vec![0, 3, 6, 9, 12, 15, 18, 21];
    let b: Vec<i64> = vec![1, 4, 7, 10, 13, 16, 19];
    let c: Vec<i64> = vec![2, 5, 8, 11, 14, 17, 20];
    write_seconds(&store, "a", &a);
    write_seconds(&store, "b", &b);
    write_seconds(&store, "c", &c);

    let mut reader = store
        .reader_with(&["a", "b", "c"], Some(tie_break()))
        .unwrap();
    reader.seek(0).unwrap();

    let merged: Vec<i64> = read_all(&mut reader).into_iter().map(|(_, s)| s).collect();
    let mut expected: Vec<i64> = a.into_iter().chain(b).chain(c).collect();
    expected.sort_unstable();
    assert_eq!(merged, expected);
    assert_eq!(reader.stream_states(), (0, 0, 3));
}

#[test]
fn test_merge_equal_timestamps_follow_tie_break() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 10);

    // Both streams carry items at the very same timestamps.
    write_seconds(&store, "alpha", &[5, 5, 7]);
    write_seconds(&store, "beta", &[5, 7, 7]);

    let mut reader = store
        .reader_with(&["alpha", "beta"], Some(tie_break()))
        .unwrap();
    reader.seek(0).unwrap();

    let merged = read_all(&mut reader);
    assert_eq!(
        merged,
        vec![
            ("alpha".to_string(), 5),
            ("alpha".to_string(), 5),
            ("beta".to_string(), 5),
            ("alpha".to_string(), 7),
            ("beta".to_string(), 7),
            ("beta".to_string(), 7),
        ]
    );
}

#[test]
fn test_resume_equals_uninterrupted_read_for_every_split_point() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 3);

    // Duplicates within and across streams, spanning several files.
    write_seconds(&store, "a", &[0, 1, 1, 2, 5, 5, 5, 8]);
    write_seconds(&store, "b", &[1, 3, 5, 7]);

    let full = {
        let mut reader = store.reader_with(&["a", "b"], Some(tie_break())).unwrap();
        reader.seek(0).unwrap();
        read_all(&mut reader)
    };
    assert_eq!(full.len(), 12);

    for k in 0..=full.len() {
        let mut first = store.reader_with(&["a", "b"], Some(tie_break())).unwrap();
        first.seek(0).unwrap();
        let mut prefix = Vec::new();
        for _ in 0..k {
            let item = first.read().unwrap().unwrap();
            prefix.push((
                item.routing_key().to_string(),
                item.timestamp() / TICKS_PER_SECOND,
            ));
        }
        let position = first.position();
        drop(first);

        // A brand-new reader restored from the snapshot reads the rest.
        let mut second = store.reader_with(&["a", "b"], Some(tie_break())).unwrap();
        let mut warnings = Vec::new();
        second
            .seek_position(&position, &mut |w| warnings.push(w))
            .unwrap();
        assert!(warnings.is_empty(), "split {}: {:?}", k, warnings);

        let suffix = read_all(&mut second);
        let rejoined: Vec<_> = prefix.into_iter().chain(suffix).collect();
        assert_eq!(rejoined, full, "split at {}", k);
    }
}

#[test]
fn test_position_snapshot_survives_serialization() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 4);
    write_seconds(&store, "a", &[0, 2, 4, 6, 8]);
    write_seconds(&store, "b", &[1, 3, 5, 7, 9]);

    let mut reader = store.reader_with(&["a", "b"], Some(tie_break())).unwrap();
    reader.seek(0).unwrap();
    for _ in 0..4 {
        reader.read().unwrap().unwrap();
    }

    let json = serde_json::to_string(&reader.position()).unwrap();
    drop(reader);
    let position: ReadingPosition = serde_json::from_str(&json).unwrap();

    let mut resumed = store.reader_with(&["a", "b"], Some(tie_break())).unwrap();
    resumed
        .seek_position(&position, &mut |_| panic!("no warnings expected"))
        .unwrap();
    let rest: Vec<i64> = read_all(&mut resumed).into_iter().map(|(_, s)| s).collect();
    assert_eq!(rest, vec![4, 5, 6, 7, 8, 9]);
}

#[test]
fn test_restore_hash_mismatch_is_a_warning_not_an_error() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 10);
    write_seconds(&store, "a", &[0, 1, 2, 3]);

    let mut reader = store.reader_with(&["a"], Some(tie_break())).unwrap();
    reader.seek(0).unwrap();
    reader.read().unwrap().unwrap();
    reader.read().unwrap().unwrap();

    let mut position = reader.position();
    drop(reader);
    position.folders.get_mut("a").unwrap().verification_hash ^= 0xdead_beef;

    let mut resumed = store.reader_with(&["a"], Some(tie_break())).unwrap();
    let mut warnings = Vec::new();
    resumed
        .seek_position(&position, &mut |w| warnings.push(w))
        .unwrap();

    assert!(matches!(
        warnings.as_slice(),
        [RestoreWarning::HashMismatch { .. }]
    ));
    // Reading continues from the best approximation.
    let rest: Vec<i64> = read_all(&mut resumed).into_iter().map(|(_, s)| s).collect();
    assert_eq!(rest, vec![2, 3]);
}

#[test]
fn test_restore_missing_item_is_a_warning_not_an_error() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 10);
    write_seconds(&store, "a", &[0, 5, 5, 9]);

    let mut reader = store.reader_with(&["a"], Some(tie_break())).unwrap();
    reader.seek(0).unwrap();
    for _ in 0..2 {
        reader.read().unwrap().unwrap();
    }

    let mut position = reader.position();
    drop(reader);
    // Claim more same-timestamp items were read than exist.
    position.folders.get_mut("a").unwrap().count_at_time = 9;

    let mut resumed = store.reader_with(&["a"], Some(tie_break())).unwrap();
    let mut warnings = Vec::new();
    resumed
        .seek_position(&position, &mut |w| warnings.push(w))
        .unwrap();

    assert!(matches!(
        warnings.as_slice(),
        [RestoreWarning::ItemNotFound { .. }]
    ));
    // Positioned at the first item strictly after the recorded time.
    let rest: Vec<i64> = read_all(&mut resumed).into_iter().map(|(_, s)| s).collect();
    assert_eq!(rest, vec![9]);
}

#[test]
fn test_relative_position_applies_to_other_streams() {
    let dir = TempDir::new().unwrap();
    let store = store_with_file_size(&dir, 10);
    write_seconds(&store, "a", &[0, 2, 4]);
    write_seconds(&store, "b", &[1, 3, 5]);

    // A relative position carries only time and direction and can be
    // replayed against a newly chosen set of streams.
    let position = ReadingPosition::relative(
        3 * TICKS_PER_SECOND,
        timegrove::Direction::Forward,
    );
    let mut reader = store.reader_with(&["a", "b"], Some(tie_break())).unwrap();
    reader
        .seek_position(&position, &mut |_| panic!("no warnings expected"))
        .unwrap();
    let rest: Vec<i64> = read_all(&mut reader).into_iter().map(|(_, s)| s).collect();
    assert_eq!(rest, vec![3, 4, 5]);
}
