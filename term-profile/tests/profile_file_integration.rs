//! Integration tests for writing and reading profile files.

use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;
use term_profile::metrics::MetricKind;
use term_profile::prelude::*;

fn two_column_profile() -> DatasetProfileView {
    // "id" carries counts only; "score" carries the standard fractional set.
    let resolver = DeclarativeResolver::new().with_column("id", [MetricKind::Counts]);
    let schema = DatasetSchema::new()
        .with_column("id", ColumnType::Integral)
        .with_column("score", ColumnType::Fractional)
        .with_resolver(Arc::new(resolver));

    let mut profile = DatasetProfile::new(schema)
        .unwrap()
        .with_dataset_timestamp(Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 15).unwrap());
    profile.set_metadata("pipeline", "nightly");
    profile
        .track("id", &[Value::Int(1), Value::Int(2), Value::Null])
        .unwrap();
    profile
        .track(
            "score",
            &(0..500)
                .map(|i| Value::Float(i as f64 / 7.0))
                .chain([Value::Null, Value::Float(f64::NAN)])
                .collect::<Vec<_>>(),
        )
        .unwrap();
    profile.view()
}

#[test]
fn test_file_round_trip_with_differing_metric_sets() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("profile.bin");
    let view = two_column_profile();

    view.write(&path).unwrap();
    let read = DatasetProfileView::read(&path).unwrap();

    assert_eq!(read.dataset_timestamp(), view.dataset_timestamp());
    assert_eq!(read.creation_timestamp(), view.creation_timestamp());
    assert_eq!(read.metadata(), view.metadata());
    for name in ["id", "score"] {
        assert_eq!(
            read.get_column(name).unwrap().to_wire(),
            view.get_column(name).unwrap().to_wire(),
            "column {name}"
        );
    }
    assert_eq!(read, view);

    let id = read.get_column("id").unwrap();
    assert_eq!(id.metric_kinds().collect::<Vec<_>>(), vec![MetricKind::Counts]);
    let score = read.get_column("score").unwrap();
    assert_eq!(score.counts().unwrap().null.value(), 2);
    assert_eq!(score.distribution().unwrap().n(), 500);
}

#[test]
fn test_file_bytes_are_deterministic() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("a.bin");
    let second = dir.path().join("b.bin");
    let view = two_column_profile();

    view.write(&first).unwrap();
    DatasetProfileView::read(&first)
        .unwrap()
        .write(&second)
        .unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    assert_eq!(fs::read(&first).unwrap(), view.serialize().unwrap());
}

#[test]
fn test_truncated_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("profile.bin");
    let view = two_column_profile();
    view.write(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    let err = DatasetProfileView::read(&path).unwrap_err();
    assert!(err.is_corruption(), "{err}");
    let message = err.to_string();
    assert!(message.contains("expecting buffer length of"), "{message}");
    assert!(message.contains("score"), "{message}");
}

#[test]
fn test_truncation_inside_first_chunk_header() {
    let view = two_column_profile();
    let bytes = view.serialize().unwrap();
    let header_len = {
        let reader = DatasetProfileReader::open(Cursor::new(bytes.as_slice())).unwrap();
        bytes.len() as u64 - reader.header().length
    };

    // Keep the header and a single byte of the chunk region.
    let cut = &bytes[..header_len as usize + 1];
    let err = DatasetProfileView::deserialize(cut).unwrap_err();
    assert!(err.is_corruption(), "{err}");
}

#[test]
fn test_single_column_read_skips_others() {
    let view = two_column_profile();
    let mut bytes = view.serialize().unwrap();

    let (header_len, id_offset) = {
        let reader = DatasetProfileReader::open(Cursor::new(bytes.as_slice())).unwrap();
        let header = reader.header();
        (
            bytes.len() as u64 - header.length,
            header.column_offsets["id"].offsets[0],
        )
    };
    // Corrupt the "id" chunk type; "score" stays readable on its own.
    let type_byte = (header_len + id_offset + 2) as usize;
    bytes[type_byte] = 0;

    let mut reader = DatasetProfileReader::open(Cursor::new(bytes.clone())).unwrap();
    let score = reader.read_column("score").unwrap().unwrap();
    assert_eq!(&score, view.get_column("score").unwrap());
    assert!(matches!(
        reader.read_column("id"),
        Err(ProfileError::Deserialization(_))
    ));
    assert!(DatasetProfileView::deserialize(&bytes).is_err());
}

#[test]
fn test_merge_then_write() {
    let left = two_column_profile();
    let mut other = DatasetProfile::new(DatasetSchema::new()).unwrap();
    other
        .track("extra", &[Value::from("x"), Value::from("y")])
        .unwrap();
    other.track("score", &[Value::Float(1000.0)]).unwrap();
    let right = other.view();

    let merged = left.merge(&right).unwrap();
    assert_eq!(
        merged.column_names().collect::<Vec<_>>(),
        vec!["extra", "id", "score"]
    );
    let score = merged.get_column("score").unwrap();
    assert_eq!(score.counts().unwrap().n.value(), 503);
    // The right-hand "score" was resolved as an unknown column without a distribution.
    assert_eq!(score.distribution().unwrap().n(), 500);

    let dir = tempdir().unwrap();
    let path = dir.path().join("merged.bin");
    merged.write(&path).unwrap();
    let read = DatasetProfileView::read(&path).unwrap();
    assert_eq!(read, merged);

    let summaries: BTreeMap<String, _> = read
        .columns()
        .iter()
        .map(|(name, column)| (name.clone(), column.summary()))
        .collect();
    assert_eq!(
        summaries["extra"]["types/string"],
        MetricValue::Long(2)
    );
}

#[test]
fn test_read_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let err = DatasetProfileView::read(dir.path().join("nope.bin")).unwrap_err();
    assert!(matches!(err, ProfileError::Io(_)));
}
