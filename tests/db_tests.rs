//! Store tests: idempotent open, insert-or-ignore, savepoint rollback, commit boundary.

mod common;

use common::*;
use dcmdex::record::{FieldValue, Tag};
use dcmdex::{MetadataStore, SqliteStore, StoreError};
use std::collections::HashMap;
use std::time::Duration;

fn record(path: &str) -> dcmdex::ExtractedRecord {
    let mut elements = HashMap::new();
    elements.insert(Tag(0x0008, 0x0060), FieldValue::Text("MR".to_string()));
    schema().build_record(path.to_string(), &elements)
}

#[test]
fn test_open_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("meta.db");
    {
        let mut store = open_store(&db);
        store.insert_batch(&[record("/a.dcm")]).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }
    let store = open_store(&db);
    assert_eq!(store.row_count().unwrap(), 1);
    assert!(store.contains("/a.dcm").unwrap());
    let mode: String = store
        .connection()
        .query_row("PRAGMA journal_mode", [], |r| r.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn test_open_in_missing_directory_is_init_error() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("missing/meta.db");
    let err = SqliteStore::open(&db, schema(), Duration::from_secs(1))
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::Init { .. }));
}

#[test]
fn test_incompatible_existing_table_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("old.db");
    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute_batch("CREATE TABLE dicom_metadata (file_path TEXT PRIMARY KEY, modality TEXT);")
            .unwrap();
    }
    let err = SqliteStore::open(&db, schema(), Duration::from_secs(1))
        .err()
        .unwrap();
    match err {
        StoreError::IncompatibleTable { missing, .. } => {
            assert!(missing.contains(&"study_date".to_string()));
            assert!(!missing.contains(&"modality".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_failed_batch_rolls_back_and_keeps_earlier_batches() {
    let mut store = SqliteStore::open_in_memory(schema()).unwrap();
    assert_eq!(store.insert_batch(&[record("/a.dcm"), record("/b.dcm")]).unwrap(), 2);

    // A trigger rejects /d.dcm, so the second batch fails after /c.dcm was staged.
    let bad = vec![record("/c.dcm"), record("/d.dcm")];
    store
        .connection()
        .execute_batch("CREATE TRIGGER fail_d BEFORE INSERT ON dicom_metadata WHEN NEW.file_path = '/d.dcm' BEGIN SELECT RAISE(ABORT, 'induced'); END;")
        .unwrap();
    assert!(store.insert_batch(&bad).is_err());
    assert!(!store.contains("/c.dcm").unwrap());

    assert_eq!(store.insert_batch(&[record("/e.dcm")]).unwrap(), 1);
    store.commit().unwrap();
    let mut known: Vec<String> = store.known_paths().unwrap().into_iter().collect();
    known.sort();
    assert_eq!(known, vec!["/a.dcm", "/b.dcm", "/e.dcm"]);
}

#[test]
fn test_uncommitted_batches_are_discarded_on_close() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("meta.db");
    let mut store = open_store(&db);
    store.insert_batch(&[record("/a.dcm"), record("/b.dcm")]).unwrap();
    assert_eq!(store.row_count().unwrap(), 2);
    store.close().unwrap();
    assert_eq!(open_store(&db).row_count().unwrap(), 0);
}

#[test]
fn test_first_write_wins() {
    let mut store = SqliteStore::open_in_memory(schema()).unwrap();
    let mut ct = HashMap::new();
    ct.insert(Tag(0x0008, 0x0060), FieldValue::Text("CT".to_string()));
    let first = schema().build_record("/x.dcm".to_string(), &ct);
    assert_eq!(store.insert_batch(&[first]).unwrap(), 1);
    assert_eq!(store.insert_batch(&[record("/x.dcm")]).unwrap(), 0);
    let modality: String = store
        .connection()
        .query_row("SELECT modality FROM dicom_metadata", [], |r| r.get(0))
        .unwrap();
    assert_eq!(modality, "CT");
}
