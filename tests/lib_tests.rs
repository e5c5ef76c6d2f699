mod common;

use common::*;
use dcmdex::engine::tools::{
    has_candidate_extension, is_os_hidden_file, normalize_extensions, path_to_db_string,
};
use dcmdex::record::{
    ABSENT_SENTINEL, DicomHeaderReader, ExtractionSchema, FieldDescriptor, FieldValue,
    IDENTITY_FIELD, ReadError, RecordReader, SchemaError,
};
use dcmdex::{FilterStrategy, InputMode, Opts, Topology};
use std::path::PathBuf;

// --- path helpers ---

#[test]
fn test_path_to_db_string_keeps_path() {
    assert_eq!(
        path_to_db_string(&PathBuf::from("/data/ct/img1.dcm")),
        "/data/ct/img1.dcm"
    );
}

#[test]
fn test_hidden_and_extension_filters() {
    let exts = normalize_extensions(&[".dcm".to_string()]);
    assert!(has_candidate_extension(&PathBuf::from("/x/A.DCM"), &exts));
    assert!(!has_candidate_extension(&PathBuf::from("/x/a.txt"), &exts));
    assert!(is_os_hidden_file(&PathBuf::from("/x/.DS_Store")));
}

// --- options ---

#[test]
fn test_mode_defaults() {
    let tree = Opts::default();
    assert_eq!(tree.effective_topology(), Topology::Interleaved);
    assert_eq!(tree.effective_filter(), FilterStrategy::Lookup);
    let list = Opts {
        input_mode: InputMode::List,
        ..Opts::default()
    };
    assert_eq!(list.effective_topology(), Topology::Staged);
    assert_eq!(list.effective_filter(), FilterStrategy::Snapshot);
    assert!(tree.effective_workers() >= 1);
}

#[test]
fn test_validate_rejects_unusable_options() {
    assert!(Opts::default().validate().is_err());
    let zero_batch = Opts {
        inputs: vec![PathBuf::from(".")],
        batch_size: 0,
        ..Opts::default()
    };
    assert!(zero_batch.validate().is_err());
    let ok = Opts {
        inputs: vec![PathBuf::from(".")],
        ..Opts::default()
    };
    assert!(ok.validate().is_ok());
}

// --- schema ---

#[test]
fn test_custom_schema_must_start_with_identity() {
    let err = ExtractionSchema::new(vec![FieldDescriptor::tag("modality", 0x0008, 0x0060)], None)
        .err()
        .unwrap();
    assert!(matches!(err, SchemaError::IdentityNotFirst(_)));

    let ok = ExtractionSchema::new(
        vec![
            FieldDescriptor::file_path(),
            FieldDescriptor::tag("rows", 0x0028, 0x0010),
        ],
        None,
    )
    .unwrap();
    assert_eq!(ok.column_names(), vec![IDENTITY_FIELD, "rows"]);
}

// --- reader on real files ---

#[test]
fn test_reader_extracts_full_key_set() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("a.dcm");
    write_dicom(
        &path,
        &DicomFile {
            patient_id: "P-77",
            ..DicomFile::default()
        },
    );
    let s = schema();
    let reader = DicomHeaderReader::new(s.clone());
    let record = reader.read(&path).unwrap();
    assert_eq!(record.values().len(), s.len());
    assert_eq!(record.file_path(), path_to_db_string(&path));
    assert_eq!(
        record.get(&s, "patient_id"),
        Some(&FieldValue::Text("P-77".to_string()))
    );
    assert_eq!(record.get(&s, "institution_name"), Some(&FieldValue::Absent));
    let params = record.to_sql_params(&s);
    assert_eq!(params.len(), s.len());
    assert_eq!(
        params[s.position("institution_name").unwrap()],
        rusqlite::types::Value::Text(ABSENT_SENTINEL.to_string())
    );
}

#[test]
fn test_reader_failure_kinds() {
    let tmp = tempfile::tempdir().unwrap();
    let reader = DicomHeaderReader::new(schema());
    assert!(matches!(
        reader.read(&tmp.path().join("missing.dcm")),
        Err(ReadError::Unreadable(_))
    ));
    let garbage = write_garbage(tmp.path(), 1);
    assert!(matches!(
        reader.read(&garbage[0]),
        Err(ReadError::NotARecord(_))
    ));
    let no_sop = tmp.path().join("nosop.dcm");
    write_dicom(
        &no_sop,
        &DicomFile {
            sop_class: None,
            ..DicomFile::default()
        },
    );
    assert!(matches!(reader.read(&no_sop), Err(ReadError::NotARecord(_))));
}
