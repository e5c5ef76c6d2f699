//! Shared fixtures: minimal Part 10 writer, failure-injecting reader and store.
#![allow(dead_code)]

use dcmdex::record::{DicomHeaderReader, ExtractedRecord, ExtractionSchema, ReadError, RecordReader};
use dcmdex::{MetadataStore, Opts, SqliteStore, StoreError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

/// Header content for one generated file.
pub struct DicomFile<'a> {
    pub sop_class: Option<&'a str>,
    pub modality: &'a str,
    pub patient_id: &'a str,
    pub manufacturer: Option<&'a str>,
}

impl Default for DicomFile<'_> {
    fn default() -> Self {
        DicomFile {
            sop_class: Some(CT_IMAGE_STORAGE),
            modality: "CT",
            patient_id: "PID-1",
            manufacturer: None,
        }
    }
}

fn padded(value: &str, pad: u8) -> Vec<u8> {
    let mut v = value.as_bytes().to_vec();
    if v.len() % 2 == 1 {
        v.push(pad);
    }
    v
}

fn element(group: u16, elem: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + value.len());
    out.extend(group.to_le_bytes());
    out.extend(elem.to_le_bytes());
    out.extend(vr);
    if matches!(vr, b"OB" | b"OW" | b"SQ" | b"UN" | b"UT") {
        out.extend([0, 0]);
        out.extend((value.len() as u32).to_le_bytes());
    } else {
        out.extend((value.len() as u16).to_le_bytes());
    }
    out.extend(value);
    out
}

/// Explicit VR little endian Part 10 file with a few header elements and tiny pixel data.
pub fn part10_bytes(f: &DicomFile) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out.extend(b"DICM");
    out.extend(element(0x0002, 0x0010, b"UI", &padded(EXPLICIT_VR_LE, 0)));
    if let Some(sop) = f.sop_class {
        out.extend(element(0x0008, 0x0016, b"UI", &padded(sop, 0)));
    }
    out.extend(element(0x0008, 0x0020, b"DA", b"20240131"));
    out.extend(element(0x0008, 0x0060, b"CS", &padded(f.modality, b' ')));
    if let Some(m) = f.manufacturer {
        out.extend(element(0x0008, 0x0070, b"LO", &padded(m, b' ')));
    }
    out.extend(element(0x0010, 0x0020, b"LO", &padded(f.patient_id, b' ')));
    out.extend(element(0x7FE0, 0x0010, b"OW", &[0u8; 16]));
    out
}

pub fn write_dicom(path: &Path, f: &DicomFile) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, part10_bytes(f)).unwrap();
}

/// `n` valid files spread over a few subdirectories of `dir`.
pub fn write_valid_tree(dir: &Path, n: usize) -> Vec<PathBuf> {
    (0..n)
        .map(|i| {
            let path = dir.join(format!("series{}", i % 3)).join(format!("img{i:04}.dcm"));
            let patient_id = format!("PID-{i}");
            write_dicom(
                &path,
                &DicomFile {
                    patient_id: &patient_id,
                    ..DicomFile::default()
                },
            );
            path
        })
        .collect()
}

/// `n` files with the candidate suffix that are not DICOM.
pub fn write_garbage(dir: &Path, n: usize) -> Vec<PathBuf> {
    fs::create_dir_all(dir).unwrap();
    (0..n)
        .map(|i| {
            let path = dir.join(format!("broken{i:02}.dcm"));
            fs::write(&path, format!("this is not a dicom file #{i}, just some text")).unwrap();
            path
        })
        .collect()
}

pub fn write_list(path: &Path, entries: &[PathBuf]) {
    let mut s = String::new();
    for e in entries {
        s.push_str(&e.to_string_lossy());
        s.push('\n');
    }
    fs::write(path, s).unwrap();
}

/// Options for a quiet test run.
pub fn test_opts(inputs: Vec<PathBuf>, db_path: &Path) -> Opts {
    Opts {
        inputs,
        db_path: db_path.to_path_buf(),
        workers: Some(4),
        progress_interval: 0,
        ..Opts::default()
    }
}

pub fn schema() -> Arc<ExtractionSchema> {
    Arc::new(ExtractionSchema::dicom_default())
}

pub fn open_store(db_path: &Path) -> SqliteStore {
    SqliteStore::open(db_path, schema(), std::time::Duration::from_secs(5)).unwrap()
}

pub fn stored_paths(db_path: &Path) -> HashSet<String> {
    open_store(db_path).known_paths().unwrap()
}

/// Delegates to the DICOM reader but fails every `n`th call.
pub struct FailEveryNth {
    inner: DicomHeaderReader,
    n: usize,
    calls: AtomicUsize,
}

impl FailEveryNth {
    pub fn new(n: usize) -> Self {
        FailEveryNth {
            inner: DicomHeaderReader::new(schema()),
            n,
            calls: AtomicUsize::new(0),
        }
    }
}

impl RecordReader for FailEveryNth {
    fn read(&self, path: &Path) -> Result<ExtractedRecord, ReadError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call.is_multiple_of(self.n) {
            return Err(ReadError::Unreadable(std::io::Error::other("induced failure")));
        }
        self.inner.read(path)
    }
}

/// Store wrapper that fails the `fail_batch`th insert (1-based) and optionally every commit.
pub struct FlakyStore<S> {
    pub inner: S,
    pub fail_batch: Option<usize>,
    pub fail_commit: bool,
    calls: usize,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S, fail_batch: Option<usize>, fail_commit: bool) -> Self {
        FlakyStore {
            inner,
            fail_batch,
            fail_commit,
            calls: 0,
        }
    }
}

impl<S: MetadataStore> MetadataStore for FlakyStore<S> {
    fn contains(&self, file_path: &str) -> Result<bool, StoreError> {
        self.inner.contains(file_path)
    }

    fn known_paths(&self) -> Result<HashSet<String>, StoreError> {
        self.inner.known_paths()
    }

    fn insert_batch(&mut self, records: &[ExtractedRecord]) -> Result<usize, StoreError> {
        self.calls += 1;
        if self.fail_batch == Some(self.calls) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        self.inner.insert_batch(records)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        self.inner.commit()
    }

    fn row_count(&self) -> Result<u64, StoreError> {
        self.inner.row_count()
    }

    fn close(self) -> Result<(), StoreError> {
        self.inner.close()
    }
}
