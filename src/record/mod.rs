//! Record reader: maps a file path to an [`ExtractedRecord`] or a skip reason.

pub mod dicom;
pub mod schema;

pub use dicom::{DicomHeaderReader, parse_header};
pub use schema::{
    ABSENT_SENTINEL, ExtractedRecord, ExtractionSchema, FieldDescriptor, FieldSource, FieldValue,
    IDENTITY_FIELD, SchemaError, Tag,
};

use std::io;
use std::path::Path;
use thiserror::Error;

/// Why a candidate produced no record. The pipeline treats every variant the same way
/// (skip, count, log); the variants exist for diagnostics.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("not a record: {0}")]
    NotARecord(String),
    #[error("unreadable: {0}")]
    Unreadable(#[from] io::Error),
    #[error("reader panicked: {0}")]
    Panicked(String),
}

/// Parses one candidate. Implementations are called concurrently from the worker pool and
/// must not hold shared mutable state.
pub trait RecordReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<ExtractedRecord, ReadError>;
}
