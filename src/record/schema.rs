//! Table-driven extraction schema: one ordered list of field descriptors shared by the
//! header reader and the table-creation / insert SQL.

use rusqlite::types::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Name of the identity column. Every schema starts with it.
pub const IDENTITY_FIELD: &str = "file_path";

/// Default absence sentinel stored for header fields missing from a file.
pub const ABSENT_SENTINEL: &str = "N/A";

/// DICOM data element tag `(group, element)`. Ordering follows the on-disk ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);
    pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
    pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
    pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
    pub const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);

    pub fn group(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

/// Where a field's value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldSource {
    /// The candidate path itself (the identity).
    FilePath,
    /// A header element.
    Tag(Tag),
}

/// One column of the extraction schema.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub source: FieldSource,
    /// Stored when the source element is missing.
    pub absent: &'static str,
}

impl FieldDescriptor {
    pub const fn tag(name: &'static str, group: u16, element: u16) -> Self {
        FieldDescriptor {
            name,
            source: FieldSource::Tag(Tag(group, element)),
            absent: ABSENT_SENTINEL,
        }
    }

    pub const fn file_path() -> Self {
        FieldDescriptor {
            name: IDENTITY_FIELD,
            source: FieldSource::FilePath,
            absent: ABSENT_SENTINEL,
        }
    }
}

/// Scalar value of one extracted attribute. `Absent` is distinct from any text value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Absent,
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// SQL value to bind; `Absent` becomes the column's sentinel.
    pub fn to_sql_value(&self, sentinel: &str) -> Value {
        match self {
            FieldValue::Text(s) => Value::Text(s.clone()),
            FieldValue::Integer(i) => Value::Integer(*i),
            FieldValue::Real(r) => Value::Real(*r),
            FieldValue::Absent => Value::Text(sentinel.to_string()),
        }
    }
}

/// One row ready for the store: exactly one value per schema field, in schema order.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedRecord {
    values: Vec<FieldValue>,
}

impl ExtractedRecord {
    /// The identity value (first field).
    pub fn file_path(&self) -> &str {
        match self.values.first() {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Value of the field called `name`, if the schema has it.
    pub fn get(&self, schema: &ExtractionSchema, name: &str) -> Option<&FieldValue> {
        schema.position(name).and_then(|i| self.values.get(i))
    }

    /// Bindable parameters in column order.
    pub fn to_sql_params(&self, schema: &ExtractionSchema) -> Vec<Value> {
        self.values
            .iter()
            .zip(schema.fields())
            .map(|(v, f)| v.to_sql_value(f.absent))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema has no fields")]
    Empty,
    #[error("first field must be `file_path` sourced from the file path, found `{0}`")]
    IdentityNotFirst(String),
    #[error("only the identity field may be sourced from the file path (`{0}`)")]
    ExtraFilePath(String),
    #[error("invalid column name `{0}`")]
    InvalidName(String),
    #[error("duplicate column name `{0}`")]
    DuplicateName(String),
}

/// Ordered field descriptors plus the tag whose presence marks a file as a record.
#[derive(Clone, Debug)]
pub struct ExtractionSchema {
    fields: Vec<FieldDescriptor>,
    required: Option<Tag>,
    positions: HashMap<&'static str, usize>,
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ExtractionSchema {
    pub fn new(fields: Vec<FieldDescriptor>, required: Option<Tag>) -> Result<Self, SchemaError> {
        let first = fields.first().ok_or(SchemaError::Empty)?;
        if first.name != IDENTITY_FIELD || first.source != FieldSource::FilePath {
            return Err(SchemaError::IdentityNotFirst(first.name.to_string()));
        }
        let mut positions = HashMap::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            if !is_sql_identifier(f.name) {
                return Err(SchemaError::InvalidName(f.name.to_string()));
            }
            if i > 0 && f.source == FieldSource::FilePath {
                return Err(SchemaError::ExtraFilePath(f.name.to_string()));
            }
            if positions.insert(f.name, i).is_some() {
                return Err(SchemaError::DuplicateName(f.name.to_string()));
            }
        }
        Ok(ExtractionSchema {
            fields,
            required,
            positions,
        })
    }

    /// The header fields collected by the original DICOM metadata tool.
    pub fn dicom_default() -> Self {
        let fields = vec![
            FieldDescriptor::file_path(),
            FieldDescriptor::tag("study_date", 0x0008, 0x0020),
            FieldDescriptor::tag("series_date", 0x0008, 0x0021),
            FieldDescriptor::tag("acquisition_date", 0x0008, 0x0022),
            FieldDescriptor::tag("content_date", 0x0008, 0x0023),
            FieldDescriptor::tag("study_time", 0x0008, 0x0030),
            FieldDescriptor::tag("series_time", 0x0008, 0x0031),
            FieldDescriptor::tag("acquisition_time", 0x0008, 0x0032),
            FieldDescriptor::tag("modality", 0x0008, 0x0060),
            FieldDescriptor::tag("manufacturer", 0x0008, 0x0070),
            FieldDescriptor::tag("institution_name", 0x0008, 0x0080),
            FieldDescriptor::tag("study_description", 0x0008, 0x1030),
            FieldDescriptor::tag("series_description", 0x0008, 0x103E),
            FieldDescriptor::tag("patient_id", 0x0010, 0x0020),
            FieldDescriptor::tag("patient_sex", 0x0010, 0x0040),
            FieldDescriptor::tag("patient_age", 0x0010, 0x1010),
            FieldDescriptor::tag("slice_thickness", 0x0018, 0x0050),
            FieldDescriptor::tag("study_instance_uid", 0x0020, 0x000D),
            FieldDescriptor::tag("series_instance_uid", 0x0020, 0x000E),
        ];
        Self::with_positions(fields, Some(Tag::SOP_CLASS_UID))
    }

    fn with_positions(fields: Vec<FieldDescriptor>, required: Option<Tag>) -> Self {
        let positions = fields.iter().enumerate().map(|(i, f)| (f.name, i)).collect();
        ExtractionSchema {
            fields,
            required,
            positions,
        }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn required(&self) -> Option<Tag> {
        self.required
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Every tag the reader has to capture: field sources plus the required tag.
    pub fn wanted_tags(&self) -> BTreeSet<Tag> {
        self.fields
            .iter()
            .filter_map(|f| match f.source {
                FieldSource::Tag(t) => Some(t),
                FieldSource::FilePath => None,
            })
            .chain(self.required)
            .collect()
    }

    /// `CREATE TABLE IF NOT EXISTS`: identity is the text primary key, the rest are nullable text.
    pub fn create_table_sql(&self, table: &str) -> String {
        let columns: Vec<String> = self
            .fields
            .iter()
            .map(|f| match f.source {
                FieldSource::FilePath => format!("    {} TEXT PRIMARY KEY", f.name),
                FieldSource::Tag(_) => format!("    {} TEXT", f.name),
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n{}\n);",
            columns.join(",\n")
        )
    }

    /// First write wins: conflicting identities are ignored, never overwritten.
    pub fn insert_sql(&self, table: &str) -> String {
        let placeholders: Vec<String> = (1..=self.fields.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT OR IGNORE INTO {table} ({}) VALUES ({})",
            self.column_names().join(", "),
            placeholders.join(", ")
        )
    }

    /// Build a record with one value per field. Missing elements become [`FieldValue::Absent`].
    pub fn build_record(
        &self,
        file_path: String,
        elements: &HashMap<Tag, FieldValue>,
    ) -> ExtractedRecord {
        let mut file_path = Some(file_path);
        let values = self
            .fields
            .iter()
            .map(|f| match f.source {
                FieldSource::FilePath => {
                    FieldValue::Text(file_path.take().unwrap_or_default())
                }
                FieldSource::Tag(tag) => elements.get(&tag).cloned().unwrap_or(FieldValue::Absent),
            })
            .collect();
        ExtractedRecord { values }
    }

    /// Names of columns that exist in the schema but not in `existing` (for diagnostics).
    pub fn missing_columns(&self, existing: &HashSet<String>) -> Vec<&'static str> {
        self.fields
            .iter()
            .map(|f| f.name)
            .filter(|n| !existing.contains(*n))
            .collect()
    }
}
