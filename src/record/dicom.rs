//! Minimal DICOM header reader.
//!
//! Reads the Part 10 preamble and file meta group, picks the dataset encoding from the
//! transfer syntax, then walks top-level elements until Pixel Data or the last tag the
//! schema wants. Sequences are skipped, never decoded. Text is decoded with the repertoire
//! named by Specific Character Set. Files without a preamble are read from offset 0 when
//! they start with the magic, the file meta group or an identifying dataset tag.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use super::schema::{ExtractedRecord, ExtractionSchema, FieldValue, Tag};
use super::{ReadError, RecordReader};
use crate::engine::tools::path_to_db_string;
use crate::utils::config::MAX_ELEMENT_VALUE_LEN;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
const MAX_SEQUENCE_DEPTH: usize = 16;
const READ_BUFFER: usize = 16 * 1024;

const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_BE: &str = "1.2.840.10008.1.2.2";
const DEFLATED_EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1.99";

const KNOWN_VRS: &[[u8; 2]] = &[
    *b"AE", *b"AS", *b"AT", *b"CS", *b"DA", *b"DS", *b"DT", *b"FD", *b"FL", *b"IS", *b"LO",
    *b"LT", *b"OB", *b"OD", *b"OF", *b"OL", *b"OV", *b"OW", *b"PN", *b"SH", *b"SL", *b"SQ",
    *b"SS", *b"ST", *b"SV", *b"TM", *b"UC", *b"UI", *b"UL", *b"UN", *b"UR", *b"US", *b"UT",
    *b"UV",
];

/// VRs whose explicit header has 2 reserved bytes and a 4-byte length.
const LONG_LENGTH_VRS: &[[u8; 2]] = &[
    *b"OB", *b"OD", *b"OF", *b"OL", *b"OV", *b"OW", *b"SQ", *b"SV", *b"UC", *b"UN", *b"UR",
    *b"UT", *b"UV",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    ImplicitLe,
    ExplicitLe,
    ExplicitBe,
}

impl Encoding {
    fn from_transfer_syntax(uid: &str) -> Result<Self, ReadError> {
        match uid {
            IMPLICIT_VR_LE => Ok(Encoding::ImplicitLe),
            EXPLICIT_VR_BE => Ok(Encoding::ExplicitBe),
            DEFLATED_EXPLICIT_VR_LE => Err(ReadError::NotARecord(
                "deflated transfer syntax is not supported".to_string(),
            )),
            // Explicit VR little endian and every compressed pixel syntax share this dataset encoding.
            _ => Ok(Encoding::ExplicitLe),
        }
    }

    fn big_endian(self) -> bool {
        matches!(self, Encoding::ExplicitBe)
    }

    fn explicit(self) -> bool {
        !matches!(self, Encoding::ImplicitLe)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Vr([u8; 2]);

impl Vr {
    fn parse(bytes: [u8; 2]) -> Option<Vr> {
        KNOWN_VRS.contains(&bytes).then_some(Vr(bytes))
    }

    fn has_long_length(self) -> bool {
        LONG_LENGTH_VRS.contains(&self.0)
    }
}

struct ElementHeader {
    tag: Tag,
    vr: Option<Vr>,
    len: u32,
}

/// Truncation inside an element means the file is not a usable record; other I/O errors
/// mean it could not be read at all.
fn io_err(e: io::Error) -> ReadError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ReadError::NotARecord("truncated header".to_string())
    } else {
        ReadError::Unreadable(e)
    }
}

fn malformed(msg: impl Into<String>) -> ReadError {
    ReadError::NotARecord(msg.into())
}

fn decode_tag(raw: [u8; 4], big_endian: bool) -> Tag {
    if big_endian {
        Tag(
            u16::from_be_bytes([raw[0], raw[1]]),
            u16::from_be_bytes([raw[2], raw[3]]),
        )
    } else {
        Tag(
            u16::from_le_bytes([raw[0], raw[1]]),
            u16::from_le_bytes([raw[2], raw[3]]),
        )
    }
}

/// Text repertoire declared by Specific Character Set (0008,0005).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Charset {
    /// Nothing declared, ISO_IR 6, or a repertoire we do not decode. Valid UTF-8 is kept,
    /// anything else is read as Latin-1.
    Default,
    Latin1,
    Utf8,
}

impl Charset {
    /// First recognized term of a possibly multi-valued declaration.
    fn from_declaration(value: &[u8]) -> Charset {
        value
            .split(|&b| b == b'\\')
            .map(|term| term.trim_ascii())
            .find_map(|term| match term {
                b"ISO_IR 100" | b"ISO 2022 IR 100" => Some(Charset::Latin1),
                b"ISO_IR 192" => Some(Charset::Utf8),
                _ => None,
            })
            .unwrap_or(Charset::Default)
    }

    fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => latin1(bytes),
            Charset::Default => match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(_) => latin1(bytes),
            },
        }
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

fn decode_text(bytes: &[u8], charset: Charset) -> String {
    charset
        .decode(bytes)
        .trim_matches(|c| c == '\0' || c == ' ')
        .to_string()
}

/// First value of an element. Binary numeric VRs become numbers; everything else is text.
fn decode_value(vr: Option<Vr>, bytes: &[u8], big_endian: bool, charset: Charset) -> FieldValue {
    macro_rules! num {
        ($t:ty, $n:expr) => {{
            let mut arr = [0u8; $n];
            arr.copy_from_slice(&bytes[..$n]);
            if big_endian {
                <$t>::from_be_bytes(arr)
            } else {
                <$t>::from_le_bytes(arr)
            }
        }};
    }
    match vr.map(|v| v.0) {
        Some(ref v) if v == b"US" && bytes.len() >= 2 => FieldValue::Integer(num!(u16, 2).into()),
        Some(ref v) if v == b"SS" && bytes.len() >= 2 => FieldValue::Integer(num!(i16, 2).into()),
        Some(ref v) if v == b"UL" && bytes.len() >= 4 => FieldValue::Integer(num!(u32, 4).into()),
        Some(ref v) if v == b"SL" && bytes.len() >= 4 => FieldValue::Integer(num!(i32, 4).into()),
        Some(ref v) if v == b"FL" && bytes.len() >= 4 => FieldValue::Real(num!(f32, 4).into()),
        Some(ref v) if v == b"FD" && bytes.len() >= 8 => FieldValue::Real(num!(f64, 8)),
        _ => FieldValue::Text(decode_text(bytes, charset)),
    }
}

struct HeaderParser<R> {
    src: R,
    encoding: Encoding,
}

impl<R: Read> HeaderParser<R> {
    /// Next raw tag, or `None` on a clean end of file between elements.
    fn read_raw_tag(&mut self) -> Result<Option<[u8; 4]>, ReadError> {
        let mut raw = [0u8; 4];
        let mut filled = 0;
        while filled < raw.len() {
            match self.src.read(&mut raw[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(malformed("truncated header")),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_err(e)),
            }
        }
        Ok(Some(raw))
    }

    fn next_tag(&mut self) -> Result<Tag, ReadError> {
        let raw = self
            .read_raw_tag()?
            .ok_or_else(|| malformed("unterminated sequence"))?;
        Ok(decode_tag(raw, self.encoding.big_endian()))
    }

    fn read_u16(&mut self) -> Result<u16, ReadError> {
        let mut b = [0u8; 2];
        self.src.read_exact(&mut b).map_err(io_err)?;
        Ok(if self.encoding.big_endian() {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn read_u32(&mut self) -> Result<u32, ReadError> {
        let mut b = [0u8; 4];
        self.src.read_exact(&mut b).map_err(io_err)?;
        Ok(if self.encoding.big_endian() {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    fn read_header(&mut self, tag: Tag) -> Result<ElementHeader, ReadError> {
        // Item and delimiter tags carry no VR in any encoding.
        if tag.group() == 0xFFFE {
            let len = self.read_u32()?;
            return Ok(ElementHeader { tag, vr: None, len });
        }
        if !self.encoding.explicit() {
            let len = self.read_u32()?;
            return Ok(ElementHeader { tag, vr: None, len });
        }
        let mut vr_bytes = [0u8; 2];
        self.src.read_exact(&mut vr_bytes).map_err(io_err)?;
        let vr = Vr::parse(vr_bytes).ok_or_else(|| malformed(format!("invalid VR at {tag}")))?;
        let len = if vr.has_long_length() {
            self.read_u16()?;
            self.read_u32()?
        } else {
            u32::from(self.read_u16()?)
        };
        Ok(ElementHeader {
            tag,
            vr: Some(vr),
            len,
        })
    }

    fn read_value(&mut self, len: u32) -> Result<Vec<u8>, ReadError> {
        if len > MAX_ELEMENT_VALUE_LEN {
            return Err(malformed(format!("element value of {len} bytes")));
        }
        let mut buf = vec![0u8; len as usize];
        self.src.read_exact(&mut buf).map_err(io_err)?;
        Ok(buf)
    }

    fn skip(&mut self, len: u32) -> Result<(), ReadError> {
        let copied = io::copy(&mut (&mut self.src).take(u64::from(len)), &mut io::sink())
            .map_err(io_err)?;
        if copied < u64::from(len) {
            return Err(malformed("truncated header"));
        }
        Ok(())
    }

    fn skip_value(&mut self, header: &ElementHeader, depth: usize) -> Result<(), ReadError> {
        if header.len != UNDEFINED_LENGTH {
            return self.skip(header.len);
        }
        if depth >= MAX_SEQUENCE_DEPTH {
            return Err(malformed(format!("sequences nested too deep at {}", header.tag)));
        }
        // UN of undefined length is always encoded implicit VR little endian inside.
        if header.vr.is_some_and(|v| &v.0 == b"UN") {
            let saved = self.encoding;
            self.encoding = Encoding::ImplicitLe;
            let r = self.skip_undefined_sequence(depth + 1);
            self.encoding = saved;
            return r;
        }
        self.skip_undefined_sequence(depth + 1)
    }

    fn skip_undefined_sequence(&mut self, depth: usize) -> Result<(), ReadError> {
        loop {
            let tag = self.next_tag()?;
            let header = self.read_header(tag)?;
            match tag {
                Tag::SEQUENCE_DELIMITATION => return Ok(()),
                Tag::ITEM if header.len == UNDEFINED_LENGTH => self.skip_undefined_item(depth)?,
                Tag::ITEM => self.skip(header.len)?,
                other => return Err(malformed(format!("unexpected {other} inside sequence"))),
            }
        }
    }

    fn skip_undefined_item(&mut self, depth: usize) -> Result<(), ReadError> {
        loop {
            let tag = self.next_tag()?;
            let header = self.read_header(tag)?;
            if tag == Tag::ITEM_DELIMITATION {
                return Ok(());
            }
            self.skip_value(&header, depth)?;
        }
    }

    /// File meta group (always explicit VR LE). Returns the transfer syntax and the raw
    /// first dataset tag, which was already consumed.
    fn read_meta_group(&mut self) -> Result<(Option<String>, Option<[u8; 4]>), ReadError> {
        let mut transfer_syntax = None;
        loop {
            let Some(raw) = self.read_raw_tag()? else {
                return Ok((transfer_syntax, None));
            };
            let tag = decode_tag(raw, false);
            if tag.group() != 0x0002 {
                return Ok((transfer_syntax, Some(raw)));
            }
            let header = self.read_header(tag)?;
            if tag == Tag::TRANSFER_SYNTAX_UID && header.len != UNDEFINED_LENGTH {
                let bytes = self.read_value(header.len)?;
                transfer_syntax = Some(decode_text(&bytes, Charset::Default));
            } else {
                self.skip_value(&header, 0)?;
            }
        }
    }

    fn read_dataset(
        &mut self,
        mut pending: Option<[u8; 4]>,
        wanted: &BTreeSet<Tag>,
    ) -> Result<HashMap<Tag, FieldValue>, ReadError> {
        let mut out = HashMap::with_capacity(wanted.len());
        let Some(&last_wanted) = wanted.last() else {
            return Ok(out);
        };
        let mut charset = Charset::Default;
        loop {
            let raw = match pending.take() {
                Some(raw) => raw,
                None => match self.read_raw_tag()? {
                    Some(raw) => raw,
                    None => break,
                },
            };
            let tag = decode_tag(raw, self.encoding.big_endian());
            if tag >= Tag::PIXEL_DATA || tag > last_wanted {
                break;
            }
            let header = self.read_header(tag)?;
            if tag == Tag::SPECIFIC_CHARACTER_SET && header.len != UNDEFINED_LENGTH {
                let bytes = self.read_value(header.len)?;
                charset = Charset::from_declaration(&bytes);
                if wanted.contains(&tag) {
                    out.insert(tag, FieldValue::Text(decode_text(&bytes, Charset::Default)));
                }
            } else if wanted.contains(&tag) && header.len != UNDEFINED_LENGTH {
                let bytes = self.read_value(header.len)?;
                out.insert(
                    tag,
                    decode_value(header.vr, &bytes, self.encoding.big_endian(), charset),
                );
            } else {
                self.skip_value(&header, 0)?;
            }
        }
        Ok(out)
    }
}

/// File meta group, then the dataset in the encoding it names.
fn read_with_meta<R: Read>(
    src: R,
    wanted: &BTreeSet<Tag>,
) -> Result<HashMap<Tag, FieldValue>, ReadError> {
    let mut parser = HeaderParser {
        src,
        encoding: Encoding::ExplicitLe,
    };
    let (transfer_syntax, first) = parser.read_meta_group()?;
    parser.encoding = match transfer_syntax {
        Some(uid) => Encoding::from_transfer_syntax(&uid)?,
        None => Encoding::ImplicitLe,
    };
    parser.read_dataset(first, wanted)
}

/// Read header elements listed in `wanted` from `src`. Stops before pixel data.
pub fn parse_header<R: Read>(
    mut src: R,
    wanted: &BTreeSet<Tag>,
) -> Result<HashMap<Tag, FieldValue>, ReadError> {
    let mut prefix = Vec::with_capacity(PREAMBLE_LEN + MAGIC.len());
    (&mut src)
        .take((PREAMBLE_LEN + MAGIC.len()) as u64)
        .read_to_end(&mut prefix)
        .map_err(io_err)?;

    if prefix.len() == PREAMBLE_LEN + MAGIC.len() && &prefix[PREAMBLE_LEN..] == MAGIC {
        return read_with_meta(src, wanted);
    }

    // No preamble: the magic, the meta group or a bare dataset may start at offset 0.
    if prefix.len() < 8 {
        return Err(malformed("file too short"));
    }
    if &prefix[..MAGIC.len()] == MAGIC {
        let mut rest = Cursor::new(prefix);
        rest.set_position(MAGIC.len() as u64);
        return read_with_meta(rest.chain(src), wanted);
    }
    let first = decode_tag([prefix[0], prefix[1], prefix[2], prefix[3]], false);
    if first.group() == 0x0002 {
        return read_with_meta(Cursor::new(prefix).chain(src), wanted);
    }
    if first.group() != 0x0008 {
        return Err(malformed("missing DICM preamble"));
    }
    let encoding = if Vr::parse([prefix[4], prefix[5]]).is_some() {
        Encoding::ExplicitLe
    } else {
        Encoding::ImplicitLe
    };
    let mut parser = HeaderParser {
        src: Cursor::new(prefix).chain(src),
        encoding,
    };
    parser.read_dataset(None, wanted)
}

/// [`RecordReader`] for DICOM files, driven by an [`ExtractionSchema`].
pub struct DicomHeaderReader {
    schema: Arc<ExtractionSchema>,
    wanted: BTreeSet<Tag>,
}

impl DicomHeaderReader {
    pub fn new(schema: Arc<ExtractionSchema>) -> Self {
        let wanted = schema.wanted_tags();
        DicomHeaderReader { schema, wanted }
    }
}

impl RecordReader for DicomHeaderReader {
    fn read(&self, path: &Path) -> Result<ExtractedRecord, ReadError> {
        let file = File::open(path)?;
        let elements = parse_header(BufReader::with_capacity(READ_BUFFER, file), &self.wanted)?;
        if let Some(required) = self.schema.required()
            && !elements.contains_key(&required)
        {
            return Err(ReadError::NotARecord(format!(
                "missing required element {required}"
            )));
        }
        Ok(self
            .schema
            .build_record(path_to_db_string(path), &elements))
    }
}
