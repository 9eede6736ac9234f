//! Record and metadata encoding.
//!
//! ```text
//! record:   id(u64) + components(f32 * dimension) + metadata_len(u32) + metadata blob
//! metadata: entry_count(u32) + entries (ascending key order)
//! entry:    key_len(u32) + key(UTF-8) + tag(u8) + value
//! value:    tag 0 = String  len(u32) + UTF-8
//!           tag 1 = Number  f64
//!           tag 2 = Bool    u8 (0 or 1)
//! ```
//!
//! All integers and floats are little-endian. A record without metadata (or
//! with an empty map) is written with `metadata_len = 0` and no blob, and
//! decodes with `metadata = None`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use vecdex_core::{
    Metadata, MetadataValue, VectorId, VectorRecord, MAX_METADATA_ENTRIES,
    MAX_METADATA_KEY_BYTES, MAX_METADATA_STRING_BYTES,
};

const TAG_STRING: u8 = 0;
const TAG_NUMBER: u8 = 1;
const TAG_BOOL: u8 = 2;

/// Errors decoding records or metadata.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Input ended before the named field.
    #[error("truncated while reading {0}")]
    Truncated(&'static str),

    /// A key or string value is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Metadata value tag outside the known set.
    #[error("unknown metadata tag {0}")]
    UnknownTag(u8),

    /// Boolean byte other than 0 or 1.
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),

    /// The same metadata key appears twice.
    #[error("duplicate metadata key '{0}'")]
    DuplicateKey(String),

    /// A length field exceeds the hard limits.
    #[error("{field} {value} exceeds limit {limit}")]
    LimitExceeded {
        /// Field name.
        field: &'static str,
        /// Decoded value.
        value: usize,
        /// Maximum allowed.
        limit: usize,
    },

    /// Metadata blob has bytes after its last entry.
    #[error("{0} trailing bytes after metadata entries")]
    TrailingBytes(usize),
}

fn truncated(what: &'static str) -> impl FnOnce(io::Error) -> CodecError {
    move |_| CodecError::Truncated(what)
}

/// Encode metadata into its blob form.
pub fn encode_metadata(metadata: &Metadata) -> Vec<u8> {
    let mut buf = Vec::new();
    // Writes into a Vec cannot fail
    let _ = write_metadata(&mut buf, metadata);
    buf
}

fn write_metadata<W: Write>(w: &mut W, metadata: &Metadata) -> io::Result<()> {
    w.write_u32::<LittleEndian>(metadata.len() as u32)?;
    for (key, value) in metadata {
        w.write_u32::<LittleEndian>(key.len() as u32)?;
        w.write_all(key.as_bytes())?;
        w.write_u8(value.tag())?;
        match value {
            MetadataValue::String(s) => {
                w.write_u32::<LittleEndian>(s.len() as u32)?;
                w.write_all(s.as_bytes())?;
            }
            MetadataValue::Number(n) => w.write_f64::<LittleEndian>(*n)?,
            MetadataValue::Bool(b) => w.write_u8(u8::from(*b))?,
        }
    }
    Ok(())
}

/// Decode a metadata blob.
pub fn decode_metadata(blob: &[u8]) -> Result<Metadata, CodecError> {
    let mut cursor = Cursor::new(blob);
    let count = cursor
        .read_u32::<LittleEndian>()
        .map_err(truncated("metadata entry count"))? as usize;
    if count > MAX_METADATA_ENTRIES {
        return Err(CodecError::LimitExceeded {
            field: "metadata entry count",
            value: count,
            limit: MAX_METADATA_ENTRIES,
        });
    }

    let mut metadata = Metadata::new();
    for _ in 0..count {
        let key = read_string(&mut cursor, "metadata key", MAX_METADATA_KEY_BYTES)?;
        let tag = cursor.read_u8().map_err(truncated("metadata tag"))?;
        let value = match tag {
            TAG_STRING => MetadataValue::String(read_string(
                &mut cursor,
                "metadata string",
                MAX_METADATA_STRING_BYTES,
            )?),
            TAG_NUMBER => MetadataValue::Number(
                cursor
                    .read_f64::<LittleEndian>()
                    .map_err(truncated("metadata number"))?,
            ),
            TAG_BOOL => match cursor.read_u8().map_err(truncated("metadata bool"))? {
                0 => MetadataValue::Bool(false),
                1 => MetadataValue::Bool(true),
                other => return Err(CodecError::InvalidBool(other)),
            },
            other => return Err(CodecError::UnknownTag(other)),
        };
        if metadata.contains_key(&key) {
            return Err(CodecError::DuplicateKey(key));
        }
        metadata.insert(key, value);
    }

    let trailing = blob.len() - cursor.position() as usize;
    if trailing != 0 {
        return Err(CodecError::TrailingBytes(trailing));
    }
    Ok(metadata)
}

fn read_string(
    cursor: &mut Cursor<&[u8]>,
    what: &'static str,
    limit: usize,
) -> Result<String, CodecError> {
    let len = cursor.read_u32::<LittleEndian>().map_err(truncated(what))? as usize;
    if len > limit {
        return Err(CodecError::LimitExceeded {
            field: what,
            value: len,
            limit,
        });
    }
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(CodecError::Truncated(what));
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes).map_err(truncated(what))?;
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8(what))
}

/// Write one record.
pub fn write_record<W: Write>(w: &mut W, record: &VectorRecord) -> io::Result<()> {
    w.write_u64::<LittleEndian>(record.id.as_u64())?;
    for &component in &record.vector {
        w.write_f32::<LittleEndian>(component)?;
    }
    match &record.metadata {
        Some(metadata) if !metadata.is_empty() => {
            let blob = encode_metadata(metadata);
            w.write_u32::<LittleEndian>(blob.len() as u32)?;
            w.write_all(&blob)?;
        }
        _ => w.write_u32::<LittleEndian>(0)?,
    }
    Ok(())
}

/// Read one record of the given dimension.
pub fn read_record(
    cursor: &mut Cursor<&[u8]>,
    dimension: usize,
) -> Result<VectorRecord, CodecError> {
    let id = cursor
        .read_u64::<LittleEndian>()
        .map_err(truncated("record id"))?;

    let mut vector = vec![0f32; dimension];
    cursor
        .read_f32_into::<LittleEndian>(&mut vector)
        .map_err(truncated("record components"))?;

    let blob_len = cursor
        .read_u32::<LittleEndian>()
        .map_err(truncated("metadata length"))? as usize;
    let metadata = if blob_len == 0 {
        None
    } else {
        let start = cursor.position() as usize;
        let end = start
            .checked_add(blob_len)
            .filter(|&end| end <= cursor.get_ref().len())
            .ok_or(CodecError::Truncated("metadata blob"))?;
        let metadata = decode_metadata(&cursor.get_ref()[start..end])?;
        cursor.set_position(end as u64);
        Some(metadata)
    };

    Ok(VectorRecord::new(VectorId::new(id), vector, metadata))
}
