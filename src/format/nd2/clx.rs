//! CLX Lite variant decoding.
//!
//! ND2 metadata chunks are serialized in Nikon's "CLX Lite" binary variant:
//! a flat sequence of typed, named entries where `Level` entries nest further
//! entries. The decoder produces a [`serde_json::Value`] tree so that the
//! typed metadata layer can pick fields by name.
//!
//! # Entry Layout
//!
//! ```text
//! u8      value type
//! u8      name length in UTF-16 code units (including the NUL terminator)
//! [u16]   name (UTF-16LE)
//! ...     value, depending on type
//! ```
//!
//! A `Level` value is `u32 item_count`, `u64 length` (measured from the first
//! byte of the entry), the children, then `item_count` 8-byte offsets that are
//! not needed for sequential decoding. A `Compressed` entry skips 10 bytes and
//! holds a zlib stream with further entries.
//!
//! Repeated names within one level are collected into an array.

use std::collections::HashSet;
use std::io::Read;

use flate2::read::ZlibDecoder;
use serde_json::{Map, Number, Value};

use crate::error::Nd2Error;
use crate::io::{read_f64_le, read_u16_le, read_u32_le, read_u64_le};

const TYPE_BOOL: u8 = 1;
const TYPE_INT32: u8 = 2;
const TYPE_UINT32: u8 = 3;
const TYPE_INT64: u8 = 4;
const TYPE_UINT64: u8 = 5;
const TYPE_DOUBLE: u8 = 6;
const TYPE_VOID_POINTER: u8 = 7;
const TYPE_STRING: u8 = 8;
const TYPE_BYTE_ARRAY: u8 = 9;
const TYPE_LEVEL: u8 = 11;
const TYPE_COMPRESSED: u8 = 76;

/// Bytes between the entry header of a compressed entry and its zlib stream.
const COMPRESSED_SKIP: usize = 10;

/// Nesting limit; real metadata stays well below this.
const MAX_DEPTH: usize = 64;

/// Decode a CLX Lite buffer into a JSON object of its top-level entries.
///
/// Decoding stops at the end of the buffer or at zero padding.
pub fn decode(data: &[u8]) -> Result<Value, Nd2Error> {
    let mut cursor = Cursor::new(data);
    let map = decode_entries(&mut cursor, None, 0)?;
    Ok(Value::Object(map))
}

fn decode_entries(
    cursor: &mut Cursor<'_>,
    count: Option<usize>,
    depth: usize,
) -> Result<Map<String, Value>, Nd2Error> {
    if depth > MAX_DEPTH {
        return Err(Nd2Error::InvalidVariant(format!(
            "nesting deeper than {} levels",
            MAX_DEPTH
        )));
    }

    let mut entries = Entries::default();
    let mut decoded = 0;

    while count.map_or(true, |c| decoded < c) {
        if cursor.is_empty() || (count.is_none() && cursor.peek() == Some(0)) {
            break;
        }

        let start = cursor.pos;
        let data_type = cursor.u8()?;
        let name_length = cursor.u8()? as usize;

        if data_type == TYPE_COMPRESSED {
            cursor.skip(COMPRESSED_SKIP)?;
            let inflated = inflate(cursor.rest())?;
            let nested = decode_entries(&mut Cursor::new(&inflated), None, depth + 1)?;
            for (name, value) in nested {
                entries.insert(name, value);
            }
            break;
        }

        let name = decode_utf16(cursor.take(name_length * 2)?);
        let value = match data_type {
            TYPE_BOOL => Value::Bool(cursor.u8()? != 0),
            TYPE_INT32 => Value::from(cursor.u32()? as i32),
            TYPE_UINT32 => Value::from(cursor.u32()?),
            TYPE_INT64 => Value::from(cursor.u64()? as i64),
            TYPE_UINT64 | TYPE_VOID_POINTER => Value::from(cursor.u64()?),
            TYPE_DOUBLE => Number::from_f64(cursor.f64()?).map_or(Value::Null, Value::Number),
            TYPE_STRING => Value::String(cursor.utf16_cstr()?),
            TYPE_BYTE_ARRAY => {
                let len = cursor.u64()? as usize;
                let bytes = cursor.take(len)?;
                Value::Array(bytes.iter().map(|&b| Value::from(b)).collect())
            }
            TYPE_LEVEL => {
                let item_count = cursor.u32()? as usize;
                let length = cursor.u64()? as usize;
                let end = start.checked_add(length).filter(|&end| {
                    end >= cursor.pos && end <= cursor.data.len()
                });
                let end = end.ok_or_else(|| {
                    Nd2Error::InvalidVariant(format!(
                        "level {} has invalid length {}",
                        name, length
                    ))
                })?;

                let mut children = Cursor::new(&cursor.data[cursor.pos..end]);
                let map = decode_entries(&mut children, Some(item_count), depth + 1)?;

                // Offset table trailing the children
                cursor.pos = end
                    .saturating_add(item_count.saturating_mul(8))
                    .min(cursor.data.len());
                Value::Object(map)
            }
            other => {
                return Err(Nd2Error::InvalidVariant(format!(
                    "unknown value type {} for entry '{}'",
                    other, name
                )))
            }
        };

        entries.insert(name, value);
        decoded += 1;
    }

    Ok(entries.map)
}

/// Output map that turns repeated names into arrays.
#[derive(Default)]
struct Entries {
    map: Map<String, Value>,
    repeated: HashSet<String>,
}

impl Entries {
    fn insert(&mut self, name: String, value: Value) {
        match self.map.get_mut(&name) {
            None => {
                self.map.insert(name, value);
            }
            Some(Value::Array(items)) if self.repeated.contains(&name) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
                self.repeated.insert(name);
            }
        }
    }
}

pub(crate) fn inflate(data: &[u8]) -> Result<Vec<u8>, Nd2Error> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Nd2Error::Decompress(e.to_string()))?;
    Ok(out)
}

fn decode_utf16(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(read_u16_le).collect();
    let mut name = String::from_utf16_lossy(&units);
    while name.ends_with('\0') {
        name.pop();
    }
    name
}

// =============================================================================
// Cursor
// =============================================================================

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Nd2Error> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                Nd2Error::InvalidVariant(format!(
                    "unexpected end of data: need {} bytes at offset {}, have {}",
                    len,
                    self.pos,
                    self.data.len().saturating_sub(self.pos)
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), Nd2Error> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, Nd2Error> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, Nd2Error> {
        self.take(4).map(read_u32_le)
    }

    fn u64(&mut self) -> Result<u64, Nd2Error> {
        self.take(8).map(read_u64_le)
    }

    fn f64(&mut self) -> Result<f64, Nd2Error> {
        self.take(8).map(read_f64_le)
    }

    /// NUL-terminated UTF-16LE string.
    fn utf16_cstr(&mut self) -> Result<String, Nd2Error> {
        let mut units = Vec::new();
        loop {
            let unit = read_u16_le(self.take(2)?);
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Ok(String::from_utf16_lossy(&units))
    }
}

// =============================================================================
// Tests
// =============================================================================
