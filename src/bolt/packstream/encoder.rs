//! PackStream encoder.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Sized markers for one container family, smallest first.
struct SizedMarkers {
    tiny: Option<TinyKind>,
    m8: u8,
    m16: u8,
    m32: Option<u8>,
}

const BYTES: SizedMarkers = SizedMarkers { tiny: None, m8: BYTES_8, m16: BYTES_16, m32: Some(BYTES_32) };
const STRING: SizedMarkers =
    SizedMarkers { tiny: Some(TinyKind::String), m8: STRING_8, m16: STRING_16, m32: Some(STRING_32) };
const LIST: SizedMarkers =
    SizedMarkers { tiny: Some(TinyKind::List), m8: LIST_8, m16: LIST_16, m32: Some(LIST_32) };
const MAP: SizedMarkers =
    SizedMarkers { tiny: Some(TinyKind::Map), m8: MAP_8, m16: MAP_16, m32: Some(MAP_32) };
const STRUCT: SizedMarkers =
    SizedMarkers { tiny: Some(TinyKind::Struct), m8: STRUCT_8, m16: STRUCT_16, m32: None };

/// Writes values into a growable buffer.
pub struct PackStreamEncoder {
    buffer: BytesMut,
}

impl PackStreamEncoder {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.buffer.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.buffer.put_u8(if *b { TRUE } else { FALSE }),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => {
                self.buffer.put_u8(FLOAT_64);
                self.buffer.put_f64(*f);
            }
            PackStreamValue::Bytes(b) => {
                self.put_header(&BYTES, b.len(), "bytes")?;
                self.buffer.put_slice(b);
            }
            PackStreamValue::String(s) => self.encode_string(s)?,
            PackStreamValue::List(items) => {
                self.put_header(&LIST, items.len(), "list")?;
                for item in items {
                    self.encode(item)?;
                }
            }
            PackStreamValue::Map(map) => self.encode_map(map)?,
            PackStreamValue::Structure(s) => self.encode_structure(s)?,
        }
        Ok(())
    }

    /// Smallest representation that holds `value` exactly.
    pub fn encode_int(&mut self, value: i64) {
        if TINY_INT_RANGE.contains(&value) {
            self.buffer.put_i8(value as i8);
        } else if let Ok(v) = i8::try_from(value) {
            self.buffer.put_u8(INT_8);
            self.buffer.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.buffer.put_u8(INT_16);
            self.buffer.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.buffer.put_u8(INT_32);
            self.buffer.put_i32(v);
        } else {
            self.buffer.put_u8(INT_64);
            self.buffer.put_i64(value);
        }
    }

    pub fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        self.put_header(&STRING, value.len(), "string")?;
        self.buffer.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn encode_map(&mut self, map: &HashMap<String, PackStreamValue>) -> Result<(), PackStreamError> {
        self.put_header(&MAP, map.len(), "map")?;
        for (key, value) in map {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    pub fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        self.put_header(&STRUCT, s.fields.len(), "structure")?;
        self.buffer.put_u8(s.tag);
        for field in &s.fields {
            self.encode(field)?;
        }
        Ok(())
    }

    fn put_header(&mut self, markers: &SizedMarkers, len: usize, what: &'static str) -> Result<(), PackStreamError> {
        match markers.tiny {
            Some(kind) if len <= TINY_MAX_LEN => self.buffer.put_u8(kind.marker(len)),
            _ if len <= u8::MAX as usize => {
                self.buffer.put_u8(markers.m8);
                self.buffer.put_u8(len as u8);
            }
            _ if len <= u16::MAX as usize => {
                self.buffer.put_u8(markers.m16);
                self.buffer.put_u16(len as u16);
            }
            _ => match markers.m32 {
                Some(m32) if len <= u32::MAX as usize => {
                    self.buffer.put_u8(m32);
                    self.buffer.put_u32(len as u32);
                }
                _ => return Err(PackStreamError::ValueTooLarge(what, len)),
            },
        }
        Ok(())
    }
}

impl Default for PackStreamEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pack a single value.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut encoder = PackStreamEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}
