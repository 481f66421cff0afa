//! PackStream decoder.

use bytes::Buf;
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Deepest container nesting accepted from the wire.
pub const MAX_DEPTH: usize = 64;

/// Reads values from a borrowed byte slice.
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
    depth: usize,
}

impl<'a> PackStreamDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, depth: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.take::<1>()?[0];

        if is_tiny_int(marker) {
            return Ok(PackStreamValue::Integer(marker as i8 as i64));
        }

        if let Some((kind, len)) = split_tiny(marker) {
            return self.read_container(kind, len);
        }

        let value = match marker {
            NULL => PackStreamValue::Null,
            TRUE => PackStreamValue::Boolean(true),
            FALSE => PackStreamValue::Boolean(false),
            FLOAT_64 => PackStreamValue::Float(f64::from_be_bytes(self.take::<8>()?)),

            INT_8 => PackStreamValue::Integer(i8::from_be_bytes(self.take::<1>()?) as i64),
            INT_16 => PackStreamValue::Integer(i16::from_be_bytes(self.take::<2>()?) as i64),
            INT_32 => PackStreamValue::Integer(i32::from_be_bytes(self.take::<4>()?) as i64),
            INT_64 => PackStreamValue::Integer(i64::from_be_bytes(self.take::<8>()?)),

            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.read_len(marker - BYTES_8)?;
                PackStreamValue::Bytes(self.read_slice(len)?.to_vec())
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.read_len(marker - STRING_8)?;
                self.read_container(TinyKind::String, len)?
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.read_len(marker - LIST_8)?;
                self.read_container(TinyKind::List, len)?
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.read_len(marker - MAP_8)?;
                self.read_container(TinyKind::Map, len)?
            }
            STRUCT_8 | STRUCT_16 => {
                let len = self.read_len(marker - STRUCT_8)?;
                self.read_container(TinyKind::Struct, len)?
            }

            other => return Err(PackStreamError::UnknownMarker(other)),
        };
        Ok(value)
    }

    fn read_container(&mut self, kind: TinyKind, len: usize) -> Result<PackStreamValue, PackStreamError> {
        if matches!(kind, TinyKind::String) {
            return self.read_string(len);
        }
        if self.depth >= MAX_DEPTH {
            return Err(PackStreamError::InvalidStructure(format!(
                "nesting deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let value = self.read_nested(kind, len);
        self.depth -= 1;
        value
    }

    fn read_string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let bytes = self.read_slice(len)?;
        let s = std::str::from_utf8(bytes).map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(PackStreamValue::String(s.to_string()))
    }

    fn read_nested(&mut self, kind: TinyKind, len: usize) -> Result<PackStreamValue, PackStreamError> {
        match kind {
            TinyKind::String => self.read_string(len),
            TinyKind::List => {
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode()?);
                }
                Ok(PackStreamValue::List(items))
            }
            TinyKind::Map => {
                let mut map = HashMap::with_capacity(len.min(1024));
                for _ in 0..len {
                    let key = match self.decode()? {
                        PackStreamValue::String(s) => s,
                        _ => return Err(PackStreamError::InvalidMapKey),
                    };
                    let value = self.decode()?;
                    map.insert(key, value);
                }
                Ok(PackStreamValue::Map(map))
            }
            TinyKind::Struct => {
                let tag = self.take::<1>()?[0];
                let mut fields = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    fields.push(self.decode()?);
                }
                Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
            }
        }
    }

    /// Length prefix; `width` is 0, 1 or 2 for an 8, 16 or 32 bit size.
    fn read_len(&mut self, width: u8) -> Result<usize, PackStreamError> {
        let len = match width {
            0 => self.take::<1>()?[0] as usize,
            1 => u16::from_be_bytes(self.take::<2>()?) as usize,
            _ => u32::from_be_bytes(self.take::<4>()?) as usize,
        };
        Ok(len)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], PackStreamError> {
        if self.data.remaining() < N {
            return Err(PackStreamError::UnexpectedEof);
        }
        let mut out = [0u8; N];
        self.data.copy_to_slice(&mut out);
        Ok(out)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        if self.data.len() < len {
            return Err(PackStreamError::UnexpectedEof);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }
}

/// Unpack a single value.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    PackStreamDecoder::new(data).decode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scalars() {
        assert!(decode(&[0xC0]).unwrap().is_null());
        assert_eq!(decode(&[0xC3]).unwrap(), PackStreamValue::Boolean(true));
        assert_eq!(decode(&[0xC2]).unwrap(), PackStreamValue::Boolean(false));
        assert_eq!(decode(&[0xF0]).unwrap(), PackStreamValue::Integer(-16));
        assert_eq!(decode(&[0x7F]).unwrap(), PackStreamValue::Integer(127));
        assert_eq!(decode(&[0xC9, 0x03, 0xE8]).unwrap(), PackStreamValue::Integer(1000));
    }

    #[test]
    fn test_decode_int64_beyond_32_bits() {
        let data = [0xCB, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(decode(&data).unwrap(), PackStreamValue::Integer(1 << 32));
    }

    #[test]
    fn test_decode_sized_string() {
        let mut data = vec![0xD1, 0x01, 0x00];
        data.extend(std::iter::repeat(b'z').take(256));
        assert_eq!(decode(&data).unwrap().as_str().map(str::len), Some(256));
    }

    #[test]
    fn test_decode_structure() {
        let value = decode(&[0xB2, 0x70, 0x01, 0xA0]).unwrap();
        let s = value.as_structure().unwrap();
        assert_eq!(s.tag, 0x70);
        assert_eq!(s.fields, vec![PackStreamValue::Integer(1), PackStreamValue::Map(HashMap::new())]);
    }

    #[test]
    fn test_unknown_marker_is_named() {
        let err = decode(&[0xE5]).unwrap_err();
        assert!(matches!(err, PackStreamError::UnknownMarker(0xE5)));
        assert!(err.to_string().contains("0xE5"));
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(decode(&[0xCB, 0x00]), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[0x83, b'a']), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[]), Err(PackStreamError::UnexpectedEof)));
    }

    #[test]
    fn test_non_string_map_key() {
        assert!(matches!(decode(&[0xA1, 0x01, 0x02]), Err(PackStreamError::InvalidMapKey)));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut data = vec![0x91; 1_000_000];
        data.push(0xC0);
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, PackStreamError::InvalidStructure(_)));

        let mut data = vec![0x91; MAX_DEPTH];
        data.push(0xC0);
        assert!(decode(&data).is_ok());
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(decode(&[0x82, 0xFF, 0xFE]), Err(PackStreamError::InvalidUtf8(_))));
    }
}
