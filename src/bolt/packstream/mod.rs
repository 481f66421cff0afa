//! PackStream serialization format.
//!
//! PackStream is the self-describing binary format every Bolt message is
//! written in. Each value begins with a marker byte naming its kind and,
//! for containers, its size.
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**, **Float** (64-bit IEEE 754)
//! - **Integer**: the full `i64` range, packed in 1, 2, 3, 5 or 9 bytes
//! - **String**: UTF-8, **Bytes**: raw octets
//! - **List**, **Map** (string keys)
//! - **Structure**: a one-byte tag plus ordered fields; used for protocol
//!   messages and for graph entities (node, relationship, path)
//!
//! [`pack`] and [`unpack`] are the entry points; [`PackStreamEncoder`] and
//! [`PackStreamDecoder`] expose the streaming form.

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod structures;
pub mod types;

use bytes::Bytes;

pub use decoder::{decode, PackStreamDecoder};
pub use encoder::{encode, PackStreamEncoder};
pub use structures::{
    PackStreamNode, PackStreamPath, PackStreamRelationship, PackStreamUnboundRelationship,
};
pub use types::{PackStreamStructure, PackStreamValue};

use std::fmt;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Input ended in the middle of a value
    UnexpectedEof,
    /// Marker byte that starts no known value
    UnknownMarker(u8),
    InvalidUtf8(String),
    /// Map keys must be strings
    InvalidMapKey,
    /// Value too large to encode
    ValueTooLarge(&'static str, usize),
    InvalidStructure(String),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => write!(f, "Unknown PackStream marker: 0x{:02X}", m),
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(t, s) => write!(f, "{} too large: {} items", t, s),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
        }
    }
}

impl std::error::Error for PackStreamError {}

/// Pack one value into a fresh buffer.
pub fn pack(value: &PackStreamValue) -> Result<Bytes, PackStreamError> {
    Ok(encode(value)?.freeze())
}

/// Unpack exactly one value; trailing bytes are an error.
pub fn unpack(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::new(data);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(PackStreamError::InvalidStructure(format!(
            "{} trailing bytes after value",
            decoder.remaining()
        )));
    }
    Ok(value)
}
