//! PackStream marker bytes.
//!
//! Every packed value starts with one marker byte. Small strings, lists, maps
//! and structures carry their size in the low nibble of the marker; larger
//! ones use a sized marker followed by a big-endian length.

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

pub const TINY_STRING: u8 = 0x80;
pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

pub const TINY_LIST: u8 = 0x90;
pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

pub const TINY_MAP: u8 = 0xA0;
pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;

pub const TINY_STRUCT: u8 = 0xB0;
pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

/// Largest size that fits in a tiny marker's low nibble.
pub const TINY_MAX_LEN: usize = 15;

/// Range of integers packed directly into the marker byte.
pub const TINY_INT_RANGE: std::ops::RangeInclusive<i64> = -16..=127;

// Graph structure tags
pub const NODE_TAG: u8 = 0x4E; // 'N'
pub const RELATIONSHIP_TAG: u8 = 0x52; // 'R'
pub const UNBOUND_RELATIONSHIP_TAG: u8 = 0x72; // 'r'
pub const PATH_TAG: u8 = 0x50; // 'P'

/// Container family of a marker that encodes its size inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TinyKind {
    String,
    List,
    Map,
    Struct,
}

impl TinyKind {
    /// Marker base for this family.
    pub fn base(self) -> u8 {
        match self {
            TinyKind::String => TINY_STRING,
            TinyKind::List => TINY_LIST,
            TinyKind::Map => TINY_MAP,
            TinyKind::Struct => TINY_STRUCT,
        }
    }

    /// Build the marker for `len` items. Caller guarantees `len <= TINY_MAX_LEN`.
    pub fn marker(self, len: usize) -> u8 {
        debug_assert!(len <= TINY_MAX_LEN);
        self.base() | len as u8
    }
}

/// Split a tiny container marker into its family and inline size.
#[inline]
pub fn split_tiny(marker: u8) -> Option<(TinyKind, usize)> {
    let len = (marker & 0x0F) as usize;
    match marker & 0xF0 {
        TINY_STRING => Some((TinyKind::String, len)),
        TINY_LIST => Some((TinyKind::List, len)),
        TINY_MAP => Some((TinyKind::Map, len)),
        TINY_STRUCT => Some((TinyKind::Struct, len)),
        _ => None,
    }
}

/// Markers 0x00..=0x7F and 0xF0..=0xFF are the integer itself.
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= 0x7F || marker >= 0xF0
}
