//! Bolt chunked framing for tokio_util.
//!
//! A message is written as one or more chunks, each prefixed by its 2-byte
//! big-endian length, and terminated by an empty chunk (`00 00`). An empty
//! chunk outside a message is a keep-alive NOOP and is skipped.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::{BoltRequest, BoltResponse};
use super::packstream::{unpack, PackStreamEncoder, PackStreamValue};
use super::BoltError;

/// Largest chunk this client writes.
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Default limit on a reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Frames PackStream values into chunks and back.
#[derive(Debug)]
pub struct BoltCodec {
    max_message_size: usize,
    /// Chunks of the message being reassembled
    pending: BytesMut,
}

impl BoltCodec {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            pending: BytesMut::with_capacity(4096),
        }
    }

    fn write_chunks(payload: &[u8], dst: &mut BytesMut) {
        dst.reserve(payload.len() + 2 * (payload.len() / MAX_CHUNK_SIZE + 2));
        for chunk in payload.chunks(MAX_CHUNK_SIZE) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = PackStreamValue;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }
            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);
                if self.pending.is_empty() {
                    continue;
                }
                let message = self.pending.split();
                return Ok(Some(unpack(&message)?));
            }

            if src.len() < 2 + chunk_size {
                src.reserve(2 + chunk_size - src.len());
                return Ok(None);
            }

            let size = self.pending.len() + chunk_size;
            if size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }

            src.advance(2);
            self.pending.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl Encoder<PackStreamValue> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: PackStreamValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut encoder = PackStreamEncoder::new();
        encoder.encode(&item)?;
        Self::write_chunks(encoder.as_bytes(), dst);
        Ok(())
    }
}

/// Client side framing: writes requests, reads responses.
#[derive(Debug, Default)]
pub struct BoltResponseCodec {
    inner: BoltCodec,
}

impl BoltResponseCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for BoltResponseCodec {
    type Item = BoltResponse;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(value) = self.inner.decode(src)? else {
            return Ok(None);
        };
        let structure = value
            .as_structure()
            .ok_or_else(|| BoltError::Protocol(format!("expected a message structure, got {}", value.type_name())))?;
        Ok(Some(BoltResponse::from_structure(structure)?))
    }
}

impl Encoder<BoltRequest> for BoltResponseCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(PackStreamValue::Structure(item.to_structure()), dst)
    }
}

impl Encoder<&BoltRequest> for BoltResponseCodec {
    type Error = BoltError;

    fn encode(&mut self, item: &BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(PackStreamValue::Structure(item.to_structure()), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::tag;

    /// Frame a response the way a server would.
    fn server_frame(response: &BoltResponse, dst: &mut BytesMut) {
        BoltCodec::new()
            .encode(PackStreamValue::Structure(response.to_structure()), dst)
            .unwrap();
    }

    #[test]
    fn test_request_framing() {
        let mut codec = BoltResponseCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(BoltRequest::Reset, &mut buf).unwrap();
        // one chunk of two bytes (tiny struct, RESET tag), then end marker
        assert_eq!(&buf[..], &[0x00, 0x02, 0xB0, tag::RESET, 0x00, 0x00]);
    }

    #[test]
    fn test_large_message_spans_chunks() {
        let mut codec = BoltCodec::new();
        let mut buf = BytesMut::new();
        let large = "x".repeat(MAX_CHUNK_SIZE * 2 + 100);
        codec.encode(PackStreamValue::String(large.clone()), &mut buf).unwrap();
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]) as usize, MAX_CHUNK_SIZE);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.as_str(), Some(large.as_str()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_input_waits() {
        let mut codec = BoltResponseCodec::new();
        let mut full = BytesMut::new();
        server_frame(&BoltResponse::Ignored, &mut full);

        let mut partial = BytesMut::from(&full[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.extend_from_slice(&full[3..]);
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(BoltResponse::Ignored));
    }

    #[test]
    fn test_noop_chunks_skipped() {
        let mut codec = BoltResponseCodec::new();
        let mut buf = BytesMut::from(&END_MARKER[..]);
        server_frame(&BoltResponse::failure("Neo.ClientError.Security.Unauthorized", "no"), &mut buf);
        buf.put_slice(&END_MARKER);
        server_frame(&BoltResponse::Ignored, &mut buf);

        assert!(matches!(codec.decode(&mut buf).unwrap(), Some(BoltResponse::Failure(_))));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(BoltResponse::Ignored));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_message_too_large() {
        let mut codec = BoltCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        buf.put_u16(200);
        buf.extend_from_slice(&[0u8; 200]);
        assert!(matches!(codec.decode(&mut buf), Err(BoltError::MessageTooLarge { size: 200, max: 100 })));
    }

    #[test]
    fn test_non_structure_is_protocol_error() {
        let mut codec = BoltResponseCodec::new();
        let mut buf = BytesMut::new();
        BoltCodec::new().encode(PackStreamValue::Integer(1), &mut buf).unwrap();
        assert!(matches!(codec.decode(&mut buf), Err(BoltError::Protocol(_))));
    }
}
