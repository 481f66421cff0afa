//! # Bolt Protocol
//!
//! Wire-level pieces of the Bolt client: everything needed to turn values
//! into bytes and bytes into messages, with no knowledge of connections,
//! pools or credentials.
//!
//! ## Submodules
//!
//! - [`packstream`] - Binary serialization/deserialization
//! - [`message`] - Request and response messages (HELLO, RUN, SUCCESS, ...)
//! - [`handshake`] - Client side version negotiation
//! - [`codec`] - Chunked framing for tokio
//! - [`error`] - Wire-level error types
//!
//! Most users should go through [`crate::driver`] instead.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use codec::{BoltCodec, BoltResponseCodec};
pub use error::{BoltError, BoltErrorCode, BoltResult, HandshakeError};
pub use handshake::{BoltVersion, Handshake, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE};
pub use message::{
    AccessMode, BoltRequest, BoltResponse, FailureMessage, HelloMessage, LogonMessage,
    RecordMessage, RouteMessage, RunMessage, StreamMessage, SuccessMessage, TransactionExtra,
};
pub use packstream::{
    pack, unpack, PackStreamDecoder, PackStreamEncoder, PackStreamError, PackStreamNode,
    PackStreamPath, PackStreamRelationship, PackStreamStructure, PackStreamUnboundRelationship,
    PackStreamValue,
};
