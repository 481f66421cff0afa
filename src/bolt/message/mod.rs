//! Bolt protocol message types.
//!
//! Requests flow client to server, responses server to client. Every
//! message is a PackStream structure whose tag is the message signature.

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;

/// Bolt message signatures.
pub mod tag {
    pub const HELLO: u8 = 0x01;
    pub const GOODBYE: u8 = 0x02;
    pub const RESET: u8 = 0x0F;
    pub const RUN: u8 = 0x10;
    pub const BEGIN: u8 = 0x11;
    pub const COMMIT: u8 = 0x12;
    pub const ROLLBACK: u8 = 0x13;
    pub const DISCARD: u8 = 0x2F;
    pub const PULL: u8 = 0x3F;
    /// Bolt 5.4+
    pub const TELEMETRY: u8 = 0x54;
    /// Bolt 4.3+
    pub const ROUTE: u8 = 0x66;
    /// Bolt 5.1+
    pub const LOGON: u8 = 0x6A;
    /// Bolt 5.1+
    pub const LOGOFF: u8 = 0x6B;

    pub const SUCCESS: u8 = 0x70;
    pub const RECORD: u8 = 0x71;
    pub const IGNORED: u8 = 0x7E;
    pub const FAILURE: u8 = 0x7F;
}
