//! Bolt protocol error types.

use std::fmt;
use std::io;

use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Wire-level failures: transport, framing, handshake, decoding.
#[derive(Debug)]
pub enum BoltError {
    Io(io::Error),

    Handshake(HandshakeError),

    PackStream(PackStreamError),

    /// Well-formed bytes that do not make a valid Bolt exchange
    Protocol(String),

    MessageTooLarge { size: usize, max: usize },

    /// Peer closed the stream
    ConnectionClosed,

    /// No bytes arrived within the receive timeout
    ReceiveTimeout { millis: u64 },
}

impl fmt::Display for BoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoltError::Io(e) => write!(f, "I/O error: {}", e),
            BoltError::Handshake(e) => write!(f, "Handshake error: {}", e),
            BoltError::PackStream(e) => write!(f, "PackStream error: {}", e),
            BoltError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BoltError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max: {})", size, max)
            }
            BoltError::ConnectionClosed => write!(f, "Connection closed"),
            BoltError::ReceiveTimeout { millis } => {
                write!(f, "Connection lost. Server didn't respond in {}ms", millis)
            }
        }
    }
}

impl BoltError {
    /// Failures of the transport itself, as opposed to what was sent over it.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BoltError::Io(_)
                | BoltError::ConnectionClosed
                | BoltError::ReceiveTimeout { .. }
                | BoltError::Handshake(HandshakeError::ConnectionClosed)
        )
    }
}

impl std::error::Error for BoltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BoltError::Io(e) => Some(e),
            BoltError::Handshake(e) => Some(e),
            BoltError::PackStream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BoltError {
    fn from(err: io::Error) -> Self {
        BoltError::Io(err)
    }
}

impl From<HandshakeError> for BoltError {
    fn from(err: HandshakeError) -> Self {
        BoltError::Handshake(err)
    }
}

impl From<PackStreamError> for BoltError {
    fn from(err: PackStreamError) -> Self {
        BoltError::PackStream(err)
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Server answered with the all-zero version
    NoCompatibleVersion,

    /// Server answered `HTTP`: the address is an HTTP endpoint
    HttpEndpoint,

    /// Server picked a version the client never proposed
    UnexpectedVersion { major: u8, minor: u8 },

    /// Connection closed during handshake
    ConnectionClosed,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::NoCompatibleVersion => {
                write!(f, "The server does not support any of the protocol versions supported by this driver")
            }
            HandshakeError::HttpEndpoint => write!(
                f,
                "Server responded HTTP. Make sure you are not trying to connect to the http endpoint"
            ),
            HandshakeError::UnexpectedVersion { major, minor } => {
                write!(f, "Unknown Bolt protocol version: {}.{}", major, minor)
            }
            HandshakeError::ConnectionClosed => {
                write!(f, "Connection closed during handshake")
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Bolt 서버 에러 코드 상수
///
/// 드라이버가 분기 처리하는 서버 에러 코드입니다.
pub struct BoltErrorCode;

impl BoltErrorCode {
    // Security
    pub const UNAUTHORIZED: &'static str = "Neo.ClientError.Security.Unauthorized";
    pub const TOKEN_EXPIRED: &'static str = "Neo.ClientError.Security.TokenExpired";
    pub const AUTHORIZATION_EXPIRED: &'static str = "Neo.ClientError.Security.AuthorizationExpired";
    pub const AUTHENTICATION_RATE_LIMIT: &'static str =
        "Neo.ClientError.Security.AuthenticationRateLimit";

    // Cluster
    pub const NOT_A_LEADER: &'static str = "Neo.ClientError.Cluster.NotALeader";
    pub const FORBIDDEN_ON_READ_ONLY_DATABASE: &'static str =
        "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase";
    pub const DATABASE_NOT_FOUND: &'static str = "Neo.ClientError.Database.DatabaseNotFound";
    pub const PROCEDURE_NOT_FOUND: &'static str = "Neo.ClientError.Procedure.ProcedureNotFound";

    // Transient codes surfaced as client errors
    pub const TRANSIENT_TERMINATED: &'static str = "Neo.TransientError.Transaction.Terminated";
    pub const TRANSIENT_LOCK_CLIENT_STOPPED: &'static str =
        "Neo.TransientError.Transaction.LockClientStopped";
    pub const TERMINATED: &'static str = "Neo.ClientError.Transaction.Terminated";
    pub const LOCK_CLIENT_STOPPED: &'static str = "Neo.ClientError.Transaction.LockClientStopped";

    pub const DATABASE_UNAVAILABLE: &'static str =
        "Neo.TransientError.General.DatabaseUnavailable";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_error_display() {
        assert!(HandshakeError::HttpEndpoint.to_string().contains("http endpoint"));
        assert!(HandshakeError::UnexpectedVersion { major: 9, minor: 1 }
            .to_string()
            .contains("9.1"));
    }

    #[test]
    fn test_transport_classification() {
        let io_err: BoltError = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(io_err.is_transport());
        assert!(BoltError::ReceiveTimeout { millis: 5 }.is_transport());
        assert!(!BoltError::Protocol("bad".into()).is_transport());
        assert!(!BoltError::from(HandshakeError::NoCompatibleVersion).is_transport());
    }

    #[test]
    fn test_receive_timeout_message() {
        assert_eq!(
            BoltError::ReceiveTimeout { millis: 42_000 }.to_string(),
            "Connection lost. Server didn't respond in 42000ms"
        );
    }
}
