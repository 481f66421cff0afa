//! Client side of the Bolt handshake.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{BoltVersion, HandshakeError, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE, HANDSHAKE_SIZE};
use crate::bolt::error::{BoltError, BoltResult};

/// Version proposals sent in the four handshake slots.
///
/// Slots are ordered by preference. Each carries a version plus the number
/// of minors below it that are also acceptable, so the default set covers
/// 5.4 down to 5.0, 4.4 down to 4.2, then 4.1 and 4.0.
#[derive(Debug, Clone)]
pub struct Handshake {
    proposals: [(BoltVersion, u8); 4],
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            proposals: [
                (BoltVersion::V5_4, 4),
                (BoltVersion::V4_4, 2),
                (BoltVersion::V4_1, 0),
                (BoltVersion::V4_0, 0),
            ],
        }
    }

    /// Restrict the proposal to explicit slots.
    pub fn with_proposals(proposals: [(BoltVersion, u8); 4]) -> Self {
        Self { proposals }
    }

    /// The 20 bytes opening every connection.
    pub fn request(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut out = [0u8; HANDSHAKE_SIZE];
        out[..4].copy_from_slice(&BOLT_MAGIC);
        for (slot, (version, range)) in self.proposals.iter().enumerate() {
            let start = 4 + slot * 4;
            out[start..start + 4].copy_from_slice(&version.to_proposal(*range));
        }
        out
    }

    /// Whether any slot offered `version`.
    pub fn offers(&self, version: BoltVersion) -> bool {
        self.proposals.iter().any(|(top, range)| {
            version.major() == top.major()
                && version.minor() <= top.minor()
                && version.minor() >= top.minor().saturating_sub(*range)
        })
    }

    /// Interpret the server's four-byte answer.
    pub fn parse_reply(&self, reply: [u8; HANDSHAKE_RESPONSE_SIZE]) -> Result<BoltVersion, HandshakeError> {
        if &reply == b"HTTP" {
            return Err(HandshakeError::HttpEndpoint);
        }
        let version = BoltVersion::from_reply(reply).ok_or(HandshakeError::NoCompatibleVersion)?;
        if !self.offers(version) || !version.is_supported() {
            return Err(HandshakeError::UnexpectedVersion {
                major: version.major(),
                minor: version.minor(),
            });
        }
        Ok(version)
    }

    /// Run the exchange on a freshly opened stream.
    pub async fn perform<S>(&self, stream: &mut S) -> BoltResult<BoltVersion>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(&self.request()).await?;
        stream.flush().await?;

        let mut reply = [0u8; HANDSHAKE_RESPONSE_SIZE];
        match stream.read_exact(&mut reply).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(BoltError::Handshake(HandshakeError::ConnectionClosed));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(self.parse_reply(reply)?)
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}
