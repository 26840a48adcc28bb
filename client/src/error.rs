use thiserror::Error;

/// Client-side session errors (§7). Transport/protocol/crypto errors are
/// surfaced from their own crates; this enum covers decisions the client's
/// own connection logic makes.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("discovery rejected by server")]
    DiscoveryRejected,

    #[error("handshake with server failed")]
    HandshakeFailed,

    #[error("server sent a malformed discovery reply")]
    BadDiscoveryReply,

    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
