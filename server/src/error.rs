use thiserror::Error;

/// Session-layer errors (§7 "Session" and "Fatal" taxonomy). Transport and
/// protocol errors are surfaced from their own crates and handled at the
/// call site; this enum covers failures the session manager itself decides
/// about.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no free client slot (capacity exhausted)")]
    SlotsFull,

    #[error("discovery request rejected: {0}")]
    DiscoveryRejected(String),

    #[error("handshake failed for slot {0}")]
    HandshakeFailed(usize),

    #[error("slot {0} is not active")]
    SlotNotActive(usize),

    #[error("required port already in use: {0}")]
    PortInUse(u16),

    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
