use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    #[error(transparent)]
    Crypto(#[from] crypto::CryptoError),

    #[error("send buffer full after {attempts} retries")]
    PeerNoBuf { attempts: u32 },

    #[error("operation timed out")]
    Timeout,

    #[error("STUN server did not respond after {attempts} attempts")]
    StunUnreachable { attempts: u32 },
}
