use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("wire packet too short: expected at least {expected} bytes, got {got}")]
    TooShort { expected: usize, got: usize },

    #[error("ciphertext length {0} exceeds maximum ({max})", max = crate::cipher::MAX_CIPHERTEXT_LEN)]
    OversizeCiphertext(usize),

    #[error("HMAC verification failed")]
    BadHmac,

    #[error("malformed IV or cipher length field")]
    BadFraming,

    #[error("AES-CBC padding invalid")]
    BadPadding,

    #[error("handshake HMAC mismatch")]
    HandshakeFailed,
}
