//! Packet encryption and the private-key handshake (§4.1, §4.3).

pub mod cipher;
pub mod error;
pub mod handshake;
pub mod hash;

pub use cipher::{decrypt, encrypt, EncryptedPacket, KEY_LEN};
pub use error::CryptoError;
pub use hash::debug_hash;
