//! Packet encryption (§4.1): AES-128-CBC with a random per-packet IV, and a
//! separate HMAC-SHA-256 (truncated to 16 bytes) over the length, IV, and
//! ciphertext, computed under the same shared secret.
//!
//! This module is deliberately generic over raw bytes — it knows nothing
//! about `protocol::Packet`. The caller hands it a plaintext blob and gets
//! back the exact bytes that go on the wire, and vice versa.

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const HASH_LEN: usize = 16;

/// Matches the historical `LARGEST_TCP_PACKET` ceiling on a single wire
/// packet's ciphertext.
pub const MAX_CIPHERTEXT_LEN: usize = 10_000_000;

const WIRE_HEADER_LEN: usize = HASH_LEN + 4 + IV_LEN;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// `hash[16] | cipher_len:u32 | iv[16] | ciphertext[cipher_len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPacket {
    pub hash: [u8; HASH_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedPacket {
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WIRE_HEADER_LEN + self.ciphertext.len());
        buf.extend_from_slice(&self.hash);
        buf.extend_from_slice(&(self.ciphertext.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.iv);
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < WIRE_HEADER_LEN {
            return Err(CryptoError::TooShort {
                expected: WIRE_HEADER_LEN,
                got: bytes.len(),
            });
        }
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&bytes[0..HASH_LEN]);
        let cipher_len = u32::from_le_bytes(bytes[HASH_LEN..HASH_LEN + 4].try_into().unwrap()) as usize;
        if cipher_len > MAX_CIPHERTEXT_LEN {
            return Err(CryptoError::OversizeCiphertext(cipher_len));
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[HASH_LEN + 4..WIRE_HEADER_LEN]);

        let end = WIRE_HEADER_LEN + cipher_len;
        if bytes.len() < end {
            return Err(CryptoError::TooShort {
                expected: end,
                got: bytes.len(),
            });
        }
        Ok(EncryptedPacket {
            hash,
            iv,
            ciphertext: bytes[WIRE_HEADER_LEN..end].to_vec(),
        })
    }
}

fn compute_hmac(key: &[u8; KEY_LEN], cipher_len: u32, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> [u8; HASH_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&cipher_len.to_le_bytes());
    mac.update(iv);
    mac.update(ciphertext);
    let full = mac.finalize().into_bytes();
    let mut truncated = [0u8; HASH_LEN];
    truncated.copy_from_slice(&full[..HASH_LEN]);
    truncated
}

/// Encrypt `plaintext` under `key`, generating a fresh random IV.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> EncryptedPacket {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    encrypt_with_iv(key, &iv, plaintext)
}

/// Encrypt with a caller-supplied IV; exposed for deterministic tests.
pub fn encrypt_with_iv(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> EncryptedPacket {
    let ciphertext = Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(plaintext);
    let hash = compute_hmac(key, ciphertext.len() as u32, iv, &ciphertext);
    EncryptedPacket {
        hash,
        iv: *iv,
        ciphertext,
    }
}

/// Verify HMAC in constant time, then decrypt. Any integrity failure is
/// reported as [`CryptoError::BadHmac`] without distinguishing *why* it
/// failed, per the integrity error class (§7).
pub fn decrypt(key: &[u8; KEY_LEN], packet: &EncryptedPacket) -> Result<Vec<u8>, CryptoError> {
    let expected = compute_hmac(key, packet.ciphertext.len() as u32, &packet.iv, &packet.ciphertext);
    if expected.ct_eq(&packet.hash).unwrap_u8() != 1 {
        return Err(CryptoError::BadHmac);
    }
    Aes128CbcDec::new(key.into(), (&packet.iv).into())
        .decrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(&packet.ciphertext)
        .map_err(|_| CryptoError::BadPadding)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = *b"0123456789abcdef";

    #[test]
    fn roundtrip_encrypt_decrypt() {
        let plaintext = b"hello remote desktop".to_vec();
        let packet = encrypt(&KEY, &plaintext);
        let recovered = decrypt(&KEY, &packet).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn roundtrip_wire_bytes() {
        let plaintext = vec![0xAB; 300];
        let packet = encrypt(&KEY, &plaintext);
        let wire = packet.to_wire_bytes();
        let back = EncryptedPacket::from_wire_bytes(&wire).unwrap();
        assert_eq!(back, packet);
        assert_eq!(decrypt(&KEY, &back).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails_hmac() {
        let plaintext = b"secret".to_vec();
        let packet = encrypt(&KEY, &plaintext);
        let wrong_key = [1u8; KEY_LEN];
        assert!(matches!(decrypt(&wrong_key, &packet), Err(CryptoError::BadHmac)));
    }

    #[test]
    fn tampered_ciphertext_fails_hmac() {
        let plaintext = b"tamper me".to_vec();
        let mut packet = encrypt(&KEY, &plaintext);
        packet.ciphertext[0] ^= 0xFF;
        assert!(matches!(decrypt(&KEY, &packet), Err(CryptoError::BadHmac)));
    }

    #[test]
    fn tampered_hash_fails() {
        let plaintext = b"tamper the tag".to_vec();
        let mut packet = encrypt(&KEY, &plaintext);
        packet.hash[0] ^= 0xFF;
        assert!(matches!(decrypt(&KEY, &packet), Err(CryptoError::BadHmac)));
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let packet = encrypt(&KEY, &[]);
        assert_eq!(decrypt(&KEY, &packet).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn from_wire_bytes_rejects_truncated_header() {
        assert!(matches!(
            EncryptedPacket::from_wire_bytes(&[0u8; 10]),
            Err(CryptoError::TooShort { .. })
        ));
    }

    #[test]
    fn from_wire_bytes_rejects_oversize_cipher_len() {
        let mut bytes = vec![0u8; HASH_LEN];
        bytes.extend_from_slice(&((MAX_CIPHERTEXT_LEN as u32) + 1).to_le_bytes());
        bytes.extend_from_slice(&[0u8; IV_LEN]);
        assert!(matches!(
            EncryptedPacket::from_wire_bytes(&bytes),
            Err(CryptoError::OversizeCiphertext(_))
        ));
    }
}
