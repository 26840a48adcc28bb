//! Private-Key Handshake (§4.3): a symmetric HMAC challenge-response that
//! confirms both ends hold the same shared secret before any packet
//! traffic is trusted.
//!
//! The socket I/O (sending the empty NAT-pinhole datagram, exchanging IVs)
//! lives in `transport`; this module only computes and verifies the
//! cryptographic response.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::cipher::KEY_LEN;
use crate::error::CryptoError;

pub const CHALLENGE_LEN: usize = 16;
pub const RESPONSE_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Generate this side's random challenge IV to send to the peer.
pub fn generate_challenge() -> [u8; CHALLENGE_LEN] {
    let mut iv = [0u8; CHALLENGE_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Compute the response to a peer's challenge: `HMAC-SHA256(key, peer_iv)`.
pub fn respond(key: &[u8; KEY_LEN], peer_challenge: &[u8; CHALLENGE_LEN]) -> [u8; RESPONSE_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(peer_challenge);
    let mut out = [0u8; RESPONSE_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Verify a peer's response to the challenge we sent them.
pub fn verify(
    key: &[u8; KEY_LEN],
    our_challenge: &[u8; CHALLENGE_LEN],
    peer_response: &[u8; RESPONSE_LEN],
) -> Result<(), CryptoError> {
    let expected = respond(key, our_challenge);
    if expected.ct_eq(peer_response).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(CryptoError::HandshakeFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = *b"0123456789abcdef";

    #[test]
    fn mutual_handshake_succeeds_with_shared_key() {
        let server_challenge = generate_challenge();
        let client_challenge = generate_challenge();

        let client_response = respond(&KEY, &server_challenge);
        let server_response = respond(&KEY, &client_challenge);

        assert!(verify(&KEY, &server_challenge, &client_response).is_ok());
        assert!(verify(&KEY, &client_challenge, &server_response).is_ok());
    }

    #[test]
    fn mismatched_key_fails_handshake() {
        let challenge = generate_challenge();
        let response = respond(&KEY, &challenge);
        let wrong_key = [9u8; KEY_LEN];
        assert!(matches!(
            verify(&wrong_key, &challenge, &response),
            Err(CryptoError::HandshakeFailed)
        ));
    }

    #[test]
    fn tampered_response_fails() {
        let challenge = generate_challenge();
        let mut response = respond(&KEY, &challenge);
        response[0] ^= 0xFF;
        assert!(matches!(
            verify(&KEY, &challenge, &response),
            Err(CryptoError::HandshakeFailed)
        ));
    }
}
