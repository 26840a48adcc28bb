//! Encoded audio payload carried inside `Packet` fragments of type `Audio` (§3).

use crate::error::ProtocolError;

/// `data_length:i32 | data[data_length]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Opus-encoded bytes.
    pub data: Vec<u8>,
}

impl AudioFrame {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.extend_from_slice(&(self.data.len() as i32).to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::PacketTooShort {
                expected: 4,
                got: bytes.len(),
            });
        }
        let data_length = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if data_length < 0 {
            return Err(ProtocolError::PacketTooShort { expected: 4, got: bytes.len() });
        }
        let data_length = data_length as usize;
        let end = 4 + data_length;
        if bytes.len() < end {
            return Err(ProtocolError::PacketTooShort {
                expected: end,
                got: bytes.len(),
            });
        }
        Ok(AudioFrame {
            data: bytes[4..end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_audio_frame() {
        let f = AudioFrame {
            data: vec![0xAA; 200],
        };
        let bytes = f.to_bytes();
        assert_eq!(AudioFrame::from_bytes(&bytes).unwrap(), f);
    }

    #[test]
    fn roundtrip_empty_audio_frame() {
        let f = AudioFrame { data: vec![] };
        let bytes = f.to_bytes();
        assert_eq!(AudioFrame::from_bytes(&bytes).unwrap(), f);
    }

    #[test]
    fn rejects_truncated_data() {
        let mut bytes = 100i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        assert!(AudioFrame::from_bytes(&bytes).is_err());
    }
}
