//! Plaintext packet layout (§3, §6).
//!
//! This is the logical payload carried inside an encrypted wire frame
//! (`crypto::EncryptedPacket`). This crate never touches the cipher layer —
//! it only knows how to lay the header and data out as bytes.

use crate::error::ProtocolError;

/// Largest payload a single fragment may carry. Matches the historical
/// `MAX_PAYLOAD_SIZE` constant (UDP MTU headroom).
pub const MAX_PAYLOAD_SIZE: usize = 1285;

/// Fixed header size: type(4) + id(4) + index(2) + num_indices(2) +
/// payload_size(4) + is_nack(1) + pad(3).
pub const PACKET_HEADER_SIZE: usize = 20;

/// Largest possible on-wire plaintext packet (header + max payload).
pub const MAX_PACKET_SIZE: usize = PACKET_HEADER_SIZE + MAX_PAYLOAD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    Video = 0,
    Audio = 1,
    Message = 2,
}

impl PacketType {
    fn from_u32(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(PacketType::Video),
            1 => Ok(PacketType::Audio),
            2 => Ok(PacketType::Message),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// One fragment of a larger payload, or a whole payload when `num_indices == 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub id: i32,
    pub index: i16,
    pub num_indices: i16,
    pub is_nack: bool,
    pub data: Vec<u8>,
}

impl Packet {
    /// Number of fragments needed to carry `payload_len` bytes.
    pub fn num_fragments(payload_len: usize) -> i16 {
        let n = payload_len.div_ceil(MAX_PAYLOAD_SIZE).max(1);
        n as i16
    }

    pub fn to_plaintext_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.data.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizePayload(self.data.len()));
        }
        let mut buf = Vec::with_capacity(PACKET_HEADER_SIZE + self.data.len());
        buf.extend_from_slice(&(self.packet_type as u32).to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.num_indices.to_le_bytes());
        buf.extend_from_slice(&(self.data.len() as i32).to_le_bytes());
        buf.push(self.is_nack as u8);
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    pub fn from_plaintext_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: PACKET_HEADER_SIZE,
                got: bytes.len(),
            });
        }
        let packet_type = PacketType::from_u32(u32::from_le_bytes(bytes[0..4].try_into().unwrap()))?;
        let id = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let index = i16::from_le_bytes(bytes[8..10].try_into().unwrap());
        let num_indices = i16::from_le_bytes(bytes[10..12].try_into().unwrap());
        let payload_size = i32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let is_nack = bytes[16] != 0;

        if payload_size < 0 || payload_size as usize > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizePayload(payload_size.max(0) as usize));
        }
        let payload_size = payload_size as usize;
        let data_start = PACKET_HEADER_SIZE;
        let data_end = data_start + payload_size;
        if bytes.len() < data_end {
            return Err(ProtocolError::PacketTooShort {
                expected: data_end,
                got: bytes.len(),
            });
        }

        Ok(Packet {
            packet_type,
            id,
            index,
            num_indices,
            is_nack,
            data: bytes[data_start..data_end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_small_packet() {
        let p = Packet {
            packet_type: PacketType::Video,
            id: 42,
            index: 0,
            num_indices: 3,
            is_nack: false,
            data: vec![1, 2, 3, 4, 5],
        };
        let bytes = p.to_plaintext_bytes().unwrap();
        let back = Packet::from_plaintext_bytes(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn roundtrip_nack_flag() {
        let p = Packet {
            packet_type: PacketType::Audio,
            id: -5,
            index: 2,
            num_indices: 2,
            is_nack: true,
            data: vec![],
        };
        let bytes = p.to_plaintext_bytes().unwrap();
        let back = Packet::from_plaintext_bytes(&bytes).unwrap();
        assert!(back.is_nack);
        assert_eq!(back.id, -5);
    }

    #[test]
    fn rejects_oversize_payload() {
        let p = Packet {
            packet_type: PacketType::Message,
            id: 0,
            index: 0,
            num_indices: 1,
            is_nack: false,
            data: vec![0u8; MAX_PAYLOAD_SIZE + 1],
        };
        assert!(matches!(
            p.to_plaintext_bytes(),
            Err(ProtocolError::OversizePayload(_))
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        let err = Packet::from_plaintext_bytes(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, ProtocolError::PacketTooShort { .. }));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut bytes = vec![9, 0, 0, 0];
        bytes.extend_from_slice(&[0u8; PACKET_HEADER_SIZE - 4]);
        let err = Packet::from_plaintext_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownPacketType(9)));
    }

    #[test]
    fn num_fragments_boundary() {
        assert_eq!(Packet::num_fragments(0), 1);
        assert_eq!(Packet::num_fragments(MAX_PAYLOAD_SIZE), 1);
        assert_eq!(Packet::num_fragments(MAX_PAYLOAD_SIZE + 1), 2);
        assert_eq!(Packet::num_fragments(MAX_PAYLOAD_SIZE * 3), 3);
    }
}
