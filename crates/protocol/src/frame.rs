//! Video frame envelope (§3, §6): the payload of a `Packet` of type `Video`
//! before fragmentation.

use serde::{Deserialize, Serialize};

use crate::cursor::CursorImage;
use crate::error::ProtocolError;

/// Total envelope size ceiling (1 MiB).
pub const LARGEST_FRAME_SIZE: usize = 1_048_576;

/// width(4) + height(4) + codec(4) + is_iframe(1) + num_peer_msgs(4) +
/// has_cursor(1) + videodata_length(4).
const FRAME_HEADER_SIZE: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum VideoCodec {
    H264 = 0,
    H265 = 1,
}

impl VideoCodec {
    fn from_u32(v: u32) -> Result<Self, ProtocolError> {
        match v {
            0 => Ok(VideoCodec::H264),
            1 => Ok(VideoCodec::H265),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEnvelope {
    pub width: i32,
    pub height: i32,
    pub codec: VideoCodec,
    pub is_iframe: bool,
    pub cursor: Option<CursorImage>,
    pub video_data: Vec<u8>,
    /// Serialized peer (client-bound) control messages piggybacked on this
    /// frame, already postcard-encoded and length-framed by the caller.
    pub peer_messages: Vec<Vec<u8>>,
}

impl FrameEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let cursor_bytes = match &self.cursor {
            Some(c) => Some(c.to_bytes()?),
            None => None,
        };

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&(self.codec as u32).to_le_bytes());
        buf.push(self.is_iframe as u8);
        buf.extend_from_slice(&(self.peer_messages.len() as i32).to_le_bytes());
        buf.push(cursor_bytes.is_some() as u8);
        buf.extend_from_slice(&(self.video_data.len() as i32).to_le_bytes());

        if let Some(c) = &cursor_bytes {
            buf.extend_from_slice(c);
        }
        buf.extend_from_slice(&self.video_data);
        for msg in &self.peer_messages {
            buf.extend_from_slice(&(msg.len() as u32).to_le_bytes());
            buf.extend_from_slice(msg);
        }

        if buf.len() > LARGEST_FRAME_SIZE {
            return Err(ProtocolError::OversizeFrame(buf.len()));
        }
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > LARGEST_FRAME_SIZE {
            return Err(ProtocolError::OversizeFrame(bytes.len()));
        }
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: FRAME_HEADER_SIZE,
                got: bytes.len(),
            });
        }
        let width = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let height = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let codec = VideoCodec::from_u32(u32::from_le_bytes(bytes[8..12].try_into().unwrap()))?;
        let is_iframe = bytes[12] != 0;
        let num_peer_msgs = i32::from_le_bytes(bytes[13..17].try_into().unwrap());
        let has_cursor = bytes[17] != 0;
        let videodata_length = i32::from_le_bytes(bytes[18..22].try_into().unwrap());

        if num_peer_msgs < 0 || videodata_length < 0 {
            return Err(ProtocolError::PacketTooShort {
                expected: FRAME_HEADER_SIZE,
                got: bytes.len(),
            });
        }

        let mut cursor_offset = FRAME_HEADER_SIZE;
        let cursor = if has_cursor {
            let remaining = &bytes[cursor_offset..];
            let c = CursorImage::from_bytes(remaining)?;
            cursor_offset += c.to_bytes()?.len();
            Some(c)
        } else {
            None
        };

        let video_start = cursor_offset;
        let video_end = video_start
            .checked_add(videodata_length as usize)
            .ok_or(ProtocolError::OversizeFrame(bytes.len()))?;
        if bytes.len() < video_end {
            return Err(ProtocolError::PacketTooShort {
                expected: video_end,
                got: bytes.len(),
            });
        }
        let video_data = bytes[video_start..video_end].to_vec();

        let mut offset = video_end;
        let mut peer_messages = Vec::with_capacity(num_peer_msgs as usize);
        for _ in 0..num_peer_msgs {
            if bytes.len() < offset + 4 {
                return Err(ProtocolError::PacketTooShort {
                    expected: offset + 4,
                    got: bytes.len(),
                });
            }
            let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            let end = offset + len;
            if bytes.len() < end {
                return Err(ProtocolError::PacketTooShort {
                    expected: end,
                    got: bytes.len(),
                });
            }
            peer_messages.push(bytes[offset..end].to_vec());
            offset = end;
        }

        Ok(FrameEnvelope {
            width,
            height,
            codec,
            is_iframe,
            cursor,
            video_data,
            peer_messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_no_cursor_no_peer_msgs() {
        let f = FrameEnvelope {
            width: 1920,
            height: 1080,
            codec: VideoCodec::H264,
            is_iframe: true,
            cursor: None,
            video_data: vec![1, 2, 3, 4],
            peer_messages: vec![],
        };
        let bytes = f.to_bytes().unwrap();
        assert_eq!(FrameEnvelope::from_bytes(&bytes).unwrap(), f);
    }

    #[test]
    fn roundtrip_with_cursor_and_peer_msgs() {
        let f = FrameEnvelope {
            width: 800,
            height: 600,
            codec: VideoCodec::H265,
            is_iframe: false,
            cursor: Some(CursorImage {
                cursor_id: 1,
                state: 0,
                hot_x: 0,
                hot_y: 0,
                bitmap: None,
            }),
            video_data: vec![9; 50],
            peer_messages: vec![vec![1, 2], vec![3, 4, 5]],
        };
        let bytes = f.to_bytes().unwrap();
        assert_eq!(FrameEnvelope::from_bytes(&bytes).unwrap(), f);
    }

    #[test]
    fn rejects_oversize_envelope() {
        let f = FrameEnvelope {
            width: 1,
            height: 1,
            codec: VideoCodec::H264,
            is_iframe: true,
            cursor: None,
            video_data: vec![0u8; LARGEST_FRAME_SIZE + 1],
            peer_messages: vec![],
        };
        assert!(matches!(f.to_bytes(), Err(ProtocolError::OversizeFrame(_))));
    }
}
