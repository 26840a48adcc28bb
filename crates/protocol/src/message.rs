//! Control-message protocol (§3, §4.6): tagged unions carried over TCP
//! `Packet`s of type `Message`, encoded with `postcard` and framed with a
//! 4-byte big-endian length prefix, mirroring the teacher's
//! `try_decode_frame`/`BytesMut` pattern.

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Largest single TCP-framed message (control messages ride well under
/// this; it bounds a malicious/corrupt length prefix).
pub const LARGEST_TCP_PACKET: usize = 10_000_000;

/// The three interaction modes a connected client can hold (§4.6). Every
/// activated client starts as `Control` (§4.6's "all clients are
/// controllers" default); only one may hold `ExclusiveControl` at a time.
/// `Spectate` is also the not-yet-activated sentinel for a freshly reset
/// slot, hence the derived default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InteractionMode {
    #[default]
    Spectate,
    Control,
    ExclusiveControl,
}

impl InteractionMode {
    pub fn is_controlling(self) -> bool {
        matches!(self, InteractionMode::Control | InteractionMode::ExclusiveControl)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerBoundMessage {
    Keyboard { code: u32, pressed: bool },
    MouseButton { button: u8, pressed: bool, x: i32, y: i32 },
    MouseWheel { delta_x: i32, delta_y: i32 },
    MouseMotion { x: i32, y: i32, relative: bool },
    ReleaseAllInput,
    Mbps { max_mbps: f64 },
    Ping { id: u32 },
    Dimensions { width: i32, height: i32, dpi: i32, codec: crate::VideoCodec },
    NackVideo { id: i32, index: i16 },
    NackAudio { id: i32, index: i16 },
    KeyboardState { caps_lock: bool, num_lock: bool },
    Clipboard { data: Vec<u8> },
    IFrameRequest { force: bool },
    InteractionMode { mode: InteractionMode },
    Quit,
    DiscoveryRequest { connection_id: u32, user_email: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientBoundMessage {
    Pong { id: u32 },
    AudioFrequency { sample_rate: u32 },
    Clipboard { data: Vec<u8> },
    WindowTitle { title: String },
    DiscoveryReply {
        udp_port: u16,
        tcp_port: u16,
        connection_id: u32,
    },
    Init { width: i32, height: i32, codec_type: u32 },
    Quit,
}

fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(postcard::to_allocvec(msg)?)
}

fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, ProtocolError> {
    Ok(postcard::from_bytes(bytes)?)
}

impl ServerBoundMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

impl ClientBoundMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

/// Prepend the 4-byte big-endian length prefix used for TCP framing (§6).
pub fn frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > LARGEST_TCP_PACKET {
        return Err(ProtocolError::MessageTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Pull one length-prefixed message out of `buf` if a complete one is
/// buffered. Returns `Ok(None)` when more bytes are needed.
pub fn try_decode_frame(buf: &mut BytesMut) -> Result<Option<Vec<u8>>, ProtocolError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let length = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    if length > LARGEST_TCP_PACKET {
        return Err(ProtocolError::MessageTooLarge(length));
    }
    if buf.len() < 4 + length {
        return Ok(None);
    }
    buf.advance(4);
    Ok(Some(buf.split_to(length).to_vec()))
}
