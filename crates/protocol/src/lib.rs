//! Wire types and framing for the remote desktop streaming protocol.
//!
//! This crate has no knowledge of the cipher layer: `packet::Packet` is
//! always the plaintext that `crypto::EncryptedPacket` wraps.

pub mod audio_frame;
pub mod cursor;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod message;
pub mod packet;

pub use audio_frame::AudioFrame;
pub use cursor::{CursorBitmap, CursorImage};
pub use error::ProtocolError;
pub use frame::{FrameEnvelope, VideoCodec};
pub use message::{ClientBoundMessage, InteractionMode, ServerBoundMessage};
pub use packet::{Packet, PacketType};
