use thiserror::Error;

/// Errors raised while framing, parsing, or sizing protocol-level data.
///
/// This crate only ever reports Integrity/Protocol-class failures (§7); it
/// never decides to retry or evict — that authority belongs to the caller.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("packet too short: expected at least {expected} bytes, got {got}")]
    PacketTooShort { expected: usize, got: usize },

    #[error("unknown packet type: {0}")]
    UnknownPacketType(u32),

    #[error("unknown control message tag: {0}")]
    UnknownMessageTag(u8),

    #[error("payload size {0} exceeds MAX_PAYLOAD_SIZE ({max})", max = crate::packet::MAX_PAYLOAD_SIZE)]
    OversizePayload(usize),

    #[error("message too large: {0} bytes (max {max})", max = crate::message::LARGEST_TCP_PACKET)]
    MessageTooLarge(usize),

    #[error("frame envelope too large: {0} bytes (max {max})", max = crate::frame::LARGEST_FRAME_SIZE)]
    OversizeFrame(usize),

    #[error("reassembled size mismatch: tag {tag} expected {expected}, got {got}")]
    SizeMismatch { tag: u8, expected: usize, got: usize },

    #[error("cursor bitmap exceeds {max_w}x{max_h}", max_w = crate::cursor::MAX_CURSOR_WIDTH, max_h = crate::cursor::MAX_CURSOR_HEIGHT)]
    OversizeCursor,

    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_too_short_display() {
        let e = ProtocolError::PacketTooShort { expected: 20, got: 5 };
        let msg = e.to_string();
        assert!(msg.contains("20"));
        assert!(msg.contains('5'));
    }

    #[test]
    fn unknown_packet_type_display() {
        let e = ProtocolError::UnknownPacketType(7);
        assert!(e.to_string().contains('7'));
    }

    #[test]
    fn size_mismatch_display() {
        let e = ProtocolError::SizeMismatch { tag: 3, expected: 10, got: 12 };
        let msg = e.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("12"));
    }
}
