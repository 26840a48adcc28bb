//! TCP control-message framing (§4.2, §6): `length:u32 | Packet(length)`.
//!
//! Mirrors the teacher's split reader/writer task pattern: the caller owns
//! the `TcpStream` halves and drives these functions from its own loop
//! rather than this module owning the connection lifecycle.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use protocol::message::{frame, try_decode_frame};
use protocol::ProtocolError;

use crate::error::TransportError;

const READ_CHUNK_SIZE: usize = 4096;

/// Read from `stream` into `buf` until one complete frame is available,
/// returning its payload. Returns `Ok(None)` on clean EOF with no partial
/// frame pending.
pub async fn read_frame(
    stream: &mut (impl tokio::io::AsyncRead + Unpin),
    buf: &mut BytesMut,
) -> Result<Option<Vec<u8>>, TransportError> {
    loop {
        if let Some(payload) = try_decode_frame(buf).map_err(TransportError::Protocol)? {
            return Ok(Some(payload));
        }
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(TransportError::Protocol(ProtocolError::PacketTooShort {
                expected: 4,
                got: buf.len(),
            }));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

pub async fn write_frame(
    stream: &mut (impl tokio::io::AsyncWrite + Unpin),
    payload: &[u8],
) -> Result<(), TransportError> {
    let framed = frame(payload).map_err(TransportError::Protocol)?;
    stream.write_all(&framed).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let mut out = Vec::new();
        write_frame(&mut out, b"hello").await.unwrap();

        let mut cursor = Cursor::new(out);
        let mut buf = BytesMut::new();
        let payload = read_frame(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(payload, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn clean_eof_with_no_data_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let mut buf = BytesMut::new();
        let payload = read_frame(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(payload, None);
    }

    #[tokio::test]
    async fn multiple_frames_in_one_stream() {
        let mut out = Vec::new();
        write_frame(&mut out, b"first").await.unwrap();
        write_frame(&mut out, b"second").await.unwrap();

        let mut cursor = Cursor::new(out);
        let mut buf = BytesMut::new();
        let first = read_frame(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(first, Some(b"first".to_vec()));
        let second = read_frame(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(second, Some(b"second".to_vec()));
    }
}
