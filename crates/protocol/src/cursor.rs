//! Cursor image/state carried inside a video frame envelope (§3).

use crate::error::ProtocolError;

pub const MAX_CURSOR_WIDTH: usize = 64;
pub const MAX_CURSOR_HEIGHT: usize = 64;

/// BGRA pixel count of the fixed-size cursor bitmap.
const CURSOR_BITMAP_LEN: usize = MAX_CURSOR_WIDTH * MAX_CURSOR_HEIGHT;
const CURSOR_BITMAP_BYTES: usize = CURSOR_BITMAP_LEN * 4;

/// Fixed header: cursor_id(4) + state(4) + using_bitmap(1) + bmp_w(2) +
/// bmp_h(2) + hot_x(2) + hot_y(2).
const CURSOR_HEADER_SIZE: usize = 17;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub cursor_id: u32,
    pub state: u32,
    pub hot_x: u16,
    pub hot_y: u16,
    /// `None` for a named system cursor (identified by `cursor_id`); `Some`
    /// for a custom bitmap cursor the client must rasterize directly.
    pub bitmap: Option<CursorBitmap>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorBitmap {
    pub width: u16,
    pub height: u16,
    /// BGRA8888 pixels, always `MAX_CURSOR_WIDTH * MAX_CURSOR_HEIGHT` long;
    /// only the top-left `width * height` region is meaningful.
    pub pixels: Vec<u32>,
}

impl CursorImage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(CURSOR_HEADER_SIZE + CURSOR_BITMAP_BYTES);
        buf.extend_from_slice(&self.cursor_id.to_le_bytes());
        buf.extend_from_slice(&self.state.to_le_bytes());
        buf.push(self.bitmap.is_some() as u8);
        let (bmp_w, bmp_h) = match &self.bitmap {
            Some(b) => (b.width, b.height),
            None => (0, 0),
        };
        buf.extend_from_slice(&bmp_w.to_le_bytes());
        buf.extend_from_slice(&bmp_h.to_le_bytes());
        buf.extend_from_slice(&self.hot_x.to_le_bytes());
        buf.extend_from_slice(&self.hot_y.to_le_bytes());

        match &self.bitmap {
            Some(b) => {
                if b.width as usize > MAX_CURSOR_WIDTH || b.height as usize > MAX_CURSOR_HEIGHT {
                    return Err(ProtocolError::OversizeCursor);
                }
                if b.pixels.len() != CURSOR_BITMAP_LEN {
                    return Err(ProtocolError::OversizeCursor);
                }
                for px in &b.pixels {
                    buf.extend_from_slice(&px.to_le_bytes());
                }
            }
            None => buf.extend_from_slice(&[0u8; CURSOR_BITMAP_BYTES]),
        }
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let total = CURSOR_HEADER_SIZE + CURSOR_BITMAP_BYTES;
        if bytes.len() < total {
            return Err(ProtocolError::PacketTooShort {
                expected: total,
                got: bytes.len(),
            });
        }
        let cursor_id = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let state = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let using_bitmap = bytes[8] != 0;
        let bmp_w = u16::from_le_bytes(bytes[9..11].try_into().unwrap());
        let bmp_h = u16::from_le_bytes(bytes[11..13].try_into().unwrap());
        let hot_x = u16::from_le_bytes(bytes[13..15].try_into().unwrap());
        let hot_y = u16::from_le_bytes(bytes[15..17].try_into().unwrap());

        if bmp_w as usize > MAX_CURSOR_WIDTH || bmp_h as usize > MAX_CURSOR_HEIGHT {
            return Err(ProtocolError::OversizeCursor);
        }

        let bitmap = if using_bitmap {
            let pixel_bytes = &bytes[CURSOR_HEADER_SIZE..CURSOR_HEADER_SIZE + CURSOR_BITMAP_BYTES];
            let pixels = pixel_bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Some(CursorBitmap {
                width: bmp_w,
                height: bmp_h,
                pixels,
            })
        } else {
            None
        };

        Ok(CursorImage {
            cursor_id,
            state,
            hot_x,
            hot_y,
            bitmap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_system_cursor() {
        let c = CursorImage {
            cursor_id: 3,
            state: 1,
            hot_x: 0,
            hot_y: 0,
            bitmap: None,
        };
        let bytes = c.to_bytes().unwrap();
        assert_eq!(CursorImage::from_bytes(&bytes).unwrap(), c);
    }

    #[test]
    fn roundtrip_bitmap_cursor() {
        let c = CursorImage {
            cursor_id: 99,
            state: 0,
            hot_x: 4,
            hot_y: 4,
            bitmap: Some(CursorBitmap {
                width: 8,
                height: 8,
                pixels: vec![0xFF00_00FF; CURSOR_BITMAP_LEN],
            }),
        };
        let bytes = c.to_bytes().unwrap();
        let back = CursorImage::from_bytes(&bytes).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn rejects_oversize_bitmap_dims() {
        let c = CursorImage {
            cursor_id: 1,
            state: 0,
            hot_x: 0,
            hot_y: 0,
            bitmap: Some(CursorBitmap {
                width: MAX_CURSOR_WIDTH as u16 + 1,
                height: 8,
                pixels: vec![0; CURSOR_BITMAP_LEN],
            }),
        };
        assert!(matches!(c.to_bytes(), Err(ProtocolError::OversizeCursor)));
    }
}
