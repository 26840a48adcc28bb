//! Concrete "software" `Capturer` (§4.7).
//!
//! Real desktop frame grabbing (DXGI/X11/Wayland/CoreGraphics) is the
//! out-of-scope platform integration the spec abstracts behind the
//! `Capturer` trait. This implementation produces a deterministic animated
//! test pattern in I420 directly, so the server's encode/fragment/send path
//! is exercised end-to-end without a platform capture backend.

use anyhow::Result;

use crate::traits::{CapturedFrame, Capturer, Dimensions};

pub struct TestPatternCapturer {
    dimensions: Dimensions,
    frame_index: u64,
}

impl TestPatternCapturer {
    pub fn new(dimensions: Dimensions) -> Self {
        TestPatternCapturer {
            dimensions,
            frame_index: 0,
        }
    }

    fn render_i420(&self) -> Vec<u8> {
        let w = self.dimensions.width.max(2) as usize;
        let h = self.dimensions.height.max(2) as usize;
        let y_size = w * h;
        let uv_w = w.div_ceil(2);
        let uv_h = h.div_ceil(2);
        let mut buf = vec![0u8; y_size + 2 * uv_w * uv_h];

        let phase = (self.frame_index % 256) as u8;
        for row in 0..h {
            for col in 0..w {
                buf[row * w + col] = ((row + col) as u8).wrapping_add(phase);
            }
        }
        for i in 0..(uv_w * uv_h) {
            buf[y_size + i] = 128;
            buf[y_size + uv_w * uv_h + i] = 128;
        }
        buf
    }
}

impl Capturer for TestPatternCapturer {
    fn capture(&mut self) -> Result<CapturedFrame> {
        let i420_data = self.render_i420();
        self.frame_index += 1;
        Ok(CapturedFrame {
            dimensions: self.dimensions,
            i420_data,
            cursor: None,
        })
    }

    fn set_dimensions(&mut self, dimensions: Dimensions) -> Result<()> {
        self.dimensions = dimensions;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_correctly_sized_i420_frame() {
        let dims = Dimensions { width: 16, height: 8, dpi: 96 };
        let mut capturer = TestPatternCapturer::new(dims);
        let frame = capturer.capture().unwrap();
        assert_eq!(frame.i420_data.len(), 16 * 8 + 2 * 8 * 4);
    }

    #[test]
    fn set_dimensions_changes_subsequent_captures() {
        let mut capturer = TestPatternCapturer::new(Dimensions { width: 16, height: 8, dpi: 96 });
        capturer.set_dimensions(Dimensions { width: 32, height: 16, dpi: 96 }).unwrap();
        let frame = capturer.capture().unwrap();
        assert_eq!(frame.dimensions.width, 32);
        assert_eq!(frame.i420_data.len(), 32 * 16 + 2 * 16 * 8);
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut capturer = TestPatternCapturer::new(Dimensions { width: 16, height: 8, dpi: 96 });
        let a = capturer.capture().unwrap();
        let b = capturer.capture().unwrap();
        assert_ne!(a.i420_data, b.i420_data);
    }
}
