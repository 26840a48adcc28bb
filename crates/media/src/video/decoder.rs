use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, decoder};
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video;
use std::sync::Once;
use tracing::info;

use protocol::VideoCodec;

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        ffmpeg::init().expect("Failed to initialize FFmpeg");
    });
}

/// Concrete "software" `VideoDecoder` (§4.7/§4.8). Falls back through an
/// ordered list of decoder backends: current-generation hardware, an older
/// hardware backend, Quick Sync, then the plain software decoder.
pub struct Decoder {
    decoder: decoder::Video,
}

unsafe impl Send for Decoder {}

#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    /// I420 data (Y + U + V planes, total width*height*3/2 bytes).
    pub i420_data: Vec<u8>,
}

fn decoder_fallback_chain(codec: VideoCodec) -> &'static [(&'static str, &'static str)] {
    match codec {
        VideoCodec::H264 => &[
            ("h264_cuvid", "NVIDIA NVDEC (current)"),
            ("h264_cuvid", "NVIDIA NVDEC (legacy)"),
            ("h264_qsv", "Intel Quick Sync"),
        ],
        VideoCodec::H265 => &[
            ("hevc_cuvid", "NVIDIA NVDEC (current)"),
            ("hevc_cuvid", "NVIDIA NVDEC (legacy)"),
            ("hevc_qsv", "Intel Quick Sync"),
        ],
    }
}

fn software_codec_id(codec: VideoCodec) -> codec::Id {
    match codec {
        VideoCodec::H264 => codec::Id::H264,
        VideoCodec::H265 => codec::Id::HEVC,
    }
}

impl Decoder {
    pub fn new(codec: VideoCodec) -> Result<Self> {
        init_ffmpeg();

        for &(name, label) in decoder_fallback_chain(codec) {
            if let Some(ffmpeg_codec) = decoder::find_by_name(name) {
                if let Ok(dec) = codec::context::Context::new_with_codec(ffmpeg_codec)
                    .decoder()
                    .open_as(ffmpeg_codec)
                    .and_then(|d| d.video())
                {
                    info!("video decoder: using {} ({})", label, name);
                    return Ok(Self { decoder: dec });
                }
            }
        }

        let id = software_codec_id(codec);
        let ffmpeg_codec = decoder::find(id).ok_or_else(|| anyhow!("software decoder not found for {id:?}"))?;
        let dec = codec::context::Context::new_with_codec(ffmpeg_codec)
            .decoder()
            .open_as(ffmpeg_codec)
            .context("video decoder: failed to open software decoder")?
            .video()?;
        info!("video decoder: using software decoder");
        Ok(Self { decoder: dec })
    }

    /// Decode one compressed frame. Returns zero or more decoded frames
    /// (decoders may buffer before emitting).
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<DecodedFrame>> {
        let packet = ffmpeg::Packet::copy(data);
        self.decoder.send_packet(&packet).context("video decoder: failed to send packet")?;

        let mut frames = Vec::new();
        let mut decoded_frame = Video::empty();
        while self.decoder.receive_frame(&mut decoded_frame).is_ok() {
            let width = decoded_frame.width();
            let height = decoded_frame.height();
            let i420_data = if decoded_frame.format() == Pixel::YUV420P {
                Self::extract_i420_from_frame(&decoded_frame)
            } else {
                Self::convert_to_i420(&decoded_frame)?
            };
            frames.push(DecodedFrame { width, height, i420_data });
        }
        Ok(frames)
    }

    fn extract_i420_from_frame(frame: &Video) -> Vec<u8> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let y_size = width * height;
        let uv_size = y_size / 4;

        let mut i420_data = Vec::with_capacity(y_size + 2 * uv_size);

        let y_stride = frame.stride(0);
        let y_plane = frame.data(0);
        for row in 0..height {
            let start = row * y_stride;
            i420_data.extend_from_slice(&y_plane[start..start + width]);
        }

        let uv_height = (height + 1) / 2;
        let uv_width = (width + 1) / 2;
        let u_stride = frame.stride(1);
        let u_plane = frame.data(1);
        for row in 0..uv_height {
            let start = row * u_stride;
            i420_data.extend_from_slice(&u_plane[start..start + uv_width]);
        }

        let v_stride = frame.stride(2);
        let v_plane = frame.data(2);
        for row in 0..uv_height {
            let start = row * v_stride;
            i420_data.extend_from_slice(&v_plane[start..start + uv_width]);
        }

        i420_data
    }

    fn convert_to_i420(frame: &Video) -> Result<Vec<u8>> {
        let width = frame.width();
        let height = frame.height();

        let mut scaler = ffmpeg::software::scaling::context::Context::get(
            frame.format(),
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("video decoder: failed to create scaler context")?;

        let mut i420_frame = Video::empty();
        scaler.run(frame, &mut i420_frame).context("video decoder: failed to convert to I420")?;
        Ok(Self::extract_i420_from_frame(&i420_frame))
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.decoder.send_eof();
        let mut frame = Video::empty();
        while self.decoder.receive_frame(&mut frame).is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_new_h264() {
        let dec = Decoder::new(VideoCodec::H264);
        assert!(dec.is_ok());
    }

    #[test]
    fn decoder_new_h265() {
        let dec = Decoder::new(VideoCodec::H265);
        assert!(dec.is_ok());
    }
}
