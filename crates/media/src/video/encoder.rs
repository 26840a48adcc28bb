use anyhow::{anyhow, bail, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, encoder};
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video;
use ffmpeg::{Dictionary, Rational};
use std::sync::Once;
use tracing::info;

use protocol::VideoCodec;

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        ffmpeg::init().expect("Failed to initialize FFmpeg");
    });
}

/// Concrete "software" `VideoEncoder` (§4.7 Media Pipeline). Tries hardware
/// encoders for the selected codec first, falling back to the matching
/// libx264/libx265 software encoder.
pub struct Encoder {
    encoder: encoder::Video,
    width: u32,
    height: u32,
    frame_index: i64,
    /// Pixel format used by this encoder (YUV420P for most, NV12 for QSV).
    pixel_format: Pixel,
}

unsafe impl Send for Encoder {}

#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub is_keyframe: bool,
    pub pts: i64,
}

fn hw_encoders(codec: VideoCodec) -> &'static [(&'static str, &'static str)] {
    match codec {
        VideoCodec::H264 => &[
            ("h264_nvenc", "NVIDIA NVENC"),
            ("h264_qsv", "Intel Quick Sync"),
            ("h264_amf", "AMD AMF"),
        ],
        VideoCodec::H265 => &[
            ("hevc_nvenc", "NVIDIA NVENC"),
            ("hevc_qsv", "Intel Quick Sync"),
            ("hevc_amf", "AMD AMF"),
        ],
    }
}

fn software_codec_name(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "libx264",
        VideoCodec::H265 => "libx265",
    }
}

impl Encoder {
    /// `width` and `height` must be divisible by 2. `bitrate_kbps` is the
    /// target bitrate in kilobits per second; `fps` the target frame rate.
    pub fn new(codec: VideoCodec, width: u32, height: u32, bitrate_kbps: u32, fps: u32) -> Result<Self> {
        if width % 2 != 0 || height % 2 != 0 {
            bail!("video encoder: width and height must be divisible by 2");
        }

        init_ffmpeg();

        for &(name, label) in hw_encoders(codec) {
            if let Some(ffmpeg_codec) = encoder::find_by_name(name) {
                match Self::try_open_hw(ffmpeg_codec, name, width, height, bitrate_kbps, fps) {
                    Ok(enc) => {
                        info!("video encoder: using {} hardware encoder ({})", label, name);
                        return Ok(enc);
                    }
                    Err(e) => info!("video encoder: {} not usable: {}", name, e),
                }
            }
        }

        let enc = Self::open_software(codec, width, height, bitrate_kbps, fps)?;
        info!("video encoder: using {} software encoder", software_codec_name(codec));
        Ok(enc)
    }

    fn try_open_hw(
        ffmpeg_codec: ffmpeg::Codec,
        name: &str,
        width: u32,
        height: u32,
        bitrate_kbps: u32,
        fps: u32,
    ) -> Result<Self> {
        let formats_to_try = if name.ends_with("_qsv") {
            &[Pixel::NV12][..]
        } else {
            &[Pixel::YUV420P, Pixel::NV12]
        };

        let mut last_err = None;
        for &pixel_format in formats_to_try {
            match Self::try_open_hw_with_format(ffmpeg_codec, name, width, height, bitrate_kbps, fps, pixel_format) {
                Ok(enc) => return Ok(enc),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{}: no compatible pixel format", name)))
    }

    fn try_open_hw_with_format(
        ffmpeg_codec: ffmpeg::Codec,
        name: &str,
        width: u32,
        height: u32,
        bitrate_kbps: u32,
        fps: u32,
        pixel_format: Pixel,
    ) -> Result<Self> {
        let mut encoder = codec::context::Context::new_with_codec(ffmpeg_codec)
            .encoder()
            .video()
            .context("failed to create encoder context")?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(pixel_format);
        encoder.set_time_base(Rational::new(1, fps as i32));
        encoder.set_frame_rate(Some(Rational::new(fps as i32, 1)));
        encoder.set_bit_rate(bitrate_kbps as usize * 1000);
        encoder.set_max_b_frames(0);

        let mut opts = Dictionary::new();
        if name.ends_with("_nvenc") {
            opts.set("preset", "p1");
            opts.set("tune", "ull");
            opts.set("rc", "cbr");
            opts.set("delay", "0");
            opts.set("zerolatency", "1");
        } else if name.ends_with("_qsv") {
            opts.set("preset", "veryfast");
            opts.set("async_depth", "1");
            opts.set("low_power", "1");
        } else if name.ends_with("_amf") {
            opts.set("usage", "ultralowlatency");
            opts.set("quality", "speed");
            opts.set("rc", "cbr");
        }

        let encoder = encoder
            .open_with(opts)
            .with_context(|| format!("{name}: failed to open"))?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_index: 0,
            pixel_format,
        })
    }

    fn open_software(codec: VideoCodec, width: u32, height: u32, bitrate_kbps: u32, fps: u32) -> Result<Self> {
        let name = software_codec_name(codec);
        let ffmpeg_codec = encoder::find_by_name(name)
            .ok_or_else(|| anyhow!("{name} codec not found (is FFmpeg built with it?)"))?;

        let mut encoder = codec::context::Context::new_with_codec(ffmpeg_codec)
            .encoder()
            .video()
            .context("failed to create encoder context")?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(Rational::new(1, fps as i32));
        encoder.set_frame_rate(Some(Rational::new(fps as i32, 1)));
        encoder.set_bit_rate(bitrate_kbps as usize * 1000);
        encoder.set_max_b_frames(0);

        let mut opts = Dictionary::new();
        opts.set("preset", "ultrafast");
        opts.set("tune", "zerolatency");

        let params_key = if matches!(codec, VideoCodec::H265) { "x265-params" } else { "x264-params" };
        let params = ["scenecut=0", "me=dia", "subme=0", "keyint=30", "min-keyint=30"].join(":");
        opts.set(params_key, &params);

        let encoder = encoder.open_with(opts).with_context(|| format!("{name}: failed to open encoder"))?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_index: 0,
            pixel_format: Pixel::YUV420P,
        })
    }

    /// Encode an I420 frame (`width*height*3/2` bytes: Y plane + U plane +
    /// V plane). `force_keyframe` forces an IDR.
    pub fn encode(&mut self, i420_data: &[u8], pts: i64, force_keyframe: bool) -> Result<Vec<EncodedFrame>> {
        let expected_size = (self.width as usize) * (self.height as usize) * 3 / 2;
        if i420_data.len() < expected_size {
            bail!(
                "video encoder: I420 data too short (got {}, expected {})",
                i420_data.len(),
                expected_size
            );
        }

        let mut frame = Video::new(self.pixel_format, self.width, self.height);
        frame.set_pts(Some(pts));
        if force_keyframe {
            frame.set_kind(ffmpeg::picture::Type::I);
        }

        let w = self.width as usize;
        let h = self.height as usize;
        let uv_w = (w + 1) / 2;
        let uv_h = (h + 1) / 2;
        let y_size = w * h;
        let uv_size = uv_w * uv_h;

        let y_stride = frame.stride(0);
        let y_dst = frame.data_mut(0);
        for row in 0..h {
            let src_off = row * w;
            let dst_off = row * y_stride;
            y_dst[dst_off..dst_off + w].copy_from_slice(&i420_data[src_off..src_off + w]);
        }

        if self.pixel_format == Pixel::NV12 {
            let uv_stride = frame.stride(1);
            let uv_dst = frame.data_mut(1);
            let u_src = &i420_data[y_size..y_size + uv_size];
            let v_src = &i420_data[y_size + uv_size..];
            for row in 0..uv_h {
                let dst_row = row * uv_stride;
                let src_row = row * uv_w;
                for col in 0..uv_w {
                    uv_dst[dst_row + col * 2] = u_src[src_row + col];
                    uv_dst[dst_row + col * 2 + 1] = v_src[src_row + col];
                }
            }
        } else {
            let u_stride = frame.stride(1);
            let u_dst = frame.data_mut(1);
            let u_src_base = y_size;
            for row in 0..uv_h {
                let src_off = u_src_base + row * uv_w;
                let dst_off = row * u_stride;
                u_dst[dst_off..dst_off + uv_w].copy_from_slice(&i420_data[src_off..src_off + uv_w]);
            }

            let v_stride = frame.stride(2);
            let v_dst = frame.data_mut(2);
            let v_src_base = y_size + uv_size;
            for row in 0..uv_h {
                let src_off = v_src_base + row * uv_w;
                let dst_off = row * v_stride;
                v_dst[dst_off..dst_off + uv_w].copy_from_slice(&i420_data[src_off..src_off + uv_w]);
            }
        }

        self.encoder.send_frame(&frame).context("video encoder: failed to send frame")?;

        let mut frames = Vec::new();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            frames.push(EncodedFrame {
                data: packet.data().unwrap_or(&[]).to_vec(),
                is_keyframe: packet.is_key(),
                pts: packet.pts().unwrap_or(pts),
            });
        }

        self.frame_index += 1;
        Ok(frames)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        let _ = self.encoder.send_eof();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::decoder::Decoder;

    #[test]
    fn encoder_new_valid_h264() {
        let enc = Encoder::new(VideoCodec::H264, 640, 480, 1000, 30);
        assert!(enc.is_ok());
        let enc = enc.unwrap();
        assert_eq!(enc.width(), 640);
        assert_eq!(enc.height(), 480);
    }

    #[test]
    fn encoder_odd_dimensions_fails() {
        let enc = Encoder::new(VideoCodec::H264, 641, 480, 1000, 30);
        assert!(enc.is_err());
    }

    #[test]
    fn encoder_encode_gray_frame() {
        let mut enc = Encoder::new(VideoCodec::H265, 64, 64, 500, 30).unwrap();
        let y_size = 64 * 64;
        let uv_size = 32 * 32;
        let i420 = vec![128u8; y_size + 2 * uv_size];
        let frames = enc.encode(&i420, 0, true).unwrap();
        assert!(!frames.is_empty());
        assert!(!frames[0].data.is_empty());
        assert!(frames[0].is_keyframe);
    }

    #[test]
    fn encode_decode_roundtrip_h264() {
        let mut enc = Encoder::new(VideoCodec::H264, 64, 64, 500, 30).unwrap();
        let y_size = 64 * 64;
        let uv_size = 32 * 32;
        let i420 = vec![128u8; y_size + 2 * uv_size];
        let encoded = enc.encode(&i420, 0, true).unwrap();
        assert!(!encoded.is_empty());

        let mut dec = Decoder::new(VideoCodec::H264).unwrap();
        let decoded = dec.decode(&encoded[0].data).unwrap();
        assert!(!decoded.is_empty());
        assert_eq!(decoded[0].width, 64);
        assert_eq!(decoded[0].height, 64);
    }
}
