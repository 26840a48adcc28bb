use anyhow::Result;
use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Bitrate, Channels, SampleRate};

/// Samples per channel per encoded frame at 48kHz (20ms frames).
pub const FRAME_SIZE: usize = 960;
pub const SAMPLE_RATE: u32 = 48_000;

/// Concrete "software" `AudioEncoder` (§4.7/§4.8 Media Pipeline). Encodes
/// stereo system-audio output, mirroring the teacher's screen-audio encoder
/// mode (`Application::Audio`, not the voice-tuned `Voip` mode) rather than
/// its microphone/voice-chat configuration.
pub struct Encoder {
    inner: OpusEncoder,
}

impl Encoder {
    pub fn new(bitrate_bps: i32) -> Result<Self> {
        let mut encoder = OpusEncoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio)?;
        encoder.set_bitrate(Bitrate::BitsPerSecond(bitrate_bps))?;
        Ok(Self { inner: encoder })
    }

    /// Encode one frame of interleaved stereo PCM f32 samples
    /// (`FRAME_SIZE * 2` samples) into the wire `AudioFrame` payload.
    pub fn encode(&mut self, pcm: &[f32]) -> Result<Vec<u8>> {
        assert_eq!(
            pcm.len(),
            FRAME_SIZE * 2,
            "stereo PCM frame must be exactly {} samples",
            FRAME_SIZE * 2
        );
        let mut output = vec![0u8; 1024];
        let len = self.inner.encode_float(pcm, &mut output)?;
        output.truncate(len);
        Ok(output)
    }

    pub fn frame_size(&self) -> usize {
        FRAME_SIZE
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}
