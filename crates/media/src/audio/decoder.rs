use anyhow::Result;
use audiopus::coder::Decoder as OpusDecoder;
use audiopus::packet::Packet;
use audiopus::{Channels, MutSignals, SampleRate};

use crate::audio::encoder::FRAME_SIZE;

/// Concrete "software" `AudioDecoder` (§4.7/§4.8). One instance per active
/// audio stream.
pub struct Decoder {
    inner: OpusDecoder,
}

impl Decoder {
    pub fn new() -> Result<Self> {
        let decoder = OpusDecoder::new(SampleRate::Hz48000, Channels::Stereo)?;
        Ok(Self { inner: decoder })
    }

    /// Decode into interleaved stereo PCM f32 samples.
    pub fn decode(&mut self, encoded: &[u8]) -> Result<Vec<f32>> {
        let mut output = vec![0.0f32; FRAME_SIZE * 2];
        let packet = Packet::try_from(encoded)?;
        let signals = MutSignals::try_from(&mut output)?;
        let samples = self.inner.decode_float(Some(packet), signals, false)?;
        output.truncate(samples * 2);
        Ok(output)
    }

    /// Decode a lost packet via Opus packet-loss concealment.
    pub fn decode_lost(&mut self) -> Result<Vec<f32>> {
        let mut output = vec![0.0f32; FRAME_SIZE * 2];
        let signals = MutSignals::try_from(&mut output)?;
        let samples = self.inner.decode_float(None, signals, false)?;
        output.truncate(samples * 2);
        Ok(output)
    }
}
