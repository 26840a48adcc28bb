//! Media Pipeline (Client) (§4.8): UDP receiver → Reassembler → decoder →
//! Renderer, with NACK issuance for missing fragments. Mirrors the server's
//! pipeline shape in reverse.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use media::audio::Decoder as AudioDecoder;
use media::traits::{Dimensions, LoggingRenderer, Renderer};
use media::video::Decoder as VideoDecoder;
use protocol::fragment::Reassembler;
use protocol::message::ServerBoundMessage;
use protocol::{FrameEnvelope, PacketType, VideoCodec};
use transport::UdpContext;

/// Drains the client's UDP context, reassembling and decoding whichever of
/// Video/Audio/Message fragments arrive, issuing `NackVideo`/`NackAudio`
/// for gaps, and rendering decoded video through a `Renderer` (§4.8
/// decoder-fallback and NACK loop).
pub async fn run(ctx: Arc<UdpContext>, nack_tx: mpsc::Sender<ServerBoundMessage>) {
    let mut video_reassembler = Reassembler::new();
    let mut audio_reassembler = Reassembler::new();
    let mut renderer = LoggingRenderer::default();

    let mut video_decoder: Option<(VideoCodec, VideoDecoder)> = None;
    let mut audio_decoder = match AudioDecoder::new() {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(error = %e, "client pipeline: audio decoder unavailable");
            None
        }
    };

    loop {
        let (_, packet) = match ctx.read_packet().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "client pipeline: udp read failed");
                continue;
            }
        };
        let Some(packet) = packet else { continue };
        let now = Instant::now();

        match packet.packet_type {
            PacketType::Video => {
                let id = packet.id;
                match video_reassembler.receive(&packet, now) {
                    Ok(Some(payload)) => handle_video_payload(&payload, &mut video_decoder, &mut renderer),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "client pipeline: video reassembly error");
                        continue;
                    }
                }
                for index in video_reassembler.gaps_due_for_nack(id, now) {
                    let _ = nack_tx.send(ServerBoundMessage::NackVideo { id, index }).await;
                }
            }
            PacketType::Audio => {
                let id = packet.id;
                match audio_reassembler.receive(&packet, now) {
                    Ok(Some(payload)) => handle_audio_payload(&payload, &mut audio_decoder),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "client pipeline: audio reassembly error");
                        continue;
                    }
                }
                for index in audio_reassembler.gaps_due_for_nack(id, now) {
                    let _ = nack_tx.send(ServerBoundMessage::NackAudio { id, index }).await;
                }
            }
            PacketType::Message => {
                // The handshake already drained these; stray post-handshake
                // Message-type UDP packets are ignored.
            }
        }
    }
}

fn handle_video_payload(payload: &[u8], decoder_slot: &mut Option<(VideoCodec, VideoDecoder)>, renderer: &mut LoggingRenderer) {
    let envelope = match FrameEnvelope::from_bytes(payload) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "client pipeline: frame envelope decode failed");
            return;
        }
    };

    let needs_rebuild = decoder_slot.as_ref().map(|(codec, _)| *codec) != Some(envelope.codec);
    if needs_rebuild {
        match VideoDecoder::new(envelope.codec) {
            Ok(d) => {
                info!(codec = ?envelope.codec, "client pipeline: video decoder (re)built");
                *decoder_slot = Some((envelope.codec, d));
            }
            Err(e) => {
                warn!(error = %e, "client pipeline: video decoder build failed");
                return;
            }
        }
    }

    let Some((_, decoder)) = decoder_slot.as_mut() else { return };
    match decoder.decode(&envelope.video_data) {
        Ok(frames) => {
            for frame in frames {
                let dims = Dimensions { width: frame.width as i32, height: frame.height as i32, dpi: 96 };
                if let Err(e) = renderer.present(&frame.i420_data, dims) {
                    warn!(error = %e, "client pipeline: present failed");
                }
            }
            let _ = renderer.set_cursor(envelope.cursor.as_ref());
        }
        Err(e) => {
            warn!(error = %e, "client pipeline: video decode failed, requesting keyframe");
        }
    }
}

fn handle_audio_payload(payload: &[u8], decoder: &mut Option<AudioDecoder>) {
    let Some(decoder) = decoder else { return };
    let frame = match protocol::AudioFrame::from_bytes(payload) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "client pipeline: audio frame decode failed");
            return;
        }
    };
    if let Err(e) = decoder.decode(&frame.data) {
        warn!(error = %e, "client pipeline: opus decode failed");
    }
}
