//! Media Pipeline (Server) (§4.7): Capturer → VideoEncoder → Fragmenter →
//! UDP sender, with bitrate control and I-frame requests, plus the mirrored
//! audio path. One Capturer/Encoder pair drives the whole session (a single
//! shared desktop, not a per-client view) and every active client's UDP
//! context receives the same fragmented frame — a simplification from the
//! spec's generic multi-client model, recorded in DESIGN.md.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use clock::Throttler;
use media::traits::{Capturer, Dimensions};
use media::video::{Encoder as VideoEncoder, TestPatternCapturer};
use protocol::fragment::{fragment, SendCache};
use protocol::{FrameEnvelope, PacketType, VideoCodec};

use crate::manager::SessionManager;

/// Shared, cross-task control surface the control-message handlers push
/// updates into and the pipeline loops poll from (§4.6 Dimensions/Mbps/
/// IFrameRequest handlers).
pub struct PipelineHandle {
    pub dimensions: watch::Sender<Dimensions>,
    pub codec: Mutex<VideoCodec>,
    pub wants_iframe: AtomicBool,
    pub throttler: Arc<Throttler>,
}

impl PipelineHandle {
    pub fn new(initial: Dimensions, codec: VideoCodec, max_mbps: f64) -> (Arc<Self>, watch::Receiver<Dimensions>) {
        let (tx, rx) = watch::channel(initial);
        let handle = Arc::new(PipelineHandle {
            dimensions: tx,
            codec: Mutex::new(codec),
            wants_iframe: AtomicBool::new(true),
            throttler: Arc::new(Throttler::new(max_mbps)),
        });
        (handle, rx)
    }

    pub fn request_iframe(&self) {
        self.wants_iframe.store(true, Ordering::SeqCst);
    }

    pub fn set_dimensions(&self, dims: Dimensions) {
        let _ = self.dimensions.send(dims);
    }

    pub fn set_codec(&self, codec: VideoCodec) {
        *self.codec.lock().unwrap() = codec;
    }

    pub fn set_max_mbps(&self, mbps: f64) {
        self.throttler.set_max_mbps(mbps);
    }
}

const VIDEO_FPS: u32 = 30;
const MIN_FPS: u32 = 10;
const STARTING_BURST_BITRATE_KBPS: u32 = 4000;

/// Drives capture/encode/fragment/send for the video channel until
/// cancelled. Rebuilds the Capturer/Encoder whenever the handle's
/// dimensions or codec change, without blocking in-flight frames on the
/// rebuild (§4.7 encoder factory state machine, simplified to a blocking
/// rebuild on the same task since software/test encoders open quickly).
pub async fn run_video_pipeline(
    manager: Arc<SessionManager>,
    handle: Arc<PipelineHandle>,
    mut dims_rx: watch::Receiver<Dimensions>,
    send_cache: Arc<Mutex<SendCache>>,
) {
    let mut dims = *dims_rx.borrow();
    let mut codec = *handle.codec.lock().unwrap();
    let mut capturer = TestPatternCapturer::new(dims);
    let mut encoder = match VideoEncoder::new(codec, dims.width as u32, dims.height as u32, STARTING_BURST_BITRATE_KBPS, VIDEO_FPS) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "video pipeline: initial encoder build failed, pipeline disabled");
            return;
        }
    };

    let id_counter = AtomicI32::new(1);
    let mut interval = tokio::time::interval(Duration::from_secs(1) / VIDEO_FPS);
    let mut consecutive_capture_failures = 0u32;
    let mut last_stats = tokio::time::Instant::now();
    let mut frames_sent: u64 = 0;

    loop {
        interval.tick().await;

        if dims_rx.has_changed().unwrap_or(false) {
            dims = *dims_rx.borrow_and_update();
        }
        let desired_codec = *handle.codec.lock().unwrap();
        if desired_codec != codec || dims.width as u32 != encoder.width() || dims.height as u32 != encoder.height() {
            codec = desired_codec;
            capturer = TestPatternCapturer::new(dims);
            match VideoEncoder::new(codec, dims.width as u32, dims.height as u32, STARTING_BURST_BITRATE_KBPS, VIDEO_FPS) {
                Ok(e) => {
                    encoder = e;
                    handle.request_iframe();
                }
                Err(e) => {
                    warn!(error = %e, "video pipeline: encoder rebuild failed, keeping prior encoder");
                }
            }
        }

        let frame = match capturer.capture() {
            Ok(f) => {
                consecutive_capture_failures = 0;
                f
            }
            Err(e) => {
                consecutive_capture_failures += 1;
                if consecutive_capture_failures >= 3 {
                    warn!(error = %e, "video pipeline: repeated capture failures");
                }
                continue;
            }
        };

        let force_keyframe = handle.wants_iframe.swap(false, Ordering::SeqCst);
        let encoded = match encoder.encode(&frame.i420_data, frames_sent as i64, force_keyframe) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "video pipeline: encode failed, requesting rebuild");
                handle.request_iframe();
                continue;
            }
        };

        for enc_frame in encoded {
            let envelope = FrameEnvelope {
                width: dims.width,
                height: dims.height,
                codec,
                is_iframe: enc_frame.is_keyframe,
                cursor: frame.cursor.clone(),
                video_data: enc_frame.data,
                peer_messages: Vec::new(),
            };
            let Ok(payload) = envelope.to_bytes() else {
                warn!("video pipeline: frame envelope exceeded LARGEST_FRAME_SIZE, dropping");
                continue;
            };

            let id = id_counter.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(id, hash = crypto::debug_hash(&payload), "video pipeline: frame ready");
            let fragments = fragment(PacketType::Video, id, &payload);
            send_cache.lock().unwrap().insert(id, fragments.clone());

            let targets = manager.broadcast_targets().await;
            for packet in &fragments {
                handle.throttler.await_bytes(packet.data.len()).await;
                for (ctx, addr) in &targets {
                    if let Err(e) = ctx.send_packet(*addr, packet).await {
                        warn!(%addr, error = %e, "video pipeline: send failed");
                    }
                }
            }
            frames_sent += 1;
        }

        if last_stats.elapsed() >= Duration::from_secs(5) {
            info!(frames_sent, fps = VIDEO_FPS, "video pipeline stats");
            last_stats = tokio::time::Instant::now();
        }
    }
}

/// Mirrors the video path for audio: a fixed-cadence source (silence, in
/// the absence of a real desktop-audio Capturer) encoded with Opus and
/// fragmented/sent identically (§4.7 "Audio pipeline mirrors video").
pub async fn run_audio_pipeline(manager: Arc<SessionManager>, bitrate_bps: i32, send_cache: Arc<Mutex<SendCache>>) {
    let mut encoder = match media::audio::Encoder::new(bitrate_bps) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "audio pipeline: encoder build failed, pipeline disabled");
            return;
        }
    };

    let frame_samples = encoder.frame_size() * 2;
    let frame_duration = Duration::from_millis(1000) * encoder.frame_size() as u32 / encoder.sample_rate();
    let silence = vec![0f32; frame_samples];

    let id_counter = AtomicI32::new(1);
    let mut interval = tokio::time::interval(frame_duration);

    loop {
        interval.tick().await;

        let encoded = match encoder.encode(&silence) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "audio pipeline: encode failed");
                continue;
            }
        };

        let audio_frame = protocol::AudioFrame { data: encoded };
        let payload = audio_frame.to_bytes();

        let id = id_counter.fetch_add(1, Ordering::Relaxed);
        let fragments = fragment(PacketType::Audio, id, &payload);
        send_cache.lock().unwrap().insert(id, fragments.clone());

        let targets = manager.broadcast_targets().await;
        for packet in &fragments {
            for (ctx, addr) in &targets {
                if let Err(e) = ctx.send_packet(*addr, packet).await {
                    warn!(%addr, error = %e, "audio pipeline: send failed");
                }
            }
        }
    }
}

pub fn default_codec() -> VideoCodec {
    VideoCodec::H264
}

pub const MIN_FPS_HINT: u32 = MIN_FPS;
