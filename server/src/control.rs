//! Control-Message Protocol, server side (§4.6): validates and dispatches
//! each `ServerBoundMessage`, mirroring the original's per-tag handler list.

use std::net::SocketAddr;
use std::sync::Mutex;

use tracing::debug;

use media::traits::{InputEvent, InputInjector};
use protocol::fragment::SendCache;
use protocol::message::{ClientBoundMessage, ServerBoundMessage};
use transport::UdpContext;

use crate::manager::SessionManager;
use crate::pipeline::PipelineHandle;

/// Handle one reassembled `ServerBoundMessage` from `slot_index`. Returns a
/// `ClientBoundMessage` to send back over the same channel the message
/// arrived on, if the tag produces one (only `Ping` does).
#[allow(clippy::too_many_arguments)]
pub async fn handle(
    manager: &SessionManager,
    slot_index: usize,
    msg: ServerBoundMessage,
    injector: &mut dyn InputInjector,
    pipeline: &PipelineHandle,
    video_cache: &Mutex<SendCache>,
    audio_cache: &Mutex<SendCache>,
    udp_ctx: &UdpContext,
    reply_addr: SocketAddr,
) -> Option<ClientBoundMessage> {
    match msg {
        ServerBoundMessage::Ping { id } => {
            manager.record_ping(slot_index).await;
            return Some(ClientBoundMessage::Pong { id });
        }

        ServerBoundMessage::Keyboard { code, pressed } => {
            if manager.is_controlling(slot_index).await {
                let _ = injector.inject(InputEvent::Key { code, pressed });
            }
        }

        ServerBoundMessage::MouseButton { button, pressed, x, y } => {
            if manager.is_controlling(slot_index).await {
                let _ = injector.inject(InputEvent::MouseButton { button, pressed, x, y });
            }
        }

        ServerBoundMessage::MouseWheel { delta_x, delta_y } => {
            if manager.is_controlling(slot_index).await {
                let _ = injector.inject(InputEvent::MouseWheel { delta_x, delta_y });
            }
        }

        ServerBoundMessage::MouseMotion { x, y, relative } => {
            if manager.is_controlling(slot_index).await {
                let _ = injector.inject(InputEvent::MouseMotion { x, y, relative });
                if !relative {
                    manager.update_mouse(slot_index, x, y).await;
                }
            }
        }

        ServerBoundMessage::ReleaseAllInput => {
            let _ = injector.inject(InputEvent::ReleaseAll);
        }

        ServerBoundMessage::KeyboardState { caps_lock, num_lock } => {
            let _ = injector.inject(InputEvent::KeyboardState { caps_lock, num_lock });
        }

        ServerBoundMessage::Dimensions { width, height, dpi, codec } => {
            pipeline.set_dimensions(media::traits::Dimensions { width, height, dpi });
            pipeline.set_codec(codec);
        }

        ServerBoundMessage::Mbps { max_mbps } => {
            pipeline.set_max_mbps(max_mbps);
        }

        ServerBoundMessage::IFrameRequest { force: _ } => {
            pipeline.request_iframe();
        }

        ServerBoundMessage::NackVideo { id, index } => {
            replay_nack(video_cache, udp_ctx, reply_addr, id, index).await;
        }

        ServerBoundMessage::NackAudio { id, index } => {
            replay_nack(audio_cache, udp_ctx, reply_addr, id, index).await;
        }

        ServerBoundMessage::Clipboard { data } => {
            debug!(bytes = data.len(), "clipboard payload received");
        }

        ServerBoundMessage::InteractionMode { mode } => {
            manager.set_interaction_mode(slot_index, mode).await;
        }

        ServerBoundMessage::Quit => {
            manager.set_quitting(slot_index).await;
            manager.evict(slot_index, false).await;
        }

        ServerBoundMessage::DiscoveryRequest { .. } => {
            debug!("discovery request received on an already-admitted channel, ignoring");
        }
    }

    None
}

async fn replay_nack(cache: &Mutex<SendCache>, udp_ctx: &UdpContext, addr: SocketAddr, id: i32, index: i16) {
    let packet = cache.lock().unwrap().get(id, index).cloned();
    let Some(packet) = packet else {
        debug!(id, index, "nack for fragment no longer cached");
        return;
    };
    let mut replay = packet;
    replay.is_nack = true;
    if let Err(e) = udp_ctx.send_packet(addr, &replay).await {
        debug!(id, index, error = %e, "nack replay send failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media::traits::LoggingInjector;
    use protocol::VideoCodec;

    fn manager_with_one_client() -> (SessionManager, usize) {
        (SessionManager::new(2, 32262, 32264, 1), 0)
    }

    #[tokio::test]
    async fn ping_updates_liveness_and_replies_pong() {
        let (manager, _) = manager_with_one_client();
        let admission = manager.admit("alice".into()).await.unwrap();
        manager.activate(admission.slot_index).await;

        let (pipeline, _rx) = PipelineHandle::new(
            media::traits::Dimensions { width: 1280, height: 720, dpi: 96 },
            VideoCodec::H264,
            10.0,
        );
        let mut injector = LoggingInjector::default();
        let video_cache = Mutex::new(SendCache::video());
        let audio_cache = Mutex::new(SendCache::audio());
        let udp_ctx = UdpContext::bind("127.0.0.1:0".parse().unwrap(), [1u8; 16]).unwrap();

        let reply = handle(
            &manager,
            admission.slot_index,
            ServerBoundMessage::Ping { id: 42 },
            &mut injector,
            &pipeline,
            &video_cache,
            &audio_cache,
            &udp_ctx,
            "127.0.0.1:9".parse().unwrap(),
        )
        .await;

        assert_eq!(reply, Some(ClientBoundMessage::Pong { id: 42 }));
    }

    #[tokio::test]
    async fn keyboard_ignored_when_not_controlling() {
        let (manager, _) = manager_with_one_client();
        let admission = manager.admit("alice".into()).await.unwrap();
        // Not activated, so is_controlling() is false.

        let (pipeline, _rx) = PipelineHandle::new(
            media::traits::Dimensions { width: 1280, height: 720, dpi: 96 },
            VideoCodec::H264,
            10.0,
        );
        let mut injector = LoggingInjector::default();
        let video_cache = Mutex::new(SendCache::video());
        let audio_cache = Mutex::new(SendCache::audio());
        let udp_ctx = UdpContext::bind("127.0.0.1:0".parse().unwrap(), [1u8; 16]).unwrap();

        handle(
            &manager,
            admission.slot_index,
            ServerBoundMessage::Keyboard { code: 65, pressed: true },
            &mut injector,
            &pipeline,
            &video_cache,
            &audio_cache,
            &udp_ctx,
            "127.0.0.1:9".parse().unwrap(),
        )
        .await;

        assert_eq!(injector.events_injected, 0);
    }

    #[tokio::test]
    async fn dimensions_message_updates_pipeline_handle() {
        let (manager, _) = manager_with_one_client();
        let admission = manager.admit("alice".into()).await.unwrap();
        manager.activate(admission.slot_index).await;

        let (pipeline, mut rx) = PipelineHandle::new(
            media::traits::Dimensions { width: 1280, height: 720, dpi: 96 },
            VideoCodec::H264,
            10.0,
        );
        let mut injector = LoggingInjector::default();
        let video_cache = Mutex::new(SendCache::video());
        let audio_cache = Mutex::new(SendCache::audio());
        let udp_ctx = UdpContext::bind("127.0.0.1:0".parse().unwrap(), [1u8; 16]).unwrap();

        handle(
            &manager,
            admission.slot_index,
            ServerBoundMessage::Dimensions { width: 1920, height: 1080, dpi: 120, codec: VideoCodec::H265 },
            &mut injector,
            &pipeline,
            &video_cache,
            &audio_cache,
            &udp_ctx,
            "127.0.0.1:9".parse().unwrap(),
        )
        .await;

        assert!(rx.has_changed().unwrap());
        let dims = *rx.borrow_and_update();
        assert_eq!(dims.width, 1920);
        assert_eq!(*pipeline.codec.lock().unwrap(), VideoCodec::H265);
    }
}
