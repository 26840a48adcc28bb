//! Control-Message Protocol, client side (§4.6): handles each
//! `ClientBoundMessage` arriving over the TCP control channel.

use tracing::{debug, info, warn};

use protocol::message::ClientBoundMessage;

pub fn handle(msg: ClientBoundMessage) {
    match msg {
        ClientBoundMessage::Pong { id } => {
            debug!(id, "pong received");
        }
        ClientBoundMessage::AudioFrequency { sample_rate } => {
            info!(sample_rate, "server reported audio sample rate");
        }
        ClientBoundMessage::Clipboard { data } => {
            debug!(bytes = data.len(), "clipboard payload received from server");
        }
        ClientBoundMessage::WindowTitle { title } => {
            info!(%title, "server set window title");
        }
        ClientBoundMessage::DiscoveryReply { .. } => {
            warn!("unexpected DiscoveryReply on the active control channel, ignoring");
        }
        ClientBoundMessage::Init { width, height, codec_type } => {
            info!(width, height, codec_type, "server sent init");
        }
        ClientBoundMessage::Quit => {
            info!("server requested quit");
        }
    }
}
