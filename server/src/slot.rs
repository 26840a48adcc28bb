use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc;

use protocol::message::ClientBoundMessage;
pub use protocol::InteractionMode;
use transport::SharedUdpContext;

/// A controlling client's last known pointer position (§3 Client slot
/// "mouse state"), mutated under the same lock as `is_controlling`/host
/// assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct MouseState {
    pub x: i32,
    pub y: i32,
    pub color: u32,
    pub active: bool,
}

/// Per-client slot state (§3). Allocated at discovery admission, populated
/// once the private-key handshake on both the UDP and TCP contexts
/// succeeds, mutated by the client's own receive loop and by the session
/// manager, destroyed on quit or ping-timeout.
#[derive(Default)]
pub struct ClientSlot {
    pub is_active: bool,
    pub is_host: bool,
    pub interaction_mode: InteractionMode,
    pub username: String,
    pub connection_id: u32,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub udp_ctx: Option<SharedUdpContext>,
    pub udp_addr: Option<SocketAddr>,
    pub tcp_tx: Option<mpsc::Sender<ClientBoundMessage>>,
    pub mouse: MouseState,
    pub last_ping: Option<Instant>,
    pub quitting: bool,
}

impl ClientSlot {
    pub fn is_controlling(&self) -> bool {
        self.interaction_mode.is_controlling()
    }

    /// Reset to the just-admitted state, keeping the ports/username that
    /// discovery assigned but clearing handshake/runtime state — used both
    /// for first admission and for evicting a stale slot on reconnect.
    pub fn reset_for_admission(&mut self, username: String, udp_port: u16, tcp_port: u16, connection_id: u32) {
        *self = ClientSlot {
            username,
            udp_port,
            tcp_port,
            connection_id,
            ..ClientSlot::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_slot_is_spectating_and_inactive() {
        let slot = ClientSlot::default();
        assert!(!slot.is_active);
        assert!(!slot.is_controlling());
        assert_eq!(slot.interaction_mode, InteractionMode::Spectate);
    }

    #[test]
    fn control_and_exclusive_control_count_as_controlling() {
        let mut slot = ClientSlot::default();
        slot.interaction_mode = InteractionMode::Control;
        assert!(slot.is_controlling());
        slot.interaction_mode = InteractionMode::ExclusiveControl;
        assert!(slot.is_controlling());
    }

    #[test]
    fn reset_for_admission_clears_stale_state() {
        let mut slot = ClientSlot::default();
        slot.is_active = true;
        slot.quitting = true;
        slot.mouse.x = 42;
        slot.reset_for_admission("alice".into(), 32262, 32264, 7);
        assert!(!slot.is_active);
        assert!(!slot.quitting);
        assert_eq!(slot.mouse.x, 0);
        assert_eq!(slot.username, "alice");
        assert_eq!(slot.connection_id, 7);
    }
}
