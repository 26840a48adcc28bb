//! Session/Client Manager (§4.9): slot allocation, discovery admission,
//! liveness reaping, and the container-exit policy.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use protocol::message::ClientBoundMessage;
use transport::SharedUdpContext;

use crate::error::ServerError;
use crate::slot::{ClientSlot, InteractionMode};

/// Ports and connection id handed back in a `DiscoveryReply`.
pub struct AdmissionInfo {
    pub slot_index: usize,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub connection_id: u32,
}

/// Guards the fixed client-slot array with a single reader-writer lock:
/// per-client I/O loops take a read lock for lookups and a write lock only
/// for the structural/control-flag mutations the spec splits across a
/// separate `state_lock` — merging the two is a simplification recorded in
/// DESIGN.md, since tokio's async `RwLock` makes a second mutex redundant
/// here (both are awaited the same way).
pub struct SessionManager {
    slots: RwLock<Vec<ClientSlot>>,
    host_id: RwLock<Option<usize>>,
    next_connection_id: AtomicU32,
    started_at: Instant,
    last_nongraceful_exit: Mutex<Option<Instant>>,
    ever_connected: Mutex<bool>,
    base_udp_port: u16,
    base_tcp_port: u16,
}

impl SessionManager {
    pub fn new(capacity: usize, base_udp_port: u16, base_tcp_port: u16, initial_connection_id: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, ClientSlot::default);
        SessionManager {
            slots: RwLock::new(slots),
            host_id: RwLock::new(None),
            next_connection_id: AtomicU32::new(initial_connection_id),
            started_at: Instant::now(),
            last_nongraceful_exit: Mutex::new(None),
            ever_connected: Mutex::new(false),
            base_udp_port,
            base_tcp_port,
        }
    }

    fn next_connection_id(&self) -> u32 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Admit a discovery request: reuse a returning username's slot, else
    /// the lowest free index (§4.9 step 2).
    pub async fn admit(&self, username: String) -> Result<AdmissionInfo, ServerError> {
        let mut slots = self.slots.write().await;

        let reuse_index = slots.iter().position(|s| s.is_active && s.username == username);
        let index = reuse_index.or_else(|| slots.iter().position(|s| !s.is_active));

        let Some(index) = index else {
            return Err(ServerError::SlotsFull);
        };

        if let Some(reused) = reuse_index {
            warn!(slot = reused, %username, "evicting stale slot for returning username");
        }

        let connection_id = self.next_connection_id();
        let udp_port = self.base_udp_port + index as u16;
        let tcp_port = self.base_tcp_port + index as u16;
        slots[index].reset_for_admission(username, udp_port, tcp_port, connection_id);

        *self.ever_connected.lock().unwrap() = true;

        Ok(AdmissionInfo { slot_index: index, udp_port, tcp_port, connection_id })
    }

    pub async fn attach_udp(&self, index: usize, ctx: SharedUdpContext, addr: SocketAddr) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(index) {
            slot.udp_ctx = Some(ctx);
            slot.udp_addr = Some(addr);
        }
    }

    pub async fn attach_tcp(&self, index: usize, tx: mpsc::Sender<ClientBoundMessage>) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(index) {
            slot.tcp_tx = Some(tx);
        }
    }

    /// Complete admission once both contexts' private-key handshakes have
    /// succeeded (§4.9 step 6): activate the slot, assign host if none yet
    /// exists, and mark it controlling (all clients are controllers under
    /// the current policy).
    pub async fn activate(&self, index: usize) {
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get_mut(index) else { return };
        slot.is_active = true;
        slot.interaction_mode = InteractionMode::Control;
        slot.last_ping = Some(Instant::now());
        drop(slots);

        let mut host = self.host_id.write().await;
        if host.is_none() {
            *host = Some(index);
            let mut slots = self.slots.write().await;
            if let Some(slot) = slots.get_mut(index) {
                slot.is_host = true;
            }
        }
    }

    pub async fn record_ping(&self, index: usize) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(index) {
            slot.last_ping = Some(Instant::now());
        }
    }

    /// Transition `index` among Spectate/Control/ExclusiveControl (§4.6);
    /// taking ExclusiveControl demotes every other controlling client.
    pub async fn set_interaction_mode(&self, index: usize, mode: InteractionMode) {
        let mut slots = self.slots.write().await;
        if index >= slots.len() {
            return;
        }
        if mode == InteractionMode::ExclusiveControl {
            for (i, slot) in slots.iter_mut().enumerate() {
                if i != index && slot.is_controlling() {
                    slot.interaction_mode = InteractionMode::Spectate;
                }
            }
        }
        slots[index].interaction_mode = mode;
    }

    /// Record a controlling client's latest pointer position (§3 Client
    /// slot "mouse state"), read back by the session manager's own
    /// diagnostics; no cursor-broadcast wire feature reads this today.
    pub async fn update_mouse(&self, index: usize, x: i32, y: i32) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(index) {
            slot.mouse.x = x;
            slot.mouse.y = y;
            slot.mouse.active = true;
        }
    }

    pub async fn set_quitting(&self, index: usize) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(index) {
            slot.quitting = true;
        }
    }

    /// Evict a slot (quit, ping-timeout, or handshake failure). `nongraceful`
    /// starts the grace period the container-exit policy honors.
    pub async fn evict(&self, index: usize, nongraceful: bool) {
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get_mut(index) else { return };
        if !slot.is_active {
            return;
        }
        let was_host = slot.is_host;
        *slot = ClientSlot::default();
        drop(slots);

        if was_host {
            *self.host_id.write().await = None;
        }
        if nongraceful {
            *self.last_nongraceful_exit.lock().unwrap() = Some(Instant::now());
            warn!(slot = index, "client reaped nongracefully; starting exit grace period");
        }
    }

    /// Scan for slots whose last ping is older than `ping_timeout` and
    /// reap them (§4.9 liveness, run every 20s by the caller).
    pub async fn reap_expired(&self, ping_timeout: Duration) -> Vec<usize> {
        let now = Instant::now();
        let expired: Vec<usize> = {
            let slots = self.slots.read().await;
            slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_active)
                .filter(|(_, s)| s.last_ping.map(|t| now.duration_since(t) > ping_timeout).unwrap_or(false))
                .map(|(i, _)| i)
                .collect()
        };
        for &index in &expired {
            self.evict(index, true).await;
        }
        expired
    }

    /// Container-exit policy (§4.9): exit if no client has ever connected
    /// within the startup grace, or if every client has disconnected and
    /// any nongraceful grace period has lapsed.
    pub async fn should_exit(&self, startup_grace: Duration, nongraceful_grace: Duration) -> bool {
        let ever_connected = *self.ever_connected.lock().unwrap();
        if !ever_connected {
            return self.started_at.elapsed() >= startup_grace;
        }

        let any_active = self.slots.read().await.iter().any(|s| s.is_active);
        if any_active {
            return false;
        }

        match *self.last_nongraceful_exit.lock().unwrap() {
            Some(last) => last.elapsed() >= nongraceful_grace,
            None => true,
        }
    }

    pub async fn active_count(&self) -> usize {
        self.slots.read().await.iter().filter(|s| s.is_active).count()
    }

    /// Broadcast a UDP `Packet` to every active client's address, used by
    /// the video/audio pipelines to fan the same encoded frame out (§4.9
    /// `broadcast_udp_packet`).
    pub async fn broadcast_targets(&self) -> Vec<(SharedUdpContext, SocketAddr)> {
        self.slots
            .read()
            .await
            .iter()
            .filter(|s| s.is_active && !s.quitting)
            .filter_map(|s| Some((s.udp_ctx.clone()?, s.udp_addr?)))
            .collect()
    }

    pub async fn tcp_sender(&self, index: usize) -> Option<mpsc::Sender<ClientBoundMessage>> {
        self.slots.read().await.get(index).and_then(|s| s.tcp_tx.clone())
    }

    pub async fn is_controlling(&self, index: usize) -> bool {
        self.slots.read().await.get(index).map(|s| s.is_controlling()).unwrap_or(false)
    }

    pub async fn username(&self, index: usize) -> Option<String> {
        self.slots.read().await.get(index).map(|s| s.username.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(2, 32262, 32264, 1)
    }

    #[tokio::test]
    async fn admit_allocates_lowest_free_slot() {
        let mgr = manager();
        let a = mgr.admit("alice".into()).await.unwrap();
        assert_eq!(a.slot_index, 0);
        assert_eq!(a.udp_port, 32262);
        let b = mgr.admit("bob".into()).await.unwrap();
        assert_eq!(b.slot_index, 1);
    }

    #[tokio::test]
    async fn admit_rejects_when_full() {
        let mgr = manager();
        mgr.admit("a".into()).await.unwrap();
        mgr.admit("b".into()).await.unwrap();
        assert!(matches!(mgr.admit("c".into()).await, Err(ServerError::SlotsFull)));
    }

    #[tokio::test]
    async fn first_activated_client_becomes_host() {
        let mgr = manager();
        let a = mgr.admit("alice".into()).await.unwrap();
        mgr.activate(a.slot_index).await;
        assert_eq!(*mgr.host_id.read().await, Some(0));
        assert!(mgr.is_controlling(0).await);
    }

    #[tokio::test]
    async fn evicting_host_clears_host_id() {
        let mgr = manager();
        let a = mgr.admit("alice".into()).await.unwrap();
        mgr.activate(a.slot_index).await;
        mgr.evict(0, false).await;
        assert_eq!(*mgr.host_id.read().await, None);
        assert_eq!(mgr.active_count().await, 0);
    }

    #[tokio::test]
    async fn reap_expired_evicts_stale_pings() {
        let mgr = manager();
        let a = mgr.admit("alice".into()).await.unwrap();
        mgr.activate(a.slot_index).await;
        {
            let mut slots = mgr.slots.write().await;
            slots[0].last_ping = Some(Instant::now() - Duration::from_secs(10));
        }
        let reaped = mgr.reap_expired(Duration::from_secs(3)).await;
        assert_eq!(reaped, vec![0]);
        assert_eq!(mgr.active_count().await, 0);
    }

    #[tokio::test]
    async fn should_exit_before_startup_grace_false_and_after_true() {
        let mgr = manager();
        assert!(!mgr.should_exit(Duration::from_secs(60), Duration::from_secs(600)).await);
        assert!(mgr.should_exit(Duration::from_millis(0), Duration::from_secs(600)).await);
    }

    #[tokio::test]
    async fn should_exit_false_while_client_active() {
        let mgr = manager();
        let a = mgr.admit("alice".into()).await.unwrap();
        mgr.activate(a.slot_index).await;
        assert!(!mgr.should_exit(Duration::from_millis(0), Duration::from_secs(600)).await);
    }

    #[tokio::test]
    async fn should_exit_respects_nongraceful_grace() {
        let mgr = manager();
        let a = mgr.admit("alice".into()).await.unwrap();
        mgr.activate(a.slot_index).await;
        mgr.evict(0, true).await;
        assert!(!mgr.should_exit(Duration::from_millis(0), Duration::from_secs(600)).await);
        assert!(mgr.should_exit(Duration::from_millis(0), Duration::from_millis(0)).await);
    }

    #[tokio::test]
    async fn exclusive_control_demotes_others() {
        let mgr = manager();
        let a = mgr.admit("alice".into()).await.unwrap();
        let b = mgr.admit("bob".into()).await.unwrap();
        mgr.activate(a.slot_index).await;
        mgr.activate(b.slot_index).await;
        mgr.set_interaction_mode(1, InteractionMode::ExclusiveControl).await;
        assert!(!mgr.is_controlling(0).await);
        assert!(mgr.is_controlling(1).await);
    }
}
