//! UDP socket context (§4.2): fragment-sized send/receive over an encrypted
//! channel, with the retry policy the original applies when the kernel send
//! buffer is momentarily full.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{trace, warn};

use crypto::cipher::{self, EncryptedPacket, KEY_LEN};
use protocol::packet::{Packet, MAX_PACKET_SIZE};

use crate::error::TransportError;

/// Enlarged receive buffer, matching the original's UDP socket options.
pub const RECV_BUFFER_SIZE: usize = 65_535;

/// Retry policy when the socket reports it would block / its buffer is
/// full: sleep 5ms between attempts, give up after 5 tries.
const SEND_RETRY_ATTEMPTS: u32 = 5;
const SEND_RETRY_DELAY: Duration = Duration::from_millis(5);

/// A bound UDP endpoint plus the shared secret used to encrypt/decrypt
/// everything sent or received on it. A single send-side mutex keeps
/// concurrent senders (video/audio/control) from interleaving datagrams.
pub struct UdpContext {
    socket: UdpSocket,
    key: [u8; KEY_LEN],
    send_lock: AsyncMutex<()>,
    peer: std::sync::RwLock<Option<SocketAddr>>,
}

impl UdpContext {
    pub fn bind(local_addr: SocketAddr, key: [u8; KEY_LEN]) -> Result<Self, TransportError> {
        let domain = if local_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let sock = Socket::new(domain, Type::DGRAM, None)?;
        sock.set_nonblocking(true)?;
        sock.set_recv_buffer_size(RECV_BUFFER_SIZE)?;
        sock.set_send_buffer_size(RECV_BUFFER_SIZE)?;
        sock.bind(&local_addr.into())?;
        let std_socket: std::net::UdpSocket = sock.into();
        let socket = UdpSocket::from_std(std_socket)?;
        Ok(UdpContext {
            socket,
            key,
            send_lock: AsyncMutex::new(()),
            peer: std::sync::RwLock::new(None),
        })
    }

    pub fn set_peer(&self, addr: SocketAddr) {
        *self.peer.write().unwrap() = Some(addr);
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.read().unwrap()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one empty datagram, used both as a NAT pinhole opener and as a
    /// liveness ack.
    pub async fn ack(&self, addr: SocketAddr) -> Result<(), TransportError> {
        self.send_raw(addr, &[]).await
    }

    pub async fn send_packet(&self, addr: SocketAddr, packet: &Packet) -> Result<(), TransportError> {
        let plaintext = packet.to_plaintext_bytes()?;
        let encrypted = cipher::encrypt(&self.key, &plaintext);
        self.send_raw(addr, &encrypted.to_wire_bytes()).await
    }

    async fn send_raw(&self, addr: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
        let _guard = self.send_lock.lock().await;
        let mut attempts = 0;
        loop {
            match self.socket.send_to(bytes, addr).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    attempts += 1;
                    if attempts >= SEND_RETRY_ATTEMPTS {
                        return Err(TransportError::PeerNoBuf { attempts });
                    }
                    tokio::time::sleep(SEND_RETRY_DELAY).await;
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    /// Receive and decrypt one datagram. Empty datagrams (pinhole opens,
    /// acks) decode to `Ok(None)`.
    pub async fn read_packet(&self) -> Result<(SocketAddr, Option<Packet>), TransportError> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE.max(cipher::MAX_CIPHERTEXT_LEN.min(65_536)) + 128];
        let (len, addr) = self.socket.recv_from(&mut buf).await?;
        if len == 0 {
            trace!(%addr, "received NAT pinhole/ack datagram");
            return Ok((addr, None));
        }
        let wire = EncryptedPacket::from_wire_bytes(&buf[..len]).map_err(TransportError::Crypto)?;
        let plaintext = match cipher::decrypt(&self.key, &wire) {
            Ok(p) => p,
            Err(e) => {
                warn!(%addr, error = %e, "dropping packet that failed integrity check");
                return Err(TransportError::Crypto(e));
            }
        };
        let packet = Packet::from_plaintext_bytes(&plaintext)?;
        Ok((addr, Some(packet)))
    }
}

pub type SharedUdpContext = Arc<UdpContext>;
