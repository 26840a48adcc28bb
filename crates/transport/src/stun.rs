//! Minimal STUN client (§4.2 `--connection-method STUN`).
//!
//! The original `tcp_stun.c` contacts a fixed STUN host to learn the
//! client's externally-visible UDP mapping before beginning the discovery
//! handshake, retrying a small fixed number of times when the host doesn't
//! answer — that retry policy (not specified in the distilled spec) is
//! supplemented here: 3 attempts, 200ms apart.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::TransportError;

pub const STUN_RETRY_ATTEMPTS: u32 = 3;
pub const STUN_RETRY_DELAY: Duration = Duration::from_millis(200);

/// A trivial binding request: the STUN host observes our source address and
/// echoes it back as `[u8;4] ip | u16 port]` in network byte order, the
/// same layout used for `port_mappings` elsewhere on the wire (§6).
const BINDING_REQUEST: &[u8] = b"STUN-BINDING-REQUEST";

pub async fn query_external_addr(
    socket: &UdpSocket,
    stun_host: SocketAddr,
) -> Result<SocketAddr, TransportError> {
    let mut attempts = 0;
    loop {
        socket.send_to(BINDING_REQUEST, stun_host).await?;
        let mut buf = [0u8; 6];
        let recv = tokio::time::timeout(STUN_RETRY_DELAY, socket.recv_from(&mut buf)).await;
        match recv {
            Ok(Ok((6, _))) => {
                let ip = std::net::Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
                let port = u16::from_be_bytes([buf[4], buf[5]]);
                return Ok(SocketAddr::from((ip, port)));
            }
            _ => {
                attempts += 1;
                if attempts >= STUN_RETRY_ATTEMPTS {
                    return Err(TransportError::StunUnreachable { attempts });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_stun_unreachable_after_retry_budget() {
        // Bind a "STUN host" socket that never replies.
        let dead_host = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead_host.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let result = query_external_addr(&client, dead_addr).await;
        assert!(matches!(
            result,
            Err(TransportError::StunUnreachable { attempts: STUN_RETRY_ATTEMPTS })
        ));
    }

    #[tokio::test]
    async fn learns_mapped_address_from_responding_host() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, from) = server.recv_from(&mut buf).await.unwrap();
            let ip = match from.ip() {
                std::net::IpAddr::V4(v4) => v4,
                _ => panic!("expected ipv4"),
            };
            let mut reply = Vec::with_capacity(6);
            reply.extend_from_slice(&ip.octets());
            reply.extend_from_slice(&from.port().to_be_bytes());
            server.send_to(&reply, from).await.unwrap();
        });

        let learned = query_external_addr(&client, server_addr).await.unwrap();
        assert_eq!(learned.port(), client_addr.port());
        responder.await.unwrap();
    }
}
