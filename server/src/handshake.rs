//! Drives the Private-Key Handshake (§4.3) over an already-bound
//! `UdpContext`: exchange challenges as `Message`-type packets (the
//! channel is already keyed with the shared secret, so a packet that
//! fails to decrypt never reaches here) and confirm each side proves
//! knowledge of the key before the slot is marked active.

use std::net::SocketAddr;
use std::time::Duration;

use crypto::handshake::{self, CHALLENGE_LEN, RESPONSE_LEN};
use protocol::{Packet, PacketType};
use transport::UdpContext;

use crate::error::ServerError;

/// Wait for the client's pinhole/challenge traffic, exchange challenges,
/// and verify the response. `key` is the same shared secret the
/// `UdpContext` was constructed with.
pub async fn run(
    ctx: &UdpContext,
    slot_index: usize,
    key: &[u8; crypto::KEY_LEN],
    timeout: Duration,
) -> Result<SocketAddr, ServerError> {
    tokio::time::timeout(timeout, handshake_inner(ctx, key))
        .await
        .map_err(|_| ServerError::HandshakeFailed(slot_index))?
}

async fn handshake_inner(ctx: &UdpContext, key: &[u8; crypto::KEY_LEN]) -> Result<SocketAddr, ServerError> {
    let peer_addr = loop {
        let (addr, packet) = ctx.read_packet().await?;
        if packet.is_some() {
            break addr;
        }
    };
    ctx.set_peer(peer_addr);
    ctx.ack(peer_addr).await?;

    let our_challenge = handshake::generate_challenge();
    send_message(ctx, peer_addr, our_challenge.to_vec()).await?;

    let peer_challenge = recv_message_of_len(ctx, CHALLENGE_LEN).await?;
    let mut peer_challenge_arr = [0u8; CHALLENGE_LEN];
    peer_challenge_arr.copy_from_slice(&peer_challenge);

    let mut response_payload = peer_challenge_arr.to_vec();
    response_payload.extend_from_slice(&handshake::respond(key, &peer_challenge_arr));
    send_message(ctx, peer_addr, response_payload).await?;

    let peer_response = recv_message_of_len(ctx, CHALLENGE_LEN + RESPONSE_LEN).await?;
    let (echoed, sig) = peer_response.split_at(CHALLENGE_LEN);
    if echoed != our_challenge {
        return Err(ServerError::HandshakeFailed(0));
    }
    let mut sig_arr = [0u8; RESPONSE_LEN];
    sig_arr.copy_from_slice(sig);
    handshake::verify(key, &our_challenge, &sig_arr)?;

    Ok(peer_addr)
}

async fn send_message(ctx: &UdpContext, addr: SocketAddr, data: Vec<u8>) -> Result<(), ServerError> {
    let packet = Packet { packet_type: PacketType::Message, id: 0, index: 0, num_indices: 1, is_nack: false, data };
    ctx.send_packet(addr, &packet).await?;
    Ok(())
}

async fn recv_message_of_len(ctx: &UdpContext, len: usize) -> Result<Vec<u8>, ServerError> {
    loop {
        let (_, packet) = ctx.read_packet().await?;
        if let Some(p) = packet {
            if p.data.len() == len {
                return Ok(p.data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn handshake_succeeds_with_shared_key() {
        let key = [7u8; crypto::KEY_LEN];
        let server = Arc::new(UdpContext::bind("127.0.0.1:0".parse().unwrap(), key).unwrap());
        let client = Arc::new(UdpContext::bind("127.0.0.1:0".parse().unwrap(), key).unwrap());
        let server_addr = server.local_addr().unwrap();
        let client_addr = client.local_addr().unwrap();
        client.set_peer(server_addr);

        let client_task = tokio::spawn({
            let client = client.clone();
            async move {
                client.ack(server_addr).await.unwrap();
                run(&client, 0, &key, Duration::from_secs(2)).await
            }
        });

        let server_result = run(&server, 0, &key, Duration::from_secs(2)).await;
        let client_result = client_task.await.unwrap();

        assert_eq!(server_result.unwrap(), client_addr);
        assert!(client_result.is_ok());
    }
}
