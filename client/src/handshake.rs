//! Client side of the Private-Key Handshake (§4.3): open the NAT pinhole
//! toward the server's advertised UDP endpoint, then exchange challenges.

use std::net::SocketAddr;
use std::time::Duration;

use crypto::handshake::{self, CHALLENGE_LEN, RESPONSE_LEN};
use protocol::{Packet, PacketType};
use transport::UdpContext;

use crate::error::ClientError;

pub async fn run(
    ctx: &UdpContext,
    server_addr: SocketAddr,
    key: &[u8; crypto::KEY_LEN],
    timeout: Duration,
) -> Result<(), ClientError> {
    tokio::time::timeout(timeout, handshake_inner(ctx, server_addr, key))
        .await
        .map_err(|_| ClientError::HandshakeFailed)?
}

async fn handshake_inner(ctx: &UdpContext, server_addr: SocketAddr, key: &[u8; crypto::KEY_LEN]) -> Result<(), ClientError> {
    ctx.set_peer(server_addr);
    ctx.ack(server_addr).await?;

    let our_challenge = handshake::generate_challenge();
    send_message(ctx, server_addr, our_challenge.to_vec()).await?;

    let peer_challenge = recv_message_of_len(ctx, CHALLENGE_LEN).await?;
    let mut peer_challenge_arr = [0u8; CHALLENGE_LEN];
    peer_challenge_arr.copy_from_slice(&peer_challenge);

    let mut response_payload = peer_challenge_arr.to_vec();
    response_payload.extend_from_slice(&handshake::respond(key, &peer_challenge_arr));
    send_message(ctx, server_addr, response_payload).await?;

    let peer_response = recv_message_of_len(ctx, CHALLENGE_LEN + RESPONSE_LEN).await?;
    let (echoed, sig) = peer_response.split_at(CHALLENGE_LEN);
    if echoed != our_challenge {
        return Err(ClientError::HandshakeFailed);
    }
    let mut sig_arr = [0u8; RESPONSE_LEN];
    sig_arr.copy_from_slice(sig);
    handshake::verify(key, &our_challenge, &sig_arr)?;

    Ok(())
}

async fn send_message(ctx: &UdpContext, addr: SocketAddr, data: Vec<u8>) -> Result<(), ClientError> {
    let packet = Packet { packet_type: PacketType::Message, id: 0, index: 0, num_indices: 1, is_nack: false, data };
    ctx.send_packet(addr, &packet).await?;
    Ok(())
}

async fn recv_message_of_len(ctx: &UdpContext, len: usize) -> Result<Vec<u8>, ClientError> {
    loop {
        let (_, packet) = ctx.read_packet().await?;
        if let Some(p) = packet {
            if p.data.len() == len {
                return Ok(p.data);
            }
        }
    }
}
