//! Client entry point (§6): connects to a server's discovery port,
//! completes the private-key handshake, then drives the control-message
//! loop and media pipeline until the server quits or the connection drops.

mod config;
mod control;
mod error;
mod handshake;
mod pipeline;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use clap::Parser;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use protocol::message::{ClientBoundMessage, ServerBoundMessage};
use transport::UdpContext;

use crate::config::Args;
use crate::error::ClientError;

const DISCOVERY_PORT: u16 = 32265;
const PING_INTERVAL: Duration = Duration::from_millis(500);

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "client exiting with error");
            -1
        }
    };
    std::process::exit(exit_code);
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let mut args = Args::parse();
    args.apply_spin_overrides();
    let key = *args.private_key()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_session(args, key))
}

async fn run_session(args: Args, key: [u8; crypto::KEY_LEN]) -> anyhow::Result<()> {
    let discovery_addr: SocketAddr = format!("{}:{DISCOVERY_PORT}", args.ip).parse()?;
    info!(%discovery_addr, "connecting to discovery port");
    let mut stream = TcpStream::connect(discovery_addr).await?;

    let request = ServerBoundMessage::DiscoveryRequest {
        connection_id: 0,
        user_email: args.user_email.clone().unwrap_or_default(),
    };
    transport::tcp::write_frame(&mut stream, &request.encode()?).await?;

    let mut buf = BytesMut::new();
    let payload = transport::tcp::read_frame(&mut stream, &mut buf)
        .await?
        .ok_or(ClientError::BadDiscoveryReply)?;
    let ClientBoundMessage::DiscoveryReply { udp_port, connection_id, .. } = ClientBoundMessage::decode(&payload)?
    else {
        return Err(ClientError::BadDiscoveryReply.into());
    };
    info!(udp_port, connection_id, "discovery accepted");

    let server_ip = discovery_addr.ip();
    let server_udp_addr = SocketAddr::new(server_ip, udp_port);
    let ctx = Arc::new(UdpContext::bind(SocketAddr::new("0.0.0.0".parse()?, 0), key)?);
    handshake::run(&ctx, server_udp_addr, &key, Duration::from_secs(10)).await?;
    info!("handshake complete, session active");

    let (tx, mut rx) = mpsc::channel::<ServerBoundMessage>(64);
    let dims_msg = ServerBoundMessage::Dimensions {
        width: args.width,
        height: args.height,
        dpi: 96,
        codec: args.codec.into(),
    };
    tx.send(dims_msg).await.ok();
    tx.send(ServerBoundMessage::Mbps { max_mbps: args.bitrate }).await.ok();

    let (mut read_half, mut write_half) = stream.into_split();

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(bytes) = msg.encode() {
                if transport::tcp::write_frame(&mut write_half, &bytes).await.is_err() {
                    break;
                }
            }
        }
    });

    let ping_tx = tx.clone();
    let ping_task = tokio::spawn(async move {
        let mut id = 0u32;
        let mut interval = tokio::time::interval(PING_INTERVAL);
        loop {
            interval.tick().await;
            id = id.wrapping_add(1);
            if ping_tx.send(ServerBoundMessage::Ping { id }).await.is_err() {
                break;
            }
        }
    });

    let pipeline_task = tokio::spawn(pipeline::run(ctx.clone(), tx.clone()));

    loop {
        let payload = match transport::tcp::read_frame(&mut read_half, &mut buf).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                info!("server closed the control connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "control read failed");
                break;
            }
        };
        let msg = match ClientBoundMessage::decode(&payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed control message from server, dropping");
                continue;
            }
        };
        let quit = matches!(msg, ClientBoundMessage::Quit);
        control::handle(msg);
        if quit {
            break;
        }
    }

    pipeline_task.abort();
    ping_task.abort();
    writer_task.abort();
    Ok(())
}
