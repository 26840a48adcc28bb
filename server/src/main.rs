//! Server entry point (§6): parses CLI flags over the TOML config,
//! bootstraps the session manager, and drives the discovery accept loop,
//! per-client control loops, the two media pipelines, the liveness
//! scanner, and the container-exit policy as independent tasks.

mod config;
mod control;
mod error;
mod handshake;
mod manager;
mod pipeline;
mod slot;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use clap::Parser;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use media::traits::{Dimensions, LoggingInjector};
use protocol::message::{ClientBoundMessage, ServerBoundMessage};
use transport::UdpContext;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::manager::SessionManager;
use crate::pipeline::PipelineHandle;

/// Low-latency interactive remote-desktop server.
#[derive(Parser, Debug)]
#[command(name = "server", version)]
struct Args {
    /// Path to a TOML config file; CLI flags below override its values.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// 32-character hex shared secret clients must present at handshake.
    #[arg(long = "private-key")]
    private_key: Option<String>,

    /// Opaque hex identifier reported alongside connection status.
    #[arg(long)]
    identifier: Option<String>,

    /// Webserver URL the server would report status to (opaque, unused).
    #[arg(long)]
    webserver: Option<String>,

    /// Interface address to bind on.
    #[arg(long)]
    host: Option<String>,

    /// Fixed client-slot capacity.
    #[arg(long)]
    capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let mut config: ServerConfig = match &args.config {
        Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
        None => ServerConfig::default(),
    };
    if let Some(key) = args.private_key {
        config.private_key_hex = key;
    }
    if let Some(id) = args.identifier {
        config.identifier_hex = id;
    }
    if let Some(url) = args.webserver {
        config.webserver_url = url;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(capacity) = args.capacity {
        config.slot_capacity = capacity;
    }

    let key = *config.private_key()?;
    let connection_id = config::load_connection_id();
    info!(host = %config.host, discovery_port = config.discovery_port, "starting server");

    let manager = Arc::new(SessionManager::new(
        config.slot_capacity,
        config.base_udp_port,
        config.base_tcp_port,
        connection_id,
    ));

    let (pipeline, dims_rx) = PipelineHandle::new(
        Dimensions { width: 1280, height: 720, dpi: 96 },
        pipeline::default_codec(),
        16.0,
    );
    let video_cache = Arc::new(std::sync::Mutex::new(protocol::fragment::SendCache::video()));
    let audio_cache = Arc::new(std::sync::Mutex::new(protocol::fragment::SendCache::audio()));

    tokio::spawn(pipeline::run_video_pipeline(manager.clone(), pipeline.clone(), dims_rx, video_cache.clone()));
    tokio::spawn(pipeline::run_audio_pipeline(manager.clone(), 64_000, audio_cache.clone()));
    tokio::spawn(liveness_loop(manager.clone(), Duration::from_secs(config.ping_timeout_secs)));
    tokio::spawn(exit_policy_loop(
        manager.clone(),
        Duration::from_secs(config.startup_grace_secs),
        Duration::from_secs(config.nongraceful_grace_minutes * 60),
    ));

    let discovery_addr: SocketAddr = format!("{}:{}", config.host, config.discovery_port).parse()?;
    let listener = TcpListener::bind(discovery_addr)
        .await
        .map_err(|_| ServerError::PortInUse(config.discovery_port))?;
    info!(%discovery_addr, "listening for discovery connections");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "discovery accept failed");
                        continue;
                    }
                };
                let manager = manager.clone();
                let pipeline = pipeline.clone();
                let video_cache = video_cache.clone();
                let audio_cache = audio_cache.clone();
                let host = config.host.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_discovery(stream, peer, manager, pipeline, video_cache, audio_cache, host, key).await {
                        warn!(%peer, error = %e, "discovery session failed");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("ctrl-c received, shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn liveness_loop(manager: Arc<SessionManager>, ping_timeout: Duration) {
    let mut interval = tokio::time::interval(Duration::from_secs(20));
    loop {
        interval.tick().await;
        let reaped = manager.reap_expired(ping_timeout).await;
        if !reaped.is_empty() {
            info!(?reaped, "liveness scan reaped stale slots");
        }
    }
}

async fn exit_policy_loop(manager: Arc<SessionManager>, startup_grace: Duration, nongraceful_grace: Duration) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        if manager.should_exit(startup_grace, nongraceful_grace).await {
            info!("container-exit policy satisfied, exiting");
            std::process::exit(0);
        }
    }
}

/// Handle one discovery connection end to end: admit, reply, hand off to
/// the per-client UDP handshake and TCP control loop (§4.9 steps 2-6). The
/// discovery TCP stream is reused as the client's ongoing control-message
/// channel rather than opening a second TCP port, a simplification over
/// the spec's separate discovery/control ports recorded in DESIGN.md.
#[allow(clippy::too_many_arguments)]
async fn handle_discovery(
    mut stream: TcpStream,
    peer: SocketAddr,
    manager: Arc<SessionManager>,
    pipeline: Arc<PipelineHandle>,
    video_cache: Arc<std::sync::Mutex<protocol::fragment::SendCache>>,
    audio_cache: Arc<std::sync::Mutex<protocol::fragment::SendCache>>,
    host: String,
    key: [u8; crypto::KEY_LEN],
) -> anyhow::Result<()> {
    let mut buf = BytesMut::new();
    let Some(payload) = transport::tcp::read_frame(&mut stream, &mut buf).await? else {
        return Ok(());
    };
    let ServerBoundMessage::DiscoveryRequest { user_email, .. } = ServerBoundMessage::decode(&payload)? else {
        warn!(%peer, "first message on discovery connection was not DiscoveryRequest");
        return Ok(());
    };

    let admission = match manager.admit(user_email).await {
        Ok(a) => a,
        Err(e) => {
            transport::tcp::write_frame(&mut stream, &ClientBoundMessage::Quit.encode()?).await?;
            return Err(e.into());
        }
    };
    if let Err(e) = config::save_connection_id(admission.connection_id) {
        warn!(error = %e, "failed to persist connection id");
    }

    transport::tcp::write_frame(
        &mut stream,
        &ClientBoundMessage::DiscoveryReply {
            udp_port: admission.udp_port,
            tcp_port: admission.tcp_port,
            connection_id: admission.connection_id,
        }
        .encode()?,
    )
    .await?;

    let udp_addr: SocketAddr = format!("{host}:{}", admission.udp_port).parse()?;
    let ctx = Arc::new(UdpContext::bind(udp_addr, key)?);
    match handshake::run(&ctx, admission.slot_index, &key, Duration::from_secs(10)).await {
        Ok(client_addr) => {
            manager.attach_udp(admission.slot_index, ctx.clone(), client_addr).await;
        }
        Err(e) => {
            manager.evict(admission.slot_index, true).await;
            return Err(e.into());
        }
    }

    let (tx, mut rx) = mpsc::channel::<ClientBoundMessage>(64);
    manager.attach_tcp(admission.slot_index, tx.clone()).await;
    manager.activate(admission.slot_index).await;
    info!(slot = admission.slot_index, %peer, "client activated");

    pipeline.request_iframe();

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

    let mut injector = LoggingInjector::default();
    let client_addr = ctx.peer().unwrap_or(peer);
    loop {
        let payload = match transport::tcp::read_frame(&mut read_half, &mut buf).await {
            Ok(Some(p)) => p,
            Ok(None) => break,
            Err(e) => {
                warn!(slot = admission.slot_index, error = %e, "control read failed");
                break;
            }
        };
        let msg = match ServerBoundMessage::decode(&payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(slot = admission.slot_index, error = %e, "malformed control message, dropping");
                continue;
            }
        };
        let quit = matches!(msg, ServerBoundMessage::Quit);
        let reply = control::handle(
            &manager,
            admission.slot_index,
            msg,
            &mut injector,
            &pipeline,
            &video_cache,
            &audio_cache,
            &ctx,
            client_addr,
        )
        .await;
        if let Some(reply) = reply {
            let _ = tx.send(reply).await;
        }
        if quit {
            break;
        }
    }

    writer_task.abort();
    manager.evict(admission.slot_index, false).await;
    info!(slot = admission.slot_index, "client session ended");
    Ok(())
}
