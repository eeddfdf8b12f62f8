//! Framesync Demo Server
//!
//! Runs an authoritative server and two scripted predicting clients in one
//! process, linked by channels that add latency and jitter, then reports
//! prediction statistics and world hashes.
//!
//! Usage: `framesync-server [config.json] [seconds]`

use std::time::Duration;

use anyhow::Context;
use glam::Quat;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use framesync::{
    core::hash::short_hex,
    netcode::CommandFrameClock,
    network::{
        run_fixed_loop, ChannelSender, ClientNode, GameClient, GameServer, InboundHandle, InboundQueue, Message,
        ServerNode,
    },
    FrameInput, SimulationConfig, VERSION,
};

/// One-way link latency.
const LINK_BASE_MS: u64 = 30;
/// Extra random delay per message.
const LINK_JITTER_MS: u64 = 25;
/// Scripted clients.
const CLIENT_COUNT: u32 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SimulationConfig::load(&path).with_context(|| format!("loading config from {}", path))?,
        None => SimulationConfig::default(),
    };
    config.validate().context("invalid config")?;
    let seconds: u64 = match args.next() {
        Some(s) => s.parse().context("seconds must be an integer")?,
        None => 20,
    };

    info!("Framesync Server v{}", VERSION);
    info!(
        "Command frame: {} ms, input buffer: {} frames, state buffer: {} frames",
        config.command_frame_ms, config.input_buffer_size, config.state_buffer_size
    );

    let frames = seconds * 1000 / config.command_frame_ms;
    run_demo(config, frames).await
}

async fn run_demo(config: SimulationConfig, frames: u64) -> anyhow::Result<()> {
    info!("=== Starting Demo ({} frames) ===", frames);

    let server_in = InboundQueue::new(4096);
    let mut server = GameServer::new(config.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut client_tasks = Vec::new();
    for index in 0..CLIENT_COUNT {
        let client_in = InboundQueue::new(4096);
        let downlink = jittered_link(client_in.handle(), 0x9e37_79b9 + index as u64);
        let connection = server.connect(Box::new(downlink));
        let uplink = jittered_link(server_in.handle(), 0x85eb_ca6b + index as u64);

        let mut node = ClientNode {
            client: GameClient::new(connection, Box::new(uplink), config.clone()),
            inbound: client_in,
            input: Box::new(move |frame: u64| scripted_input(index, frame)),
            frame_limit: 0,
        };
        let clock = CommandFrameClock::from_config(&config);
        let rx = shutdown_rx.clone();
        client_tasks.push(tokio::spawn(async move {
            run_fixed_loop(&mut node, clock, rx).await;
            node
        }));
    }

    let mut server_node = ServerNode {
        server,
        inbound: server_in,
        frame_limit: frames,
    };
    let clock = CommandFrameClock::from_config(&config);
    let server_task = tokio::spawn(async move {
        run_fixed_loop(&mut server_node, clock, shutdown_rx).await;
        server_node
    });

    let server_node = server_task.await.context("server task panicked")?;
    shutdown_tx.send(true).context("clients already gone")?;

    info!("=== Results ===");
    let server = &server_node.server;
    info!(
        "Server: {} frames, {} players, world hash {}",
        server.global_frame(),
        server.player_count(),
        short_hex(&server.world_hash())
    );

    for task in client_tasks {
        let node = task.await.context("client task panicked")?;
        report_client(&node.client, server);
    }

    Ok(())
}

fn report_client(client: &GameClient, server: &GameServer) {
    let stats = client.stats();
    info!(
        "Client {}: {} frames, {} updates, {} hits, {} unmatched, {} mispredictions ({} frames replayed), rtt {:?} ms",
        client.sender_id(),
        stats.frames,
        stats.updates_received,
        stats.prediction_hits,
        stats.unmatched,
        stats.mispredictions,
        stats.replayed_frames,
        stats.rtt_ms
    );

    let Some(local) = client.local_player() else {
        warn!("Client {} never joined", client.sender_id());
        return;
    };
    if let (Ok(predicted), Ok(authoritative)) =
        (client.world().transform(local.entity), server.world().transform(local.entity))
    {
        info!(
            "Client {}: predicted {:?}, server {:?} (server trails by the input buffer)",
            client.sender_id(),
            predicted.position,
            authoritative.position
        );
    }
}

/// Scripted input: run in a slowly turning circle, with periodic jumps,
/// zips and shots.
fn scripted_input(index: u32, frame: u64) -> FrameInput {
    let turn = 0.004 * (index + 1) as f32;
    let camera = Quat::from_rotation_y(frame as f32 * turn);

    let mut input = FrameInput::with_flags(FrameInput::FLAG_FORWARD, camera);
    let phase = frame % 240;
    input.set(FrameInput::FLAG_RIGHT, index == 1 && phase < 60);
    input.set(FrameInput::FLAG_JUMP, phase == 100);
    input.set(FrameInput::FLAG_ZIP, (150..170).contains(&phase));
    input.set(FrameInput::FLAG_FIRE, phase == 200 + index as u64 * 10);
    input
}

/// A channel that delivers into `destination` after a base latency plus
/// deterministic jitter, never reordering.
fn jittered_link(destination: InboundHandle, seed: u64) -> ChannelSender {
    let (tx, mut rx) = mpsc::channel::<Message>(4096);
    let (stamped_tx, mut stamped_rx) = mpsc::unbounded_channel::<(tokio::time::Instant, Message)>();

    // Stamp on send so queueing behind a delayed message adds no latency
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if stamped_tx.send((tokio::time::Instant::now(), message)).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut state = seed.max(1);
        let mut deliver_at = tokio::time::Instant::now();

        while let Some((sent_at, message)) = stamped_rx.recv().await {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let delay = Duration::from_millis(LINK_BASE_MS + state % (LINK_JITTER_MS + 1));

            deliver_at = deliver_at.max(sent_at + delay);
            tokio::time::sleep_until(deliver_at).await;
            if destination.send(message).await.is_err() {
                break;
            }
        }
    });

    ChannelSender::new(tx)
}
