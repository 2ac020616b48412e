mod bot;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::time::{self, MissedTickBehavior};

use bot::Bot;
use tidewire::{
    Client, ClientEvent, Datagram, MAX_PACKET_SIZE, NetConfig, ReplicatedWorld, SimWorld,
};

#[derive(Parser)]
#[command(name = "tidewire-client")]
#[command(about = "Headless tidewire client driven by a scripted bot")]
struct Args {
    #[arg(short, long, help = "Server address to connect to (e.g., 127.0.0.1:27015)")]
    server: SocketAddr,

    #[arg(long, help = "TOML file with network tunables")]
    config: Option<PathBuf>,

    #[arg(long, help = "Disconnect after this many seconds")]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => NetConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => NetConfig::default(),
    };
    let tick = config.tick_duration();
    let tick_rate = config.tick_rate;

    let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
    info!("Bound {}, connecting to {}", socket.local_addr()?, args.server);

    let mut client = Client::new(config, args.server)?;
    let receiver = tokio::spawn(receive_loop(Arc::clone(&socket), client.inbox()));

    let mut world = SimWorld::new();
    let mut bot = Bot::new(tick_rate);
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = args
        .duration
        .map(|secs| time::Instant::now() + Duration::from_secs(secs));

    client.connect();
    flush(&socket, &client).await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
        if deadline.is_some_and(|deadline| time::Instant::now() >= deadline) {
            break;
        }

        client.update(tick, &mut world);
        let mut ended = false;
        for event in client.drain_events() {
            match event {
                ClientEvent::Connected => info!("Connected"),
                ClientEvent::Disconnected { clean } => {
                    info!("Disconnected (clean: {})", clean);
                    ended = true;
                }
                ClientEvent::SimulationPaused => warn!("Server went quiet, pausing"),
                ClientEvent::SimulationResumed => info!("Resynchronized"),
            }
        }
        if ended {
            break;
        }

        let inputs = if client.is_connected() && !client.is_simulation_paused() {
            world.step(tick.as_secs_f32());
            vec![bot.next_input(world.current_frame())]
        } else {
            Vec::new()
        };
        client.update2(&mut world, &inputs);
        flush(&socket, &client).await;

        for (_, event) in world.take_inbound_events() {
            debug!("Event: {}", event.name());
        }
    }

    client.disconnect();
    flush(&socket, &client).await;
    receiver.abort();

    let stats = client.stats();
    info!(
        "Sent {} packets, received {}, dropped {} ({:.1}% loss), rtt {:.1}ms",
        stats.packets_sent,
        stats.packets_received,
        stats.packets_dropped,
        stats.packet_loss_percent(),
        stats.rtt_ms
    );
    Ok(())
}

async fn receive_loop(socket: Arc<UdpSocket>, inbox: tidewire::net::PacketProducer<Datagram>) {
    let mut buffer = [0u8; MAX_PACKET_SIZE];
    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((size, addr)) => {
                inbox.put(Datagram::new(addr, buffer[..size].to_vec()));
            }
            Err(err) => debug!("Receive failed: {}", err),
        }
    }
}

async fn flush(socket: &UdpSocket, client: &Client) {
    for datagram in client.drain_outgoing() {
        if let Err(err) = socket.send_to(&datagram.bytes, datagram.addr).await {
            warn!("Send to {} failed: {}", datagram.addr, err);
        }
    }
}
