mod config;
mod server;
mod simulation;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use config::ServerConfig;
use server::GameServer;

#[derive(Parser)]
#[command(name = "tidewire-server")]
#[command(about = "Authoritative tidewire server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = tidewire::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long)]
    tick_rate: Option<u32>,

    #[arg(short, long)]
    max_clients: Option<usize>,

    #[arg(long, help = "TOML file with network tunables")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 8, help = "Drifting props to spawn")]
    props: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let mut config = ServerConfig::load(bind_addr, args.config.as_deref())?;
    if let Some(tick_rate) = args.tick_rate {
        config.net.tick_rate = tick_rate;
    }
    if let Some(max_clients) = args.max_clients {
        config.net.max_clients = max_clients;
    }
    config.props = args.props;
    config.net.validate()?;

    let mut server = GameServer::new(config)?;
    log::info!("Server started on {}", server.local_addr());
    server.run();
    log::info!("Server shutting down");

    Ok(())
}
