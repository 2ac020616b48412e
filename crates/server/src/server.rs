use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use tidewire::{FixedTimestep, NetworkStats, Server, ServerEvent, SimWorld, UdpEndpoint};

use crate::config::ServerConfig;
use crate::simulation::Simulation;

/// Owns the socket thread, the protocol server and the toy world.
pub struct GameServer {
    server: Server,
    world: SimWorld,
    simulation: Simulation,
    timestep: FixedTimestep,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    io_thread: Option<JoinHandle<NetworkStats>>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let server = Server::new(config.net.clone())?;
        let endpoint = UdpEndpoint::bind(&config.bind_addr)?;
        let local_addr = endpoint.local_addr();
        let running = endpoint.running();

        let inbox = server.inbox();
        let outbox = server.outbox();
        let io_thread = thread::Builder::new()
            .name("tidewire-io".into())
            .spawn(move || {
                let mut endpoint = endpoint;
                let running = endpoint.running();
                while running.load(Ordering::SeqCst) {
                    if let Err(err) = endpoint.receive_into(&inbox) {
                        error!("Receive failed: {}", err);
                    }
                    for datagram in outbox.drain() {
                        if let Err(err) = endpoint.send(&datagram) {
                            warn!("Send to {} failed: {}", datagram.addr, err);
                        }
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                endpoint.stats().clone()
            })?;

        let mut world = SimWorld::new();
        let mut simulation = Simulation::new();
        simulation.populate(&mut world, config.props);

        Ok(Self {
            timestep: FixedTimestep::new(config.net.tick_rate),
            server,
            world,
            simulation,
            local_addr,
            running,
            io_thread: Some(io_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn run(&mut self) {
        let mut last = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            self.timestep.accumulate(now - last);
            last = now;

            while self.timestep.consume_tick() {
                self.tick();
            }
            thread::sleep(self.timestep.until_next());
        }
        self.shutdown();
    }

    fn tick(&mut self) {
        let dt = self.timestep.dt();

        self.server.update(dt, &mut self.world);
        self.handle_events();

        self.simulation.step(&mut self.world, dt.as_secs_f32());
        for (from, event) in self.world.take_inbound_events() {
            info!("Client {:?} sent {}", from, event.name());
        }

        self.server.update2(&mut self.world);
    }

    fn handle_events(&mut self) {
        let events: Vec<ServerEvent> = self.server.drain_events().collect();
        for event in events {
            match event {
                ServerEvent::ClientConnected {
                    client_id,
                    player_id,
                    ..
                } => {
                    self.simulation
                        .player_joined(&mut self.world, client_id, player_id);
                }
                ServerEvent::ClientDisconnected { client_id, reason } => {
                    self.simulation
                        .player_left(&mut self.world, client_id, reason);
                }
                ServerEvent::ConnectionRejected { .. } | ServerEvent::Reconnected { .. } => {}
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.server.shutdown();
        self.handle_events();
        // give the socket thread a moment to flush the disconnects
        thread::sleep(Duration::from_millis(50));
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.io_thread.take() {
            match handle.join() {
                Ok(stats) => info!(
                    "Socket totals: {} packets out, {} in, {} discarded",
                    stats.packets_sent, stats.packets_received, stats.packets_discarded
                ),
                Err(_) => error!("Socket thread panicked"),
            }
        }
    }
}
