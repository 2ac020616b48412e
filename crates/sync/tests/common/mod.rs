#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tidewire::{
    Client, ClientEvent, LinkSimulator, NetConfig, Server, ServerEvent, SimWorld,
};

pub fn server_addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], 27015))
}

pub fn client_addr(index: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 1, 1], 50000 + index))
}

pub struct Peer {
    pub addr: SocketAddr,
    pub client: Client,
    pub world: SimWorld,
    pub events: Vec<ClientEvent>,
}

/// One server and any number of clients joined by an in-memory link, all
/// advanced in lockstep ticks.
pub struct Harness {
    pub link: LinkSimulator,
    pub server: Server,
    pub world: SimWorld,
    pub peers: Vec<Peer>,
    pub server_events: Vec<ServerEvent>,
    pub dt: Duration,
}

impl Harness {
    pub fn new(config: NetConfig, clients: u16) -> Self {
        let dt = config.tick_duration();
        let peers = (0..clients)
            .map(|index| Peer {
                addr: client_addr(index),
                client: Client::with_seed(config.clone(), server_addr(), 100 + index as u64)
                    .unwrap(),
                world: SimWorld::new(),
                events: Vec::new(),
            })
            .collect();
        Self {
            link: LinkSimulator::new(7),
            server: Server::with_seed(config, 42).unwrap(),
            world: SimWorld::new(),
            peers,
            server_events: Vec::new(),
            dt,
        }
    }

    pub fn connect_all(&mut self) {
        for peer in &mut self.peers {
            peer.client.connect();
            for datagram in peer.client.drain_outgoing() {
                self.link.send(peer.addr, datagram.addr, datagram.bytes);
            }
        }
        self.run(4);
        assert!(
            self.peers.iter().all(|peer| peer.client.is_connected()),
            "not every client connected"
        );
    }

    pub fn step(&mut self) {
        let server = server_addr();
        for datagram in self.link.deliver(server) {
            self.server.receive(datagram);
        }
        self.server.update(self.dt, &mut self.world);
        self.server_events.extend(self.server.drain_events());
        self.world.step(self.dt.as_secs_f32());
        self.server.update2(&mut self.world);
        for datagram in self.server.drain_outgoing() {
            self.link.send(server, datagram.addr, datagram.bytes);
        }

        for peer in &mut self.peers {
            for datagram in self.link.deliver(peer.addr) {
                peer.client.receive(datagram);
            }
            peer.client.update(self.dt, &mut peer.world);
            peer.events.extend(peer.client.drain_events());
            peer.client.update2(&mut peer.world, &[]);
            for datagram in peer.client.drain_outgoing() {
                self.link.send(peer.addr, datagram.addr, datagram.bytes);
            }
        }

        self.link.advance();
    }

    pub fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Runs until `done` holds or `limit` ticks pass. Returns the ticks used.
    pub fn run_until(&mut self, limit: usize, mut done: impl FnMut(&Harness) -> bool) -> Option<usize> {
        for tick in 0..limit {
            if done(self) {
                return Some(tick);
            }
            self.step();
        }
        done(self).then_some(limit)
    }
}
