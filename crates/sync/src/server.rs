use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, trace, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{ConfigError, NetConfig};
use crate::connection::{ConnectError, ConnectionManager, ConnectionSlot, Effect, StateEvent};
use crate::event::GameEvent;
use crate::net::{
    Datagram, Frame, FrameFlags, Message, MessageConsumer, MessageProducer, NetworkStats,
    message_buffer,
};
use crate::sync::{MessageReader, ReplicatedWorld};

/// Events per outgoing event message.
pub const MAX_EVENTS_PER_MESSAGE: usize = 32;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    ClientConnected {
        client_id: u32,
        player_id: u16,
        addr: SocketAddr,
    },
    ClientDisconnected {
        client_id: u32,
        reason: DisconnectReason,
    },
    ConnectionRejected {
        addr: SocketAddr,
        reason: ConnectError,
    },
    Reconnected {
        client_id: u32,
        addr: SocketAddr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Kicked,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Kicked => "kicked",
        }
    }
}

/// Authoritative side of the protocol.
///
/// The host calls [`Server::update`] once per tick before running its game
/// systems and [`Server::update2`] once after, so outbound replication always
/// describes the frame that was just simulated. Datagrams come in through
/// [`Server::inbox`] and leave through [`Server::outbox`]; the socket itself
/// belongs to the host.
pub struct Server {
    config: NetConfig,
    manager: ConnectionManager,
    reader: MessageReader,
    rng: StdRng,
    inbox_tx: MessageProducer<Datagram>,
    inbox_rx: MessageConsumer<Datagram>,
    outbox_tx: MessageProducer<Datagram>,
    outbox_rx: MessageConsumer<Datagram>,
    kicked: HashSet<u32>,
    events: Vec<ServerEvent>,
    clock: Duration,
}

impl Server {
    pub fn new(config: NetConfig) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic challenge fragments, for tests and replays.
    pub fn with_seed(config: NetConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: NetConfig, rng: StdRng) -> Result<Self, ConfigError> {
        config.validate()?;
        // plain FIFO: skip-ahead is per peer, in each slot's own buffer
        let shared = config.packet_buffer_capacity * config.max_clients;
        let (inbox_tx, inbox_rx) = message_buffer(shared);
        let (outbox_tx, outbox_rx) =
            message_buffer(config.message_buffer_capacity * config.max_clients);
        Ok(Self {
            manager: ConnectionManager::new(&config),
            reader: MessageReader::new(config.byte_order),
            rng,
            inbox_tx,
            inbox_rx,
            outbox_tx,
            outbox_rx,
            kicked: HashSet::new(),
            events: Vec::new(),
            clock: Duration::ZERO,
            config,
        })
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Producer handle for the socket thread.
    pub fn inbox(&self) -> MessageProducer<Datagram> {
        self.inbox_tx.clone()
    }

    /// Consumer handle for the socket thread.
    pub fn outbox(&self) -> MessageConsumer<Datagram> {
        self.outbox_rx.clone()
    }

    pub fn receive(&self, datagram: Datagram) {
        if let Some(evicted) = self.inbox_tx.put(datagram) {
            trace!("Server inbox full, dropped datagram from {}", evicted.addr);
        }
    }

    pub fn drain_outgoing(&self) -> Vec<Datagram> {
        self.outbox_rx.drain()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.events.drain(..)
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn slot(&self, client_id: u32) -> Option<&ConnectionSlot> {
        self.manager.get(client_id)
    }

    pub fn connected_count(&self) -> usize {
        self.manager.connected_ids().len()
    }

    /// Transport counters summed over every live slot.
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();
        for client_id in self.manager.active_ids() {
            if let Some(slot) = self.manager.get(client_id) {
                stats.merge(slot.transport.stats());
            }
        }
        stats
    }

    /// Inbound half of a tick: routes datagrams to slots, drives each slot's
    /// state machine and timeouts, and applies received messages to `world`.
    pub fn update<W: ReplicatedWorld>(&mut self, dt: Duration, world: &mut W) {
        self.clock += dt;
        self.manager.advance(dt);
        self.route_inbound();

        for client_id in self.manager.active_ids() {
            self.service_slot(client_id, dt, world);
        }
    }

    /// Outbound half of a tick: a snapshot or update for every connected
    /// slot, followed by any pending events.
    pub fn update2<W: ReplicatedWorld>(&mut self, world: &mut W) {
        let outbound = world.poll_outbound_events();
        let now_ms = self.clock.as_millis() as u64;
        let frame = world.current_frame();

        let mut snapshot: Option<Message> = None;
        let mut update: Option<Message> = None;

        for client_id in self.manager.connected_ids() {
            let Some(slot) = self.manager.get_mut(client_id) else {
                continue;
            };
            for event in &outbound {
                slot.events.push(now_ms, *event);
            }
            slot.events.cleanup(now_ms);

            let message = if slot.snapshot_needed {
                if snapshot.is_none() {
                    snapshot = encode(self.reader.write_snapshot(world), "snapshot");
                }
                slot.snapshot_needed = false;
                snapshot.clone()
            } else {
                if update.is_none() {
                    update = encode(self.reader.write_update(world), "update");
                }
                update.clone()
            };
            if let Some(message) = message {
                send_data(slot, message, &self.config, &self.outbox_tx);
            }

            let (sequences, events) = slot.events.next_batch(MAX_EVENTS_PER_MESSAGE);
            if events.is_empty() {
                continue;
            }
            if let Some(message) = encode(self.reader.write_events(frame, &events), "events") {
                let message_id = message.id;
                if send_data(slot, message, &self.config, &self.outbox_tx) {
                    slot.events.mark_sent(&sequences, message_id);
                }
            }
        }
    }

    /// Closes a session from the server side.
    pub fn kick(&mut self, client_id: u32) {
        let Some(slot) = self.manager.get_mut(client_id) else {
            return;
        };
        if slot.addr.is_none() {
            return;
        }
        self.kicked.insert(client_id);
        let effects = slot.handle(StateEvent::Close, &mut self.rng);
        self.apply_effects(client_id, effects);
    }

    /// Queues an event for one client only.
    pub fn send_event(&mut self, client_id: u32, event: GameEvent) {
        let now_ms = self.clock.as_millis() as u64;
        if let Some(slot) = self.manager.get_mut(client_id) {
            if slot.state.is_connected() {
                slot.events.push(now_ms, event);
            }
        }
    }

    pub fn shutdown(&mut self) {
        for client_id in self.manager.active_ids() {
            self.kick(client_id);
        }
    }

    fn route_inbound(&mut self) {
        let order = self.config.byte_order;
        for datagram in self.inbox_rx.drain() {
            let frame = match Frame::decode(&datagram.bytes, order) {
                Ok(frame) => frame,
                Err(err) => {
                    debug!("Dropping datagram from {}: {}", datagram.addr, err);
                    continue;
                }
            };

            match self.manager.route(datagram.addr, &frame.header) {
                Ok(Some(client_id)) => {
                    if let Some(slot) = self.manager.get_mut(client_id) {
                        slot.transport.record_bytes_received(datagram.bytes.len());
                        if slot.enqueue(frame) {
                            trace!("Slot {} packet buffer overran", client_id);
                        }
                    }
                }
                Ok(None) => {
                    trace!(
                        "Ignoring {:?} from unknown address {}",
                        frame.header.packet_type, datagram.addr
                    );
                }
                Err(reason) => {
                    warn!("Rejected {}: {}", datagram.addr, reason);
                    self.events.push(ServerEvent::ConnectionRejected {
                        addr: datagram.addr,
                        reason,
                    });
                }
            }
        }
    }

    fn service_slot<W: ReplicatedWorld>(&mut self, client_id: u32, dt: Duration, world: &mut W) {
        let Some(slot) = self.manager.get_mut(client_id) else {
            return;
        };

        let mut effects = Vec::new();
        for frame in slot.drain_packets() {
            let event = StateEvent::Received {
                packet_type: frame.header.packet_type,
                salt: frame.header.salt,
            };
            let step_effects = slot.handle(event, &mut self.rng);
            if step_effects.contains(&Effect::AcceptData) && slot.accept(frame) {
                slot.snapshot_needed = true;
            }
            let released = step_effects.contains(&Effect::Release);
            effects.extend(step_effects);
            if released {
                break;
            }
        }
        if self.apply_effects(client_id, effects) {
            return;
        }

        let Some(slot) = self.manager.get_mut(client_id) else {
            return;
        };
        slot.process_acks();
        for message in slot.take_messages() {
            if let Err(err) = self.reader.read_message(&message, world, Some(client_id)) {
                debug!(
                    "Client {}: discarding message {}: {}",
                    client_id, message.id, err
                );
            }
        }
        let effects = slot.tick(dt, &self.config, &mut self.rng);
        self.apply_effects(client_id, effects);
    }

    /// Carries out the effects a slot handed back. Returns whether the slot
    /// was released.
    fn apply_effects(&mut self, client_id: u32, effects: Vec<Effect>) -> bool {
        let mut released = false;
        for effect in effects {
            let Some(slot) = self.manager.get_mut(client_id) else {
                return released;
            };
            let addr = slot.addr;
            match effect {
                Effect::Send { packet_type, salt } => {
                    let Some(addr) = addr else { continue };
                    match slot.control_frame(packet_type, salt, &self.config) {
                        Ok(bytes) => {
                            slot.transport.record_bytes_sent(bytes.len());
                            self.outbox_tx.put(Datagram::new(addr, bytes));
                        }
                        Err(err) => warn!("Failed to encode {:?}: {}", packet_type, err),
                    }
                }
                Effect::PeerConnected => {
                    let player_id = slot.player_id;
                    if let Some(addr) = addr {
                        info!("Client {} connected from {}", client_id, addr);
                        self.events.push(ServerEvent::ClientConnected {
                            client_id,
                            player_id,
                            addr,
                        });
                    }
                }
                Effect::PeerDisconnected { clean } => {
                    let reason = if self.kicked.remove(&client_id) {
                        DisconnectReason::Kicked
                    } else if clean {
                        DisconnectReason::Graceful
                    } else {
                        DisconnectReason::Timeout
                    };
                    info!("Client {} {}", client_id, reason.as_str());
                    self.events.push(ServerEvent::ClientDisconnected { client_id, reason });
                }
                Effect::Reconnected => {
                    if let Some(addr) = addr {
                        info!("Client {} reconnected from {}", client_id, addr);
                        self.events
                            .push(ServerEvent::Reconnected { client_id, addr });
                    }
                }
                Effect::Reject(reason) => {
                    if let Some(addr) = addr {
                        warn!("Rejected {}: {}", addr, reason);
                        self.events
                            .push(ServerEvent::ConnectionRejected { addr, reason });
                    }
                }
                Effect::Release => {
                    self.kicked.remove(&client_id);
                    self.manager.release(client_id);
                    released = true;
                }
                // applied by the slot itself, or client-only
                Effect::AdoptSalt(_)
                | Effect::AcceptData
                | Effect::RequestSnapshot
                | Effect::PauseSimulation
                | Effect::ResumeSimulation => {}
            }
        }
        released
    }
}

fn encode<E: std::fmt::Display>(message: Result<Message, E>, what: &str) -> Option<Message> {
    match message {
        Ok(message) => Some(message),
        Err(err) => {
            warn!("Failed to encode {}: {}", what, err);
            None
        }
    }
}

/// Sends one message as a data frame. Returns whether it left.
pub(crate) fn send_data(
    slot: &mut ConnectionSlot,
    message: Message,
    config: &NetConfig,
    outbox: &MessageProducer<Datagram>,
) -> bool {
    send_data_with(slot, message, FrameFlags::empty(), config, outbox)
}

pub(crate) fn send_data_with(
    slot: &mut ConnectionSlot,
    message: Message,
    flags: FrameFlags,
    config: &NetConfig,
    outbox: &MessageProducer<Datagram>,
) -> bool {
    let Some(addr) = slot.addr else {
        return false;
    };
    match slot.data_frame(message, flags, config) {
        Ok(bytes) => {
            if outbox.put(Datagram::new(addr, bytes)).is_some() {
                debug!("Outbox full, oldest datagram evicted");
            }
            true
        }
        Err(err) => {
            warn!("Slot {}: failed to encode data frame: {}", slot.client_id, err);
            false
        }
    }
}
