use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, trace, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{ConfigError, NetConfig};
use crate::connection::{ConnectionSlot, ConnectionState, Effect, StateEvent};
use crate::net::{
    Datagram, Frame, FrameFlags, Message, MessageConsumer, MessageProducer, NetworkStats,
    PacketConsumer, PacketProducer, message_buffer, packet_buffer,
};
use crate::server::{MAX_EVENTS_PER_MESSAGE, send_data, send_data_with};
use crate::sync::{InputCommand, MessageReader, ReplicatedWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected { clean: bool },
    /// Connection went quiet; local simulation should stop until resynced.
    SimulationPaused,
    SimulationResumed,
}

/// Client side of the protocol, talking to a single server.
///
/// Same two-phase tick as [`crate::Server`]: `update` before the local
/// systems run, `update2` after.
pub struct Client {
    config: NetConfig,
    server_addr: SocketAddr,
    slot: ConnectionSlot,
    reader: MessageReader,
    rng: StdRng,
    inbox_tx: PacketProducer<Datagram>,
    inbox_rx: PacketConsumer<Datagram>,
    outbox_tx: MessageProducer<Datagram>,
    outbox_rx: MessageConsumer<Datagram>,
    events: Vec<ClientEvent>,
    paused: bool,
    /// Time since the last snapshot request went out, while one is pending.
    snapshot_request_age: Option<Duration>,
    clock: Duration,
}

impl Client {
    pub fn new(config: NetConfig, server_addr: SocketAddr) -> Result<Self, ConfigError> {
        Self::with_rng(config, server_addr, StdRng::from_entropy())
    }

    pub fn with_seed(
        config: NetConfig,
        server_addr: SocketAddr,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::with_rng(config, server_addr, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: NetConfig,
        server_addr: SocketAddr,
        rng: StdRng,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (inbox_tx, inbox_rx) = packet_buffer(config.packet_buffer_capacity);
        let (outbox_tx, outbox_rx) = message_buffer(config.message_buffer_capacity);
        let mut slot = ConnectionSlot::new(0, ConnectionState::ClientEmpty, &config);
        slot.addr = Some(server_addr);
        Ok(Self {
            server_addr,
            slot,
            reader: MessageReader::new(config.byte_order),
            rng,
            inbox_tx,
            inbox_rx,
            outbox_tx,
            outbox_rx,
            events: Vec::new(),
            paused: false,
            snapshot_request_age: None,
            clock: Duration::ZERO,
            config,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.slot.state
    }

    pub fn is_connected(&self) -> bool {
        self.slot.state.is_connected()
    }

    pub fn is_simulation_paused(&self) -> bool {
        self.paused
    }

    pub fn salt(&self) -> u32 {
        self.slot.salt
    }

    pub fn stats(&self) -> &NetworkStats {
        self.slot.transport.stats()
    }

    pub fn inbox(&self) -> PacketProducer<Datagram> {
        self.inbox_tx.clone()
    }

    pub fn outbox(&self) -> MessageConsumer<Datagram> {
        self.outbox_rx.clone()
    }

    pub fn receive(&self, datagram: Datagram) {
        if self.inbox_tx.put(datagram) {
            trace!("Client inbox overran, skipping ahead");
        }
    }

    pub fn drain_outgoing(&self) -> Vec<Datagram> {
        self.outbox_rx.drain()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ClientEvent> + '_ {
        self.events.drain(..)
    }

    /// Starts the handshake. Does nothing unless idle.
    pub fn connect(&mut self) {
        let effects = self.slot.handle(StateEvent::Open, &mut self.rng);
        self.apply_effects(effects);
    }

    pub fn disconnect(&mut self) {
        let effects = self.slot.handle(StateEvent::Close, &mut self.rng);
        self.apply_effects(effects);
    }

    /// Asks the server for a full snapshot with the next outgoing frame.
    pub fn request_snapshot(&mut self) {
        self.slot.snapshot_needed = true;
        self.snapshot_request_age = None;
    }

    pub fn update<W: ReplicatedWorld>(&mut self, dt: Duration, world: &mut W) {
        self.clock += dt;
        if let Some(age) = self.snapshot_request_age.as_mut() {
            *age += dt;
        }

        let order = self.config.byte_order;
        for datagram in self.inbox_rx.drain() {
            if datagram.addr != self.server_addr {
                trace!("Ignoring datagram from {}", datagram.addr);
                continue;
            }
            let frame = match Frame::decode(&datagram.bytes, order) {
                Ok(frame) => frame,
                Err(err) => {
                    debug!("Dropping datagram from server: {}", err);
                    continue;
                }
            };
            self.slot
                .transport
                .record_bytes_received(datagram.bytes.len());

            let event = StateEvent::Received {
                packet_type: frame.header.packet_type,
                salt: frame.header.salt,
            };
            let effects = self.slot.handle(event, &mut self.rng);
            if effects.contains(&Effect::AcceptData) {
                self.slot.accept(frame);
            }
            if self.apply_effects(effects) {
                return;
            }
        }

        self.slot.process_acks();
        for message in self.slot.take_messages() {
            if let Err(err) = self.reader.read_message(&message, world, None) {
                debug!("Discarding message {}: {}", message.id, err);
            }
        }

        let resolution = self.reader.end_tick(world);
        if resolution.request_snapshot && !self.slot.snapshot_needed {
            debug!("Update referenced unknown entities, requesting snapshot");
            self.request_snapshot();
        }
        if resolution.snapshot_applied {
            self.slot.snapshot_needed = false;
            self.snapshot_request_age = None;
            let effects = self.slot.handle(StateEvent::SnapshotApplied, &mut self.rng);
            self.apply_effects(effects);
        }

        let effects = self.slot.tick(dt, &self.config, &mut self.rng);
        self.apply_effects(effects);
    }

    /// Sends this tick's inputs (or a keepalive) and pending events.
    pub fn update2<W: ReplicatedWorld>(&mut self, world: &mut W, inputs: &[InputCommand]) {
        let outbound = world.poll_outbound_events();
        if !self.slot.state.is_connected() {
            return;
        }
        let now_ms = self.clock.as_millis() as u64;
        for event in outbound {
            self.slot.events.push(now_ms, event);
        }
        self.slot.events.cleanup(now_ms);

        let mut flags = FrameFlags::empty();
        if self.slot.snapshot_needed {
            let due = self
                .snapshot_request_age
                .is_none_or(|age| age >= self.config.handshake_resend());
            if due {
                flags |= FrameFlags::REQUEST_SNAPSHOT;
                self.snapshot_request_age = Some(Duration::ZERO);
            }
        }

        let frame = world.current_frame();
        let message = if inputs.is_empty() {
            Message::empty()
        } else {
            match self.reader.write_inputs(frame, inputs) {
                Ok(message) => message,
                Err(err) => {
                    warn!("Failed to encode inputs: {}", err);
                    Message::empty()
                }
            }
        };
        send_data_with(&mut self.slot, message, flags, &self.config, &self.outbox_tx);

        let (sequences, events) = self.slot.events.next_batch(MAX_EVENTS_PER_MESSAGE);
        if events.is_empty() {
            return;
        }
        match self.reader.write_events(frame, &events) {
            Ok(message) => {
                let message_id = message.id;
                if send_data(&mut self.slot, message, &self.config, &self.outbox_tx) {
                    self.slot.events.mark_sent(&sequences, message_id);
                }
            }
            Err(err) => warn!("Failed to encode events: {}", err),
        }
    }

    /// Returns whether the session ended.
    fn apply_effects(&mut self, effects: Vec<Effect>) -> bool {
        let mut released = false;
        for effect in effects {
            match effect {
                Effect::Send { packet_type, salt } => {
                    match self.slot.control_frame(packet_type, salt, &self.config) {
                        Ok(bytes) => {
                            self.slot.transport.record_bytes_sent(bytes.len());
                            self.outbox_tx.put(Datagram::new(self.server_addr, bytes));
                        }
                        Err(err) => warn!("Failed to encode {:?}: {}", packet_type, err),
                    }
                }
                Effect::PeerConnected => {
                    info!(
                        "Connected to {} with salt {:#010x}",
                        self.server_addr, self.slot.salt
                    );
                    self.events.push(ClientEvent::Connected);
                }
                Effect::PeerDisconnected { clean } => {
                    info!(
                        "Disconnected from {} ({})",
                        self.server_addr,
                        if clean { "clean" } else { "timeout" }
                    );
                    self.events.push(ClientEvent::Disconnected { clean });
                }
                Effect::PauseSimulation => {
                    self.paused = true;
                    self.events.push(ClientEvent::SimulationPaused);
                }
                Effect::ResumeSimulation => {
                    self.paused = false;
                    self.events.push(ClientEvent::SimulationResumed);
                }
                Effect::RequestSnapshot => {
                    self.snapshot_request_age = None;
                }
                Effect::Release => {
                    self.slot.reset(&self.config);
                    self.slot.addr = Some(self.server_addr);
                    self.reader.reset();
                    self.paused = false;
                    self.snapshot_request_age = None;
                    released = true;
                }
                Effect::AdoptSalt(_)
                | Effect::AcceptData
                | Effect::Reconnected
                | Effect::Reject(_) => {}
            }
        }
        released
    }
}
