use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, trace};
use rand::Rng;

use super::state::{ConnectionState, Effect, StateEvent, step};
use crate::config::NetConfig;
use crate::event::EventQueue;
use crate::net::{
    Delivery, Frame, FrameError, FrameFlags, FrameHeader, Mailbox, Message, MessageHistory,
    MessageInfo, MessageKind, PacketConsumer, PacketProducer, PacketType, Transport,
    packet_buffer,
};

/// Everything one side keeps about one peer.
#[derive(Debug)]
pub struct ConnectionSlot {
    pub client_id: u32,
    pub player_id: u16,
    pub addr: Option<SocketAddr>,
    pub salt: u32,
    pub state: ConnectionState,
    pub transport: Transport,
    pub history: MessageHistory,
    pub events: EventQueue,
    /// Server: a snapshot goes out on the next outbound tick. Client: a
    /// snapshot request does.
    pub snapshot_needed: bool,
    elapsed: Duration,
    resend_elapsed: Duration,
    packets_tx: PacketProducer<Frame>,
    packets_rx: PacketConsumer<Frame>,
    messages: Mailbox<Message>,
    initial_state: ConnectionState,
}

impl ConnectionSlot {
    pub fn new(client_id: u32, initial_state: ConnectionState, config: &NetConfig) -> Self {
        let (packets_tx, packets_rx) = packet_buffer(config.packet_buffer_capacity);
        Self {
            client_id,
            player_id: 0,
            addr: None,
            salt: 0,
            state: initial_state,
            transport: Transport::new(config.sequence_window, config.send_history),
            history: MessageHistory::new(config.message_history),
            events: EventQueue::new(config.event_queue_capacity),
            snapshot_needed: false,
            elapsed: Duration::ZERO,
            resend_elapsed: Duration::ZERO,
            packets_tx,
            packets_rx,
            messages: Mailbox::new(config.message_buffer_capacity),
            initial_state,
        }
    }

    /// Back to the pool: a fresh session with nothing carried over.
    pub fn reset(&mut self, config: &NetConfig) {
        *self = Self::new(self.client_id, self.initial_state, config);
    }

    pub fn is_free(&self) -> bool {
        self.state.is_free()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Steps the state machine and applies the effects that belong to the
    /// slot itself. The rest are returned for the owner.
    pub fn handle<R: Rng + ?Sized>(&mut self, event: StateEvent, rng: &mut R) -> Vec<Effect> {
        let previous = self.state;
        let transition = step(self.state, self.salt, event, rng);
        if transition.is_qualifying() {
            self.elapsed = Duration::ZERO;
        }
        if transition.state != previous {
            trace!(
                "Slot {}: {} -> {}",
                self.client_id,
                previous.name(),
                transition.state.name()
            );
            self.resend_elapsed = Duration::ZERO;
        }
        self.state = transition.state;

        for effect in &transition.effects {
            match *effect {
                Effect::AdoptSalt(salt) => self.salt = salt,
                Effect::RequestSnapshot if self.state.is_connected() => {
                    self.snapshot_needed = true;
                }
                _ => {}
            }
        }
        transition.effects
    }

    /// Advances the timeout and resend clocks by one tick.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        dt: Duration,
        config: &NetConfig,
        rng: &mut R,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();

        self.elapsed += dt;
        if let Some(threshold) = self.state.timeout_threshold(config) {
            if self.elapsed > threshold {
                debug!(
                    "Slot {} timed out in {} after {:?}",
                    self.client_id,
                    self.state.name(),
                    self.elapsed
                );
                self.elapsed = Duration::ZERO;
                effects.extend(self.handle(StateEvent::TimedOut, rng));
                return effects;
            }
        }

        if self.state.resends() {
            self.resend_elapsed += dt;
            if self.resend_elapsed >= config.handshake_resend() {
                self.resend_elapsed = Duration::ZERO;
                effects.extend(self.handle(StateEvent::Resend, rng));
            }
        }
        effects
    }

    /// Queues a received frame in the slot's jitter buffer.
    pub fn enqueue(&self, frame: Frame) -> bool {
        self.packets_tx.put(frame)
    }

    /// Drains the jitter buffer with skip-ahead applied.
    pub fn drain_packets(&self) -> Vec<Frame> {
        self.packets_rx.drain()
    }

    pub fn jitter_jump(&self) -> usize {
        self.packets_rx.jump()
    }

    /// Runs a frame that the state machine accepted through sequencing and,
    /// if delivered, hands its message to the mailbox. Returns whether the
    /// peer asked for a snapshot.
    pub fn accept(&mut self, frame: Frame) -> bool {
        match self.transport.update_received(&frame.header) {
            Delivery::Deliver => {
                let requested = frame.header.flags.contains(FrameFlags::REQUEST_SNAPSHOT);
                if !frame.message.is_empty() && self.messages.put(frame.message).is_some() {
                    debug!("Slot {} mailbox full, evicted oldest message", self.client_id);
                }
                requested
            }
            delivery => {
                trace!(
                    "Slot {} discarding {:?} sequence {}",
                    self.client_id, delivery, frame.header.local_seq
                );
                false
            }
        }
    }

    pub fn take_messages(&self) -> Vec<Message> {
        self.messages.drain()
    }

    /// Folds transport acknowledgements and drops into higher-level state:
    /// acknowledged messages release their reliable events, dropped
    /// snapshots are re-flagged and dropped event messages are requeued.
    pub fn process_acks(&mut self) {
        for message_id in self.transport.take_acked_messages() {
            self.events.ack_message(message_id);
        }

        for dropped in self.transport.take_dropped() {
            // event bookkeeping is keyed by message id alone; the history
            // ring may already have recycled this entry
            let requeued = self.events.message_dropped(dropped.message_id);
            if requeued > 0 {
                debug!(
                    "Slot {}: requeued {} events from message {}",
                    self.client_id, requeued, dropped.message_id
                );
            }

            let snapshot_lost = self
                .history
                .lookup(dropped.message_id)
                .is_some_and(|info| info.kind == MessageKind::Snapshot);
            if snapshot_lost {
                debug!(
                    "Slot {}: snapshot {} dropped, resending",
                    self.client_id, dropped.message_id
                );
                self.snapshot_needed = true;
            }
        }
    }

    /// Encodes a data frame, assigning its sequence number and recording the
    /// message for drop lookup.
    pub fn data_frame(
        &mut self,
        message: Message,
        flags: FrameFlags,
        config: &NetConfig,
    ) -> Result<Vec<u8>, FrameError> {
        let mut header = FrameHeader::new(PacketType::Data, self.salt);
        header.flags = flags;
        self.transport.set_headers(&mut header, message.id);
        if !message.is_empty() {
            self.history.record(MessageInfo {
                message_id: message.id,
                kind: message.kind,
                update_kind: message.update_kind,
            });
        }
        let bytes = Frame::new(header, message).encode(config.byte_order)?;
        self.transport.record_bytes_sent(bytes.len());
        Ok(bytes)
    }

    /// Encodes a handshake or control frame. These are not sequenced.
    pub fn control_frame(
        &self,
        packet_type: PacketType,
        salt: u32,
        config: &NetConfig,
    ) -> Result<Vec<u8>, FrameError> {
        Frame::handshake(packet_type, salt).encode(config.byte_order)
    }
}
