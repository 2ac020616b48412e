use std::borrow::Cow;
use std::collections::BTreeSet;

use log::{debug, trace};

use super::ProtocolError;
use super::components::{MatchInfo, PlayerStatus};
use super::input::InputCommand;
use super::schema::Replicated;
use super::world::{EntityId, EntityState, ReplicatedWorld};
use crate::bits::{BitReader, BitWriter, ByteOrder, CodecError, ReadStream, Stream, WriteStream};
use crate::event::GameEvent;
use crate::net::{Message, MessageKind, UpdateKind};

const ENTRY_LEN_BYTES: usize = 2;

/// What an inbound message turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Snapshot { entities: usize },
    Update { entities: usize },
    Events { dispatched: usize, skipped: usize },
    Inputs(usize),
    /// Stale or empty; nothing applied.
    Ignored,
}

/// End-of-tick outcome of consistency tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// An update referenced entities this side has never seen.
    pub request_snapshot: bool,
    /// Entities that silently stopped appearing in updates and were removed.
    pub removed: Vec<EntityId>,
    pub snapshot_applied: bool,
}

/// Builds and applies the replication message shapes.
///
/// Every shape is encoded and decoded by the same `serialize` methods on the
/// component and entity types, so the two directions cannot disagree on the
/// bit layout. Decoding always completes before anything is written to the
/// world; a malformed message is never partially applied.
#[derive(Debug)]
pub struct MessageReader {
    order: ByteOrder,
    last_frame: Option<i32>,
    unknown: BTreeSet<EntityId>,
    missing: BTreeSet<EntityId>,
    snapshot_applied: bool,
}

impl MessageReader {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            last_frame: None,
            unknown: BTreeSet::new(),
            missing: BTreeSet::new(),
            snapshot_applied: false,
        }
    }

    /// Frame number of the newest snapshot or update applied.
    pub fn last_frame(&self) -> Option<i32> {
        self.last_frame
    }

    pub fn reset(&mut self) {
        self.last_frame = None;
        self.unknown.clear();
        self.missing.clear();
        self.snapshot_applied = false;
    }

    fn stream(&self) -> WriteStream {
        WriteStream::new(BitWriter::with_order(self.order))
    }

    fn read_stream<'a>(&self, bytes: &'a [u8]) -> ReadStream<'a> {
        ReadStream::new(BitReader::with_order(Cow::Borrowed(bytes), self.order))
    }

    /// Match metadata, every entity with all its components, then every
    /// player's status.
    pub fn write_snapshot<W: ReplicatedWorld>(&self, world: &W) -> Result<Message, CodecError> {
        let mut stream = self.stream();
        let mut info = world.match_info();
        info.serialize(&mut stream)?;

        let states: Vec<EntityState> = world
            .entity_ids()
            .into_iter()
            .filter_map(|id| world.read_entity(id))
            .collect();
        let entry_count = entry_count(states.len())?;
        for mut state in states {
            state.serialize_full(&mut stream)?;
        }

        let players = world.players();
        let mut player_count = entry_count_u64(players.len())?;
        stream.serialize_bits(&mut player_count, 16)?;
        for mut player in players {
            player.serialize(&mut stream)?;
        }

        Ok(Message::new(
            MessageKind::Snapshot,
            world.current_frame(),
            entry_count,
            stream.finish(),
        ))
    }

    /// Match metadata, then the dynamic components of every live entity in
    /// ascending id order.
    pub fn write_update<W: ReplicatedWorld>(&self, world: &W) -> Result<Message, CodecError> {
        let mut stream = self.stream();
        let mut info = world.match_info();
        info.serialize(&mut stream)?;

        let states: Vec<EntityState> = world
            .entity_ids()
            .into_iter()
            .filter_map(|id| world.read_entity(id))
            .collect();
        let entry_count = entry_count(states.len())?;
        for mut state in states {
            state.serialize_dynamic(&mut stream)?;
        }

        Ok(Message::new(
            MessageKind::Update,
            world.current_frame(),
            entry_count,
            stream.finish(),
        ))
    }

    /// One length-prefixed entry per event, so a bad entry can be skipped
    /// without losing the rest and messages can be joined with
    /// [`Message::append`].
    pub fn write_events(&self, frame: i32, events: &[GameEvent]) -> Result<Message, CodecError> {
        let mut payload = Vec::new();
        for event in events {
            let mut stream = self.stream();
            event.write(&mut stream)?;
            let bytes = stream.finish();
            let len = u16::try_from(bytes.len()).map_err(|_| CodecError::ValueOutOfRange {
                value: bytes.len() as i64,
                min: 0,
                max: u16::MAX as i64,
            })?;
            payload.extend_from_slice(&match self.order {
                ByteOrder::Little => len.to_le_bytes(),
                ByteOrder::Big => len.to_be_bytes(),
            });
            payload.extend_from_slice(&bytes);
        }
        Ok(
            Message::new(MessageKind::Update, frame, entry_count(events.len())?, payload)
                .with_update_kind(UpdateKind::Event),
        )
    }

    pub fn write_inputs(&self, frame: i32, commands: &[InputCommand]) -> Result<Message, CodecError> {
        let mut stream = self.stream();
        for command in commands {
            let mut command = *command;
            command.serialize(&mut stream)?;
        }
        Ok(Message::new(
            MessageKind::Input,
            frame,
            entry_count(commands.len())?,
            stream.finish(),
        ))
    }

    /// Applies one inbound message. `from` identifies the sending client on
    /// the server and is `None` on a client.
    pub fn read_message<W: ReplicatedWorld>(
        &mut self,
        message: &Message,
        world: &mut W,
        from: Option<u32>,
    ) -> Result<Inbound, ProtocolError> {
        match (message.kind, message.update_kind) {
            (MessageKind::Empty, _) => Ok(Inbound::Ignored),
            // world state only flows from the authority
            (MessageKind::Snapshot, _) | (MessageKind::Update, UpdateKind::System)
                if from.is_some() =>
            {
                Err(ProtocolError::UnexpectedMessage(message.kind))
            }
            (MessageKind::Snapshot, _) => self.read_snapshot(message, world),
            (MessageKind::Update, UpdateKind::System) => self.read_update(message, world),
            (MessageKind::Update, UpdateKind::Event) => Ok(self.read_events(message, world, from)),
            (MessageKind::Input, _) => {
                let Some(client_id) = from else {
                    return Err(ProtocolError::UnexpectedMessage(MessageKind::Input));
                };
                self.read_inputs(message, world, client_id)
            }
        }
    }

    fn is_stale(&self, frame: i32) -> bool {
        self.last_frame.is_some_and(|last| frame.wrapping_sub(last) < 0)
    }

    fn read_snapshot<W: ReplicatedWorld>(
        &mut self,
        message: &Message,
        world: &mut W,
    ) -> Result<Inbound, ProtocolError> {
        if self.is_stale(message.frame_num) {
            trace!("Ignoring stale snapshot for frame {}", message.frame_num);
            return Ok(Inbound::Ignored);
        }

        let mut stream = self.read_stream(&message.payload);
        let mut info = MatchInfo::default();
        info.serialize(&mut stream)?;

        let mut entities = Vec::with_capacity(message.entry_count as usize);
        for _ in 0..message.entry_count {
            let mut state = EntityState::default();
            state.serialize_full(&mut stream)?;
            entities.push(state);
        }

        let mut player_count = 0u64;
        stream.serialize_bits(&mut player_count, 16)?;
        let mut players = Vec::with_capacity(player_count as usize);
        for _ in 0..player_count {
            let mut player = PlayerStatus::default();
            player.serialize(&mut stream)?;
            players.push(player);
        }

        let present: BTreeSet<EntityId> = entities.iter().map(|e| e.id).collect();
        for id in world.entity_ids() {
            if !present.contains(&id) {
                world.remove_entity(id);
            }
        }
        for state in &entities {
            world.write_entity(state);
        }
        for player in &players {
            world.write_player(player);
        }
        world.write_match_info(&info);

        self.last_frame = Some(message.frame_num);
        self.unknown.clear();
        self.missing.clear();
        self.snapshot_applied = true;

        debug!(
            "Applied snapshot for frame {} ({} entities, {} players)",
            message.frame_num,
            entities.len(),
            players.len()
        );
        Ok(Inbound::Snapshot {
            entities: entities.len(),
        })
    }

    fn read_update<W: ReplicatedWorld>(
        &mut self,
        message: &Message,
        world: &mut W,
    ) -> Result<Inbound, ProtocolError> {
        if self.last_frame.is_some_and(|last| message.frame_num.wrapping_sub(last) <= 0) {
            trace!("Ignoring stale update for frame {}", message.frame_num);
            return Ok(Inbound::Ignored);
        }

        let mut stream = self.read_stream(&message.payload);
        let mut info = MatchInfo::default();
        info.serialize(&mut stream)?;

        let mut entities = Vec::with_capacity(message.entry_count as usize);
        for _ in 0..message.entry_count {
            let mut state = EntityState::default();
            state.serialize_dynamic(&mut stream)?;
            entities.push(state);
        }

        let referenced: BTreeSet<EntityId> = entities.iter().map(|e| e.id).collect();
        self.missing = world
            .entity_ids()
            .into_iter()
            .filter(|id| !referenced.contains(id))
            .collect();

        for state in &entities {
            match world.read_entity(state.id) {
                Some(local) => {
                    // updates carry no kind; keep the local one
                    let mut state = *state;
                    state.kind = local.kind;
                    world.write_entity(&state);
                }
                None => {
                    self.unknown.insert(state.id);
                }
            }
        }
        world.write_match_info(&info);
        self.last_frame = Some(message.frame_num);

        Ok(Inbound::Update {
            entities: entities.len(),
        })
    }

    fn read_events<W: ReplicatedWorld>(
        &mut self,
        message: &Message,
        world: &mut W,
        from: Option<u32>,
    ) -> Inbound {
        let mut dispatched = 0;
        let mut skipped = 0;
        let mut rest = message.payload.as_slice();

        for _ in 0..message.entry_count {
            let Some((prefix, tail)) = rest.split_first_chunk::<ENTRY_LEN_BYTES>() else {
                debug!("Event message {} truncated", message.id);
                skipped += 1;
                break;
            };
            let len = match self.order {
                ByteOrder::Little => u16::from_le_bytes(*prefix),
                ByteOrder::Big => u16::from_be_bytes(*prefix),
            } as usize;
            if tail.len() < len {
                debug!("Event message {} truncated", message.id);
                skipped += 1;
                break;
            }
            let (entry, tail) = tail.split_at(len);
            rest = tail;

            match GameEvent::read(&mut self.read_stream(entry)) {
                Ok(event) => {
                    world.dispatch_inbound_event(from, event);
                    dispatched += 1;
                }
                Err(e) => {
                    debug!("Skipping event in message {}: {}", message.id, e);
                    skipped += 1;
                }
            }
        }

        Inbound::Events {
            dispatched,
            skipped,
        }
    }

    fn read_inputs<W: ReplicatedWorld>(
        &mut self,
        message: &Message,
        world: &mut W,
        client_id: u32,
    ) -> Result<Inbound, ProtocolError> {
        let mut stream = self.read_stream(&message.payload);
        let mut commands = Vec::with_capacity(message.entry_count as usize);
        for _ in 0..message.entry_count {
            let mut command = InputCommand::default();
            command.serialize(&mut stream)?;
            commands.push(command);
        }
        for command in &commands {
            world.apply_input(client_id, command);
        }
        Ok(Inbound::Inputs(commands.len()))
    }

    /// Resolves the consistency sets gathered this tick: unknown entities ask
    /// for a snapshot, silently missing ones are removed locally.
    pub fn end_tick<W: ReplicatedWorld>(&mut self, world: &mut W) -> Resolution {
        let request_snapshot = !self.unknown.is_empty();
        if request_snapshot {
            debug!("Update referenced unknown entities {:?}", self.unknown);
        }

        let removed: Vec<EntityId> = std::mem::take(&mut self.missing).into_iter().collect();
        for &id in &removed {
            trace!("Entity {} no longer updated, removing", id);
            world.remove_entity(id);
        }
        self.unknown.clear();

        Resolution {
            request_snapshot,
            removed,
            snapshot_applied: std::mem::take(&mut self.snapshot_applied),
        }
    }
}

fn entry_count(len: usize) -> Result<u16, CodecError> {
    u16::try_from(len).map_err(|_| CodecError::ValueOutOfRange {
        value: len as i64,
        min: 0,
        max: u16::MAX as i64,
    })
}

fn entry_count_u64(len: usize) -> Result<u64, CodecError> {
    entry_count(len).map(u64::from)
}
