use std::collections::BTreeMap;

use glam::Vec3;

use super::components::{
    ComponentSet, MassProperties, MatchInfo, PlayerStatus, Transform, Velocity,
};
use super::input::InputCommand;
use super::schema::Replicated;
use crate::bits::{CodecError, Stream};
use crate::event::GameEvent;

pub type EntityId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum EntityKind {
    #[default]
    Player = 0,
    Projectile = 1,
    Item = 2,
    Static = 3,
    Trigger = 4,
    DynamicProp = 5,
}

impl TryFrom<u8> for EntityKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Player,
            1 => Self::Projectile,
            2 => Self::Item,
            3 => Self::Static,
            4 => Self::Trigger,
            5 => Self::DynamicProp,
            other => {
                return Err(CodecError::ValueOutOfRange {
                    value: other.into(),
                    min: 0,
                    max: Self::DynamicProp as i64,
                });
            }
        })
    }
}

/// Replicated view of one entity. Only the components in `components` are
/// meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityState {
    pub id: EntityId,
    pub kind: EntityKind,
    pub components: ComponentSet,
    pub transform: Transform,
    pub velocity: Velocity,
    pub mass: MassProperties,
}

impl EntityState {
    pub fn new(id: EntityId, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self.components |= ComponentSet::TRANSFORM;
        self
    }

    pub fn with_velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = velocity;
        self.components |= ComponentSet::VELOCITY;
        self
    }

    pub fn with_mass(mut self, mass: MassProperties) -> Self {
        self.mass = mass;
        self.components |= ComponentSet::MASS;
        self
    }

    /// Kind, component mask and every present component.
    pub fn serialize_full<S: Stream>(&mut self, stream: &mut S) -> Result<(), CodecError> {
        self.serialize_id(stream)?;

        let mut kind = self.kind as u8;
        stream.serialize_ranged(&mut kind, 0, 7)?;
        self.kind = EntityKind::try_from(kind)?;

        let mut mask = self.components.bits() as u64;
        stream.serialize_bits(&mut mask, 3)?;
        self.components = ComponentSet::from_bits_truncate(mask as u8);

        self.serialize_components(stream, self.components)
    }

    /// Only the components that change every tick.
    pub fn serialize_dynamic<S: Stream>(&mut self, stream: &mut S) -> Result<(), CodecError> {
        self.serialize_id(stream)?;
        self.serialize_components(stream, ComponentSet::DYNAMIC)?;
        if stream.is_reading() {
            self.components = ComponentSet::DYNAMIC;
        }
        Ok(())
    }

    fn serialize_id<S: Stream>(&mut self, stream: &mut S) -> Result<(), CodecError> {
        let mut id = self.id as u64;
        stream.serialize_bits(&mut id, 32)?;
        self.id = id as EntityId;
        Ok(())
    }

    fn serialize_components<S: Stream>(
        &mut self,
        stream: &mut S,
        set: ComponentSet,
    ) -> Result<(), CodecError> {
        if set.contains(ComponentSet::TRANSFORM) {
            self.transform.serialize(stream)?;
        }
        if set.contains(ComponentSet::VELOCITY) {
            self.velocity.serialize(stream)?;
        }
        if set.contains(ComponentSet::MASS) {
            self.mass.serialize(stream)?;
        }
        Ok(())
    }
}

/// The simulation as seen by replication.
///
/// Servers read through it to build snapshots and updates; clients write
/// decoded state back through it.
pub trait ReplicatedWorld {
    fn current_frame(&self) -> i32;

    /// Ascending.
    fn entity_ids(&self) -> Vec<EntityId>;

    fn read_entity(&self, id: EntityId) -> Option<EntityState>;

    /// Creates the entity if needed and overwrites the components present
    /// in `state.components`.
    fn write_entity(&mut self, state: &EntityState);

    fn remove_entity(&mut self, id: EntityId);

    fn match_info(&self) -> MatchInfo;

    fn write_match_info(&mut self, info: &MatchInfo);

    fn players(&self) -> Vec<PlayerStatus>;

    fn write_player(&mut self, status: &PlayerStatus);

    fn poll_outbound_events(&mut self) -> Vec<GameEvent>;

    /// `from` is the sending client on the server, `None` on a client.
    fn dispatch_inbound_event(&mut self, from: Option<u32>, event: GameEvent);

    fn apply_input(&mut self, _client_id: u32, _input: &InputCommand) {}
}

/// Plain in-memory world used by the bundled binaries and tests.
#[derive(Debug, Default)]
pub struct SimWorld {
    frame: i32,
    entities: BTreeMap<EntityId, EntityState>,
    players: BTreeMap<u16, PlayerStatus>,
    match_info: MatchInfo,
    next_entity_id: EntityId,
    outbound_events: Vec<GameEvent>,
    inbound_events: Vec<(Option<u32>, GameEvent)>,
    inputs: BTreeMap<u32, InputCommand>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self {
            next_entity_id: 1,
            ..Default::default()
        }
    }

    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn spawn(&mut self, kind: EntityKind, position: Vec3) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        self.spawn_with_id(id, kind, position)
    }

    pub fn spawn_with_id(&mut self, id: EntityId, kind: EntityKind, position: Vec3) -> EntityId {
        let state = EntityState::new(id, kind)
            .with_transform(Transform {
                position,
                ..Default::default()
            })
            .with_velocity(Velocity::default())
            .with_mass(MassProperties::default());
        self.entities.insert(id, state);
        if id >= self.next_entity_id {
            self.next_entity_id = id + 1;
        }
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<EntityState> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityState> {
        self.entities.get_mut(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn player(&self, player_id: u16) -> Option<&PlayerStatus> {
        self.players.get(&player_id)
    }

    pub fn player_mut(&mut self, player_id: u16) -> &mut PlayerStatus {
        self.players.entry(player_id).or_insert_with(|| PlayerStatus {
            player_id,
            ..Default::default()
        })
    }

    pub fn remove_player(&mut self, player_id: u16) {
        self.players.remove(&player_id);
    }

    pub fn match_info_mut(&mut self) -> &mut MatchInfo {
        &mut self.match_info
    }

    pub fn queue_event(&mut self, event: GameEvent) {
        self.outbound_events.push(event);
    }

    pub fn take_inbound_events(&mut self) -> Vec<(Option<u32>, GameEvent)> {
        std::mem::take(&mut self.inbound_events)
    }

    pub fn last_input(&self, client_id: u32) -> Option<&InputCommand> {
        self.inputs.get(&client_id)
    }

    /// Integrates velocities and advances the frame counter.
    pub fn step(&mut self, dt: f32) {
        for entity in self.entities.values_mut() {
            if !entity.components.contains(ComponentSet::DYNAMIC) {
                continue;
            }
            let velocity = entity.velocity;
            let transform = &mut entity.transform;
            transform.position = (transform.position + velocity.linear * dt)
                .clamp(Vec3::splat(-1000.0), Vec3::splat(1000.0));
            if velocity.angular.length_squared() > 0.0 {
                let spin = glam::Quat::from_scaled_axis(velocity.angular * dt);
                transform.rotation = (spin * transform.rotation).normalize();
            }
        }
        self.frame = self.frame.wrapping_add(1);
    }
}

impl ReplicatedWorld for SimWorld {
    fn current_frame(&self) -> i32 {
        self.frame
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    fn read_entity(&self, id: EntityId) -> Option<EntityState> {
        self.entities.get(&id).copied()
    }

    fn write_entity(&mut self, state: &EntityState) {
        let entity = self
            .entities
            .entry(state.id)
            .or_insert_with(|| EntityState::new(state.id, state.kind));
        if state.components.contains(ComponentSet::TRANSFORM) {
            entity.transform = state.transform;
        }
        if state.components.contains(ComponentSet::VELOCITY) {
            entity.velocity = state.velocity;
        }
        if state.components.contains(ComponentSet::MASS) {
            entity.mass = state.mass;
        }
        entity.components |= state.components;
        if state.id >= self.next_entity_id {
            self.next_entity_id = state.id + 1;
        }
    }

    fn remove_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
    }

    fn match_info(&self) -> MatchInfo {
        self.match_info
    }

    fn write_match_info(&mut self, info: &MatchInfo) {
        self.match_info = *info;
    }

    fn players(&self) -> Vec<PlayerStatus> {
        self.players.values().copied().collect()
    }

    fn write_player(&mut self, status: &PlayerStatus) {
        self.players.insert(status.player_id, *status);
    }

    fn poll_outbound_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.outbound_events)
    }

    fn dispatch_inbound_event(&mut self, from: Option<u32>, event: GameEvent) {
        self.inbound_events.push((from, event));
    }

    fn apply_input(&mut self, client_id: u32, input: &InputCommand) {
        self.inputs.insert(client_id, *input);
    }
}
