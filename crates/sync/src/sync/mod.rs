//! Application-level replication: component schemas, the world interface
//! and the snapshot / update / event message shapes.

mod components;
mod input;
mod reader;
mod schema;
mod world;

pub use components::{
    ComponentSet, MassProperties, MatchInfo, PlayerStatus, Transform, Velocity, WORLD_EXTENT,
};
pub use input::{Buttons, InputCommand};
pub use reader::{Inbound, MessageReader, Resolution};
pub use schema::{Field, FieldRange, FieldSpec, Replicated};
pub use world::{EntityId, EntityKind, EntityState, ReplicatedWorld, SimWorld};

use crate::bits::CodecError;
use crate::net::MessageKind;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("unknown event type index {0}")]
    UnknownEventType(u32),
    #[error("{0:?} message is not accepted here")]
    UnexpectedMessage(MessageKind),
    #[error("malformed message: {0}")]
    Codec(#[from] CodecError),
}
