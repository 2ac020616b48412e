pub mod bits;
pub mod config;
pub mod connection;
pub mod event;
pub mod net;
pub mod sync;

mod client;
mod server;
mod tick;

pub use client::{Client, ClientEvent};
pub use config::{ConfigError, NetConfig};
pub use connection::{ConnectError, ConnectionManager, ConnectionSlot, ConnectionState};
pub use event::{EventQueue, GameEvent, PendingEvent, ReliabilityMode};
pub use net::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, Datagram, Frame, FrameError, FrameFlags, FrameHeader,
    LinkConditions, LinkSimulator, MAX_PACKET_SIZE, Message, MessageKind, NetworkStats, PacketType,
    UdpEndpoint,
};
pub use server::{DisconnectReason, MAX_EVENTS_PER_MESSAGE, Server, ServerEvent};
pub use sync::{
    EntityId, EntityKind, EntityState, InputCommand, MessageReader, ProtocolError,
    ReplicatedWorld, SimWorld,
};
pub use tick::FixedTimestep;
