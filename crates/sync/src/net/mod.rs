mod endpoint;
mod history;
mod jitter;
mod protocol;
mod sequence;
mod simulator;
mod stats;
mod transport;

pub use endpoint::{Datagram, UdpEndpoint};
pub use history::{MessageHistory, MessageInfo};
pub use jitter::{
    Mailbox, MessageConsumer, MessageProducer, PacketConsumer, PacketProducer, Sink, message_buffer,
    packet_buffer,
};
pub use protocol::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, Frame, FrameError, FrameFlags, FrameHeader, MAX_PACKET_SIZE,
    Message, MessageKind, PROTOCOL_VERSION, PacketType, UpdateKind, next_message_id,
};
pub use sequence::{SequenceWindow, sequence_greater_than};
pub use simulator::{LinkConditions, LinkSimulator};
pub use stats::NetworkStats;
pub use transport::{Delivery, DroppedPacket, Transport};
