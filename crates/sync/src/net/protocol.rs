use std::sync::atomic::{AtomicI64, Ordering};

use bitflags::bitflags;

use crate::bits::{BitReader, BitWriter, ByteOrder, CodecError};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 3;
pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;

/// type + crc
const PREFIX_LEN: usize = 5;

static NEXT_MESSAGE_ID: AtomicI64 = AtomicI64::new(1);

/// Process-wide monotonic message id. Never returns 0, which marks
/// handshake frames that carry no message.
pub fn next_message_id() -> i64 {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("datagram too short ({0} bytes)")]
    TooShort(usize),
    #[error("crc mismatch: header says {expected:#010x}, computed {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u8),
    #[error("encoded frame is {0} bytes, limit is {MAX_PACKET_SIZE}")]
    PayloadTooLarge(usize),
    #[error("malformed frame: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    ConnectionRequest = 0,
    ConnectionChallenge = 1,
    ConnectionChallengeResponse = 2,
    Data = 3,
    Disconnect = 4,
    Reconnect = 5,
    Empty = 6,
}

impl TryFrom<u8> for PacketType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::ConnectionRequest,
            1 => Self::ConnectionChallenge,
            2 => Self::ConnectionChallengeResponse,
            3 => Self::Data,
            4 => Self::Disconnect,
            5 => Self::Reconnect,
            6 => Self::Empty,
            other => return Err(FrameError::UnknownPacketType(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Update = 0,
    Snapshot = 1,
    Input = 2,
    Empty = 3,
}

impl TryFrom<u8> for MessageKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Update,
            1 => Self::Snapshot,
            2 => Self::Input,
            3 => Self::Empty,
            other => return Err(FrameError::UnknownMessageKind(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum UpdateKind {
    #[default]
    System = 0,
    Event = 1,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        /// Sender asks the peer for a full snapshot.
        const REQUEST_SNAPSHOT = 1 << 0;
        /// Frame reuses an already assigned local sequence number.
        const RESEND = 1 << 1;
        /// `remote_seq` and `ack_bits` describe received traffic.
        const HAS_ACKS = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub packet_type: PacketType,
    pub flags: FrameFlags,
    pub salt: u32,
    pub local_seq: u32,
    pub remote_seq: u32,
    pub ack_bits: u32,
}

impl FrameHeader {
    pub fn new(packet_type: PacketType, salt: u32) -> Self {
        Self {
            packet_type,
            flags: FrameFlags::empty(),
            salt,
            local_seq: 0,
            remote_seq: 0,
            ack_bits: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub frame_num: i32,
    pub kind: MessageKind,
    pub update_kind: UpdateKind,
    pub entry_count: u16,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageKind, frame_num: i32, entry_count: u16, payload: Vec<u8>) -> Self {
        Self {
            id: next_message_id(),
            frame_num,
            kind,
            update_kind: UpdateKind::System,
            entry_count,
            payload,
        }
    }

    pub fn empty() -> Self {
        Self {
            id: 0,
            frame_num: 0,
            kind: MessageKind::Empty,
            update_kind: UpdateKind::System,
            entry_count: 0,
            payload: Vec::new(),
        }
    }

    pub fn with_update_kind(mut self, update_kind: UpdateKind) -> Self {
        self.update_kind = update_kind;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0 && self.payload.is_empty()
    }

    /// Concatenates another message's entries onto this one.
    ///
    /// The combined message keeps this message's id and frame number; an
    /// empty message adopts the other's. Returns `false` without modifying
    /// anything when the entry count would overflow or the shapes differ.
    pub fn append(&mut self, other: Message) -> bool {
        if self.is_empty() {
            *self = other;
            return true;
        }
        if self.kind != other.kind || self.update_kind != other.update_kind {
            return false;
        }
        let Some(entry_count) = self.entry_count.checked_add(other.entry_count) else {
            return false;
        };
        self.entry_count = entry_count;
        self.payload.extend_from_slice(&other.payload);
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub message: Message,
}

impl Frame {
    pub fn new(header: FrameHeader, message: Message) -> Self {
        Self { header, message }
    }

    pub fn handshake(packet_type: PacketType, salt: u32) -> Self {
        Self::new(FrameHeader::new(packet_type, salt), Message::empty())
    }

    pub fn encode(&self, order: ByteOrder) -> Result<Vec<u8>, FrameError> {
        let header = &self.header;
        let message = &self.message;

        let mut body = BitWriter::with_order(order);
        body.write_bits(header.flags.bits() as u64, 8)?;
        body.write_bits(header.salt as u64, 32)?;
        body.write_bits(header.local_seq as u64, 32)?;
        body.write_bits(header.remote_seq as u64, 32)?;
        body.write_bits(header.ack_bits as u64, 32)?;
        body.write_bits(message.id as u64, 64)?;
        body.write_bits(message.frame_num as u32 as u64, 32)?;
        body.write_bits(message.kind as u64, 2)?;
        body.write_bits(message.update_kind as u64, 1)?;
        body.pad_to_byte()?;
        body.write_bits(message.entry_count as u64, 16)?;
        body.write_bits(message.payload.len() as u64, 32)?;
        body.write_bytes(&message.payload)?;
        let body = body.finish();

        let packet_type = header.packet_type as u8;
        let crc = checksum(packet_type, &body);

        let mut out = Vec::with_capacity(PREFIX_LEN + body.len());
        out.push(packet_type);
        out.extend_from_slice(&match order {
            ByteOrder::Little => crc.to_le_bytes(),
            ByteOrder::Big => crc.to_be_bytes(),
        });
        out.extend_from_slice(&body);

        if out.len() > MAX_PACKET_SIZE {
            return Err(FrameError::PayloadTooLarge(out.len()));
        }
        Ok(out)
    }

    /// Verifies the checksum before trusting any other byte.
    pub fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self, FrameError> {
        if bytes.len() < PREFIX_LEN {
            return Err(FrameError::TooShort(bytes.len()));
        }

        let packet_type = bytes[0];
        let crc_bytes = [bytes[1], bytes[2], bytes[3], bytes[4]];
        let expected = match order {
            ByteOrder::Little => u32::from_le_bytes(crc_bytes),
            ByteOrder::Big => u32::from_be_bytes(crc_bytes),
        };
        let body = &bytes[PREFIX_LEN..];
        let actual = checksum(packet_type, body);
        if expected != actual {
            return Err(FrameError::CrcMismatch { expected, actual });
        }

        let packet_type = PacketType::try_from(packet_type)?;
        let mut reader = BitReader::with_order(body.into(), order);

        let flags = FrameFlags::from_bits_truncate(reader.read_bits(8)? as u8);
        let salt = reader.read_bits(32)? as u32;
        let local_seq = reader.read_bits(32)? as u32;
        let remote_seq = reader.read_bits(32)? as u32;
        let ack_bits = reader.read_bits(32)? as u32;
        let id = reader.read_bits(64)? as i64;
        let frame_num = reader.read_bits(32)? as u32 as i32;
        let kind = MessageKind::try_from(reader.read_bits(2)? as u8)?;
        let update_kind = if reader.read_bool()? {
            UpdateKind::Event
        } else {
            UpdateKind::System
        };
        reader.skip_to_byte()?;
        let entry_count = reader.read_bits(16)? as u16;
        let payload_len = reader.read_bits(32)? as usize;
        let payload = reader.read_bytes(payload_len)?;

        Ok(Self {
            header: FrameHeader {
                packet_type,
                flags,
                salt,
                local_seq,
                remote_seq,
                ack_bits,
            },
            message: Message {
                id,
                frame_num,
                kind,
                update_kind,
                entry_count,
                payload,
            },
        })
    }
}

fn checksum(packet_type: u8, body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&PROTOCOL_VERSION.to_le_bytes());
    hasher.update(&[packet_type]);
    hasher.update(body);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_frame() -> Frame {
        let mut header = FrameHeader::new(PacketType::Data, 0x1234_ABCD);
        header.flags = FrameFlags::REQUEST_SNAPSHOT;
        header.local_seq = 77;
        header.remote_seq = u32::MAX;
        header.ack_bits = 0b1011;
        let message = Message::new(MessageKind::Snapshot, -5, 3, vec![1, 2, 3, 4, 5]);
        Frame::new(header, message)
    }

    #[test]
    fn frame_survives_encoding_in_both_orders() {
        let frame = data_frame();
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let bytes = frame.encode(order).unwrap();
            assert_eq!(Frame::decode(&bytes, order).unwrap(), frame);
        }
    }

    #[test]
    fn corrupted_byte_fails_crc() {
        let mut bytes = data_frame().encode(ByteOrder::Little).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        assert!(matches!(
            Frame::decode(&bytes, ByteOrder::Little),
            Err(FrameError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn tampered_packet_type_fails_crc() {
        let mut bytes = data_frame().encode(ByteOrder::Little).unwrap();
        bytes[0] = PacketType::Disconnect as u8;
        assert!(matches!(
            Frame::decode(&bytes, ByteOrder::Little),
            Err(FrameError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn truncated_datagram_is_rejected() {
        assert_eq!(
            Frame::decode(&[3, 0, 0], ByteOrder::Little),
            Err(FrameError::TooShort(3))
        );
    }

    #[test]
    fn message_ids_increase() {
        let a = next_message_id();
        let b = next_message_id();
        assert!(b > a);
        assert!(a > 0);
    }

    #[test]
    fn append_keeps_first_id_and_sums_entries() {
        let mut first = Message::new(MessageKind::Update, 10, 1, vec![0xAA])
            .with_update_kind(UpdateKind::Event);
        let first_id = first.id;
        let second = Message::new(MessageKind::Update, 11, 2, vec![0xBB, 0xCC])
            .with_update_kind(UpdateKind::Event);

        assert!(first.append(second));
        assert_eq!(first.id, first_id);
        assert_eq!(first.frame_num, 10);
        assert_eq!(first.entry_count, 3);
        assert_eq!(first.payload, vec![0xAA, 0xBB, 0xCC]);

        let snapshot = Message::new(MessageKind::Snapshot, 12, 1, vec![0]);
        assert!(!first.append(snapshot));
        assert_eq!(first.entry_count, 3);
    }

    #[test]
    fn append_into_empty_adopts_other() {
        let mut batch = Message::empty();
        let event = Message::new(MessageKind::Update, 4, 1, vec![9]);
        let id = event.id;
        assert!(batch.append(event));
        assert_eq!(batch.id, id);
        assert_eq!(batch.frame_num, 4);
    }
}
