use crate::bits::{CodecError, ReadStream, Stream, WriteStream};
use crate::replicated;
use crate::sync::{FieldRange, ProtocolError, Replicated};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReliabilityMode {
    Unreliable,
    UnreliableExpiring { ttl_ms: u64 },
    Reliable,
}

impl ReliabilityMode {
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Reliable)
    }

    pub fn ttl_ms(&self) -> Option<u64> {
        match self {
            Self::UnreliableExpiring { ttl_ms } => Some(*ttl_ms),
            _ => None,
        }
    }
}

const PLAYER_ID: FieldRange = FieldRange::int(0, u16::MAX as i64);
const TEAM: FieldRange = FieldRange::int(0, 3);

replicated! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PlayerJoined {
        pub player_id: u16 => PLAYER_ID,
        pub team: u8 => TEAM,
    }
}

replicated! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PlayerLeft {
        pub player_id: u16 => PLAYER_ID,
        pub clean: bool => FieldRange::Bool,
    }
}

replicated! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ScoreChanged {
        pub player_id: u16 => PLAYER_ID,
        pub score: i32 => FieldRange::int(-9_999, 99_999),
    }
}

replicated! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PlayerDied {
        pub victim_id: u16 => PLAYER_ID,
        pub killer_id: u16 => PLAYER_ID,
        pub weapon: u8 => FieldRange::int(0, 15),
    }
}

replicated! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TeamAssigned {
        pub player_id: u16 => PLAYER_ID,
        pub team: u8 => TEAM,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    PlayerJoined(PlayerJoined),
    PlayerLeft(PlayerLeft),
    ScoreChanged(ScoreChanged),
    PlayerDied(PlayerDied),
    TeamAssigned(TeamAssigned),
}

/// Wire registry: the position of a name is the event's type index.
pub const EVENT_REGISTRY: &[&str] = &[
    "player_joined",
    "player_left",
    "score_changed",
    "player_died",
    "team_assigned",
];

const TYPE_INDEX_BITS: u32 = 8;

impl GameEvent {
    pub fn type_index(&self) -> u32 {
        match self {
            Self::PlayerJoined(_) => 0,
            Self::PlayerLeft(_) => 1,
            Self::ScoreChanged(_) => 2,
            Self::PlayerDied(_) => 3,
            Self::TeamAssigned(_) => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        EVENT_REGISTRY[self.type_index() as usize]
    }

    pub fn reliability(&self) -> ReliabilityMode {
        match self {
            Self::PlayerJoined(_) => ReliabilityMode::Reliable,
            Self::PlayerLeft(_) => ReliabilityMode::Reliable,
            Self::ScoreChanged(_) => ReliabilityMode::Reliable,
            Self::TeamAssigned(_) => ReliabilityMode::Reliable,

            Self::PlayerDied(_) => ReliabilityMode::UnreliableExpiring { ttl_ms: 5_000 },
        }
    }

    pub fn write(&self, stream: &mut WriteStream) -> Result<(), CodecError> {
        let mut index = self.type_index() as u64;
        stream.serialize_bits(&mut index, TYPE_INDEX_BITS)?;
        let mut event = *self;
        event.serialize_payload(stream)
    }

    pub fn read(stream: &mut ReadStream<'_>) -> Result<Self, ProtocolError> {
        let mut index = 0u64;
        stream.serialize_bits(&mut index, TYPE_INDEX_BITS)?;
        let mut event = match index {
            0 => Self::PlayerJoined(PlayerJoined::default()),
            1 => Self::PlayerLeft(PlayerLeft::default()),
            2 => Self::ScoreChanged(ScoreChanged::default()),
            3 => Self::PlayerDied(PlayerDied::default()),
            4 => Self::TeamAssigned(TeamAssigned::default()),
            other => return Err(ProtocolError::UnknownEventType(other as u32)),
        };
        event.serialize_payload(stream)?;
        Ok(event)
    }

    fn serialize_payload<S: Stream>(&mut self, stream: &mut S) -> Result<(), CodecError> {
        match self {
            Self::PlayerJoined(e) => e.serialize(stream),
            Self::PlayerLeft(e) => e.serialize(stream),
            Self::ScoreChanged(e) => e.serialize(stream),
            Self::PlayerDied(e) => e.serialize(stream),
            Self::TeamAssigned(e) => e.serialize(stream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitReader;

    #[test]
    fn registry_matches_type_indices() {
        let event = GameEvent::ScoreChanged(ScoreChanged {
            player_id: 3,
            score: 10,
        });
        assert_eq!(event.name(), "score_changed");
        assert_eq!(EVENT_REGISTRY.len(), 5);
    }

    #[test]
    fn event_decodes_through_registry() {
        let event = GameEvent::PlayerDied(PlayerDied {
            victim_id: 7,
            killer_id: 2,
            weapon: 3,
        });
        let mut out = WriteStream::default();
        event.write(&mut out).unwrap();
        let bytes = out.finish();

        let decoded = GameEvent::read(&mut ReadStream::new(BitReader::new(&bytes))).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn unknown_type_index_is_a_protocol_error() {
        let bytes = [200u8, 0, 0, 0];
        let err = GameEvent::read(&mut ReadStream::new(BitReader::new(&bytes))).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEventType(200)));
    }

    #[test]
    fn death_is_not_reliable() {
        let event = GameEvent::PlayerDied(PlayerDied::default());
        assert_eq!(event.reliability().ttl_ms(), Some(5_000));
        assert!(!event.reliability().is_reliable());
    }
}
