mod queue;
mod types;

pub use queue::{EventQueue, PendingEvent};
pub use types::{
    EVENT_REGISTRY, GameEvent, PlayerDied, PlayerJoined, PlayerLeft, ReliabilityMode,
    ScoreChanged, TeamAssigned,
};
