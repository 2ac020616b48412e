mod manager;
mod slot;
mod state;

pub use manager::ConnectionManager;
pub use slot::ConnectionSlot;
pub use state::{ConnectionState, Effect, StateEvent, Transition, step};

/// Session-level rejections. Existing sessions are never affected by one.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    #[error("no free connection slot")]
    ServerFull,
    #[error("challenge response does not match the issued salt")]
    SaltMismatch,
    #[error("reconnect attempted before the minimum interval elapsed")]
    ReconnectTooSoon,
    #[error("no session with that salt")]
    UnknownSession,
}
