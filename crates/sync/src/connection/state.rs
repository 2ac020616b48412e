use std::time::Duration;

use log::debug;
use rand::Rng;

use super::ConnectError;
use crate::config::NetConfig;
use crate::net::PacketType;

/// Handshake and session state of one peer, from either side.
///
/// The server owns the high 16 bits of a session salt (its challenge
/// fragment); the client fills the low 16 bits when answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    ServerEmpty,
    ServerPending { fragment: u16 },
    ServerConnected,
    ServerTimeoutPending,
    ClientEmpty,
    ClientPending1,
    ClientPending2,
    ClientConnected,
    ClientTimeoutPending,
}

impl ConnectionState {
    /// How long the state may go without qualifying traffic. Empty states
    /// never time out.
    pub fn timeout_threshold(&self, config: &NetConfig) -> Option<Duration> {
        match self {
            Self::ServerEmpty | Self::ClientEmpty => None,
            Self::ServerPending { .. } | Self::ClientPending1 | Self::ClientPending2 => {
                Some(config.pending_timeout())
            }
            Self::ServerConnected | Self::ClientConnected => Some(config.connected_timeout()),
            Self::ServerTimeoutPending | Self::ClientTimeoutPending => {
                Some(config.grace_timeout())
            }
        }
    }

    /// Whether inbound datagrams must carry the session salt. Before the
    /// salt exists only the handshake fragment is known.
    pub fn checks_salt(&self) -> bool {
        !matches!(
            self,
            Self::ServerEmpty | Self::ServerPending { .. } | Self::ClientEmpty | Self::ClientPending1
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::ServerConnected
                | Self::ServerTimeoutPending
                | Self::ClientConnected
                | Self::ClientTimeoutPending
        )
    }

    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            Self::ServerPending { .. } | Self::ClientPending1 | Self::ClientPending2
        )
    }

    /// Client states that keep re-sending until answered.
    pub fn resends(&self) -> bool {
        matches!(
            self,
            Self::ClientPending1 | Self::ClientPending2 | Self::ClientTimeoutPending
        )
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Self::ServerEmpty | Self::ClientEmpty)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ServerEmpty => "server-empty",
            Self::ServerPending { .. } => "server-pending",
            Self::ServerConnected => "server-connected",
            Self::ServerTimeoutPending => "server-timeout-pending",
            Self::ClientEmpty => "client-empty",
            Self::ClientPending1 => "client-pending-1",
            Self::ClientPending2 => "client-pending-2",
            Self::ClientConnected => "client-connected",
            Self::ClientTimeoutPending => "client-timeout-pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Client starts a handshake.
    Open,
    Received { packet_type: PacketType, salt: u32 },
    SnapshotApplied,
    TimedOut,
    /// Handshake resend interval elapsed.
    Resend,
    /// Local side closes the session.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Send { packet_type: PacketType, salt: u32 },
    AdoptSalt(u32),
    /// The datagram's message goes on to replication.
    AcceptData,
    PeerConnected,
    PeerDisconnected { clean: bool },
    Reconnected,
    /// Server: queue a snapshot for the peer. Client: ask the server for one.
    RequestSnapshot,
    PauseSimulation,
    ResumeSimulation,
    Reject(ConnectError),
    /// Return the slot to the pool.
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ConnectionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(state: ConnectionState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }

    fn to(state: ConnectionState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }

    /// Whether any traffic was accepted, which restarts the timeout clock.
    pub fn is_qualifying(&self) -> bool {
        self.effects.iter().any(|effect| {
            matches!(
                effect,
                Effect::AcceptData
                    | Effect::PeerConnected
                    | Effect::Reconnected
                    | Effect::AdoptSalt(_)
                    | Effect::ResumeSimulation
            )
        })
    }
}

/// The whole state machine. `salt` is the slot's current session salt.
pub fn step<R: Rng + ?Sized>(
    state: ConnectionState,
    salt: u32,
    event: StateEvent,
    rng: &mut R,
) -> Transition {
    use ConnectionState::*;
    use PacketType::*;

    if let StateEvent::Received { salt: received, .. } = event {
        if state.checks_salt() && received != salt {
            debug!(
                "Dropping datagram with salt {:#010x} in {} (expected {:#010x})",
                received,
                state.name(),
                salt
            );
            return Transition::stay(state);
        }
    }

    let send = |packet_type| Effect::Send { packet_type, salt };

    match (state, event) {
        (ServerEmpty, StateEvent::Received { packet_type: ConnectionRequest, .. }) => {
            let fragment: u16 = rng.r#gen();
            Transition::to(
                ServerPending { fragment },
                vec![Effect::Send {
                    packet_type: ConnectionChallenge,
                    salt: fragment as u32,
                }],
            )
        }
        (ServerPending { fragment }, StateEvent::Received { packet_type, salt: received }) => {
            match packet_type {
                ConnectionRequest => Transition::stay(state).with(Effect::Send {
                    packet_type: ConnectionChallenge,
                    salt: fragment as u32,
                }),
                ConnectionChallengeResponse if (received >> 16) as u16 == fragment => {
                    Transition::to(
                        ServerConnected,
                        vec![
                            Effect::AdoptSalt(received),
                            Effect::PeerConnected,
                            Effect::RequestSnapshot,
                        ],
                    )
                }
                ConnectionChallengeResponse => {
                    debug!(
                        "Challenge response {:#010x} does not match fragment {:#06x}",
                        received, fragment
                    );
                    Transition::to(
                        ServerEmpty,
                        vec![Effect::Reject(ConnectError::SaltMismatch), Effect::Release],
                    )
                }
                _ => Transition::stay(state),
            }
        }
        (ServerConnected, StateEvent::Received { packet_type, .. }) => match packet_type {
            Data => Transition::stay(state).with(Effect::AcceptData),
            Disconnect => disconnect(ServerEmpty, true),
            Reconnect => Transition::stay(state)
                .with(Effect::Reconnected)
                .with(Effect::RequestSnapshot),
            _ => Transition::stay(state),
        },
        (ServerTimeoutPending, StateEvent::Received { packet_type, .. }) => match packet_type {
            Data => Transition::to(ServerConnected, vec![Effect::AcceptData]),
            Reconnect => Transition::to(
                ServerConnected,
                vec![Effect::Reconnected, Effect::RequestSnapshot],
            ),
            Disconnect => disconnect(ServerEmpty, true),
            _ => Transition::stay(state),
        },
        (ServerPending { .. }, StateEvent::TimedOut) => {
            Transition::to(ServerEmpty, vec![Effect::Release])
        }
        (ServerConnected, StateEvent::TimedOut) => Transition::stay(ServerTimeoutPending),
        (ServerTimeoutPending, StateEvent::TimedOut) => disconnect(ServerEmpty, false),
        (ServerPending { .. }, StateEvent::Close) => {
            Transition::to(ServerEmpty, vec![Effect::Release])
        }
        (ServerConnected | ServerTimeoutPending, StateEvent::Close) => {
            let mut transition = disconnect(ServerEmpty, true);
            transition.effects.insert(0, send(Disconnect));
            transition
        }

        (ClientEmpty, StateEvent::Open) => Transition::to(
            ClientPending1,
            vec![Effect::Send {
                packet_type: ConnectionRequest,
                salt: 0,
            }],
        ),
        (ClientPending1, StateEvent::Received { packet_type: ConnectionChallenge, salt: fragment }) => {
            let client_fragment: u16 = rng.r#gen();
            let session = (fragment << 16) | client_fragment as u32;
            Transition::to(
                ClientPending2,
                vec![
                    Effect::AdoptSalt(session),
                    Effect::Send {
                        packet_type: ConnectionChallengeResponse,
                        salt: session,
                    },
                ],
            )
        }
        (ClientPending1, StateEvent::Resend) => Transition::stay(state).with(Effect::Send {
            packet_type: ConnectionRequest,
            salt: 0,
        }),
        (ClientPending2, StateEvent::Received { packet_type, .. }) => match packet_type {
            Data => Transition::to(
                ClientConnected,
                vec![Effect::PeerConnected, Effect::AcceptData],
            ),
            Disconnect => disconnect(ClientEmpty, true),
            _ => Transition::stay(state),
        },
        (ClientPending2, StateEvent::Resend) => {
            Transition::stay(state).with(send(ConnectionChallengeResponse))
        }
        (ClientConnected | ClientTimeoutPending, StateEvent::Received { packet_type, .. }) => {
            match packet_type {
                Data => Transition::stay(state).with(Effect::AcceptData),
                Disconnect => disconnect(ClientEmpty, true),
                _ => Transition::stay(state),
            }
        }
        (ClientConnected, StateEvent::TimedOut) => Transition::to(
            ClientTimeoutPending,
            vec![
                Effect::PauseSimulation,
                Effect::RequestSnapshot,
                send(Reconnect),
            ],
        ),
        (ClientTimeoutPending, StateEvent::SnapshotApplied) => {
            Transition::to(ClientConnected, vec![Effect::ResumeSimulation])
        }
        (ClientTimeoutPending, StateEvent::Resend) => Transition::stay(state).with(send(Reconnect)),
        (ClientPending1 | ClientPending2 | ClientTimeoutPending, StateEvent::TimedOut) => {
            disconnect(ClientEmpty, false)
        }
        (ClientPending1, StateEvent::Close) => {
            Transition::to(ClientEmpty, vec![Effect::Release])
        }
        (ClientPending2 | ClientConnected | ClientTimeoutPending, StateEvent::Close) => {
            let mut transition = disconnect(ClientEmpty, true);
            transition.effects.insert(0, send(Disconnect));
            transition
        }

        _ => Transition::stay(state),
    }
}

fn disconnect(state: ConnectionState, clean: bool) -> Transition {
    Transition::to(
        state,
        vec![Effect::PeerDisconnected { clean }, Effect::Release],
    )
}

impl Transition {
    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}
