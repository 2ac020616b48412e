mod common;

use std::net::SocketAddr;

use glam::Vec3;
use tidewire::{
    ClientEvent, ConnectError, ConnectionState, EntityKind, Frame, NetConfig, PacketType,
    ServerEvent,
};

use common::{Harness, server_addr};

fn roamed_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 2, 7], port))
}

fn quick_timeouts() -> NetConfig {
    NetConfig {
        connected_timeout_ms: 200,
        ..Default::default()
    }
}

#[test]
fn client_moving_address_resumes_its_session() {
    let mut harness = Harness::new(quick_timeouts(), 1);
    harness.world.spawn(EntityKind::DynamicProp, Vec3::ZERO);
    harness.connect_all();
    harness.run(3);
    let salt = harness.peers[0].client.salt();
    harness.peers[0].events.clear();

    // NAT rebinding: traffic now leaves from a new port and the server's
    // datagrams to the old one go nowhere
    let moved = roamed_addr(61000);
    harness.peers[0].addr = moved;

    let paused = harness.run_until(60, |h| h.peers[0].client.is_simulation_paused());
    assert!(paused.is_some(), "client never noticed the silence");
    assert_eq!(harness.peers[0].client.state(), ConnectionState::ClientTimeoutPending);

    let resumed = harness.run_until(60, |h| !h.peers[0].client.is_simulation_paused());
    assert!(resumed.is_some(), "session never resumed");
    assert_eq!(harness.peers[0].client.state(), ConnectionState::ClientConnected);
    assert_eq!(harness.peers[0].client.salt(), salt);
    assert_eq!(
        harness.peers[0].events,
        vec![ClientEvent::SimulationPaused, ClientEvent::SimulationResumed]
    );

    assert!(harness.server_events.iter().any(|event| matches!(
        event,
        ServerEvent::Reconnected { client_id: 0, addr } if *addr == moved
    )));
    let slot = harness.server.slot(0).unwrap();
    assert_eq!(slot.addr, Some(moved));
    assert!(slot.state.is_connected());
    assert_eq!(harness.server.connections().find_by_addr(&moved), Some(0));
}

#[test]
fn rapid_reconnects_are_rate_limited() {
    let mut harness = Harness::new(NetConfig::default(), 1);
    harness.connect_all();
    let salt = harness.peers[0].client.salt();
    let order = NetConfig::default().byte_order;

    let first = roamed_addr(62000);
    let second = roamed_addr(62001);
    for from in [first, second] {
        let bytes = Frame::handshake(PacketType::Reconnect, salt)
            .encode(order)
            .unwrap();
        harness.link.send(from, server_addr(), bytes);
    }
    harness.step();

    assert_eq!(harness.server.slot(0).unwrap().addr, Some(first));
    assert!(harness.server_events.iter().any(|event| matches!(
        event,
        ServerEvent::ConnectionRejected {
            addr,
            reason: ConnectError::ReconnectTooSoon,
        } if *addr == second
    )));
}

#[test]
fn reconnect_with_unknown_salt_is_rejected() {
    let mut harness = Harness::new(NetConfig::default(), 1);
    harness.connect_all();
    let bogus = harness.peers[0].client.salt() ^ 0xFFFF;

    let from = roamed_addr(62002);
    let bytes = Frame::handshake(PacketType::Reconnect, bogus)
        .encode(NetConfig::default().byte_order)
        .unwrap();
    harness.link.send(from, server_addr(), bytes);
    harness.step();

    assert!(harness.server_events.iter().any(|event| matches!(
        event,
        ServerEvent::ConnectionRejected {
            reason: ConnectError::UnknownSession,
            ..
        }
    )));
    assert_eq!(harness.server.slot(0).unwrap().addr, Some(common::client_addr(0)));
}
