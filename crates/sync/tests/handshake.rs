mod common;

use rand::RngCore;
use tidewire::connection::{Effect, StateEvent};
use tidewire::{
    ClientEvent, ConnectionManager, ConnectionSlot, ConnectionState, DisconnectReason, Frame,
    NetConfig, PacketType, ServerEvent,
};

use common::{Harness, client_addr, server_addr};

/// Hands out the same value forever, so challenge fragments are predictable.
struct FixedRng(u32);

impl RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        self.0
    }

    fn next_u64(&mut self) -> u64 {
        self.0 as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(self.0 as u8);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

fn wire(frame: &Frame, config: &NetConfig) -> Frame {
    let bytes = frame.encode(config.byte_order).unwrap();
    Frame::decode(&bytes, config.byte_order).unwrap()
}

fn received(frame: &Frame) -> StateEvent {
    StateEvent::Received {
        packet_type: frame.header.packet_type,
        salt: frame.header.salt,
    }
}

fn sent(effects: &[Effect]) -> Frame {
    effects
        .iter()
        .find_map(|effect| match *effect {
            Effect::Send { packet_type, salt } => Some(Frame::handshake(packet_type, salt)),
            _ => None,
        })
        .expect("no datagram sent")
}

#[test]
fn challenge_response_negotiates_salt() {
    let config = NetConfig::default();
    let mut server_rng = FixedRng(0x1234);
    let mut client_rng = FixedRng(0xABCD);

    let mut manager = ConnectionManager::new(&config);
    let mut client = ConnectionSlot::new(0, ConnectionState::ClientEmpty, &config);

    let request = wire(&sent(&client.handle(StateEvent::Open, &mut client_rng)), &config);
    assert_eq!(request.header.packet_type, PacketType::ConnectionRequest);

    let client_id = manager
        .route(client_addr(0), &request.header)
        .unwrap()
        .unwrap();
    let slot = manager.get_mut(client_id).unwrap();
    let challenge = wire(&sent(&slot.handle(received(&request), &mut server_rng)), &config);
    assert_eq!(challenge.header.packet_type, PacketType::ConnectionChallenge);
    assert_eq!(challenge.header.salt, 0x1234);

    let response = wire(
        &sent(&client.handle(received(&challenge), &mut client_rng)),
        &config,
    );
    assert_eq!(response.header.packet_type, PacketType::ConnectionChallengeResponse);
    assert_eq!(response.header.salt, 0x1234_ABCD);
    assert_eq!(client.state, ConnectionState::ClientPending2);

    let slot = manager.get_mut(client_id).unwrap();
    let effects = slot.handle(received(&response), &mut server_rng);
    assert_eq!(slot.state, ConnectionState::ServerConnected);
    assert!(effects.contains(&Effect::PeerConnected));
    assert_eq!(slot.client_id, 0);
    assert_eq!(slot.salt, 0x1234_ABCD);
    assert_eq!(manager.find_by_salt(0x1234_ABCD), Some(0));
}

#[test]
fn server_and_client_connect_over_link() {
    let mut harness = Harness::new(NetConfig::default(), 2);
    harness.connect_all();

    let connected: Vec<u32> = harness
        .server_events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::ClientConnected { client_id, .. } => Some(*client_id),
            _ => None,
        })
        .collect();
    assert_eq!(connected, vec![0, 1]);

    for (index, peer) in harness.peers.iter().enumerate() {
        let slot = harness.server.slot(index as u32).unwrap();
        assert_eq!(slot.salt, peer.client.salt());
        assert_eq!(slot.addr, Some(peer.addr));
        assert_eq!(peer.events, vec![ClientEvent::Connected]);
    }
    assert_ne!(harness.peers[0].client.salt(), harness.peers[1].client.salt());
}

#[test]
fn lost_challenge_is_resent() {
    let mut harness = Harness::new(NetConfig::default(), 1);
    let peer = client_addr(0);
    harness.link.drop_next(peer, 1);

    harness.peers[0].client.connect();
    for datagram in harness.peers[0].client.drain_outgoing() {
        harness.link.send(peer, server_addr(), datagram.bytes);
    }

    // the client re-sends its request every 250ms until a challenge lands
    let ticks = harness.run_until(120, |h| h.peers[0].client.is_connected());
    assert!(ticks.is_some());
    assert!(harness.link.dropped() >= 1);
}

#[test]
fn graceful_disconnect_frees_the_slot() {
    let mut harness = Harness::new(NetConfig::default(), 1);
    harness.connect_all();

    harness.peers[0].client.disconnect();
    for datagram in harness.peers[0].client.drain_outgoing() {
        harness.link.send(client_addr(0), datagram.addr, datagram.bytes);
    }
    harness.run(2);

    assert!(harness.server_events.iter().any(|event| matches!(
        event,
        ServerEvent::ClientDisconnected {
            client_id: 0,
            reason: DisconnectReason::Graceful,
        }
    )));
    assert_eq!(harness.server.connections().active_count(), 0);
    assert_eq!(
        harness.peers[0].events.last(),
        Some(&ClientEvent::Disconnected { clean: true })
    );
    assert_eq!(harness.peers[0].client.state(), ConnectionState::ClientEmpty);
}
