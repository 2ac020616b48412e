use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use tidewire::{
    Client, EntityKind, NetConfig, ReplicatedWorld, Server, ServerEvent, SimWorld, UdpEndpoint,
};

#[test]
fn client_connects_and_replicates_over_real_sockets() {
    let config = NetConfig::default();
    let dt = config.tick_duration();

    let mut server_socket = UdpEndpoint::bind("127.0.0.1:0").unwrap();
    let mut client_socket = UdpEndpoint::bind("127.0.0.1:0").unwrap();

    let mut server = Server::with_seed(config.clone(), 1).unwrap();
    let mut client = Client::with_seed(config, server_socket.local_addr(), 2).unwrap();
    let mut server_world = SimWorld::new();
    let mut client_world = SimWorld::new();
    let prop = server_world.spawn(EntityKind::DynamicProp, Vec3::new(4.0, 0.0, -2.0));

    let server_inbox = server.inbox();
    let client_inbox = client.inbox();
    let mut connected_events = 0;

    client.connect();
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        for datagram in client.drain_outgoing() {
            client_socket.send(&datagram).unwrap();
        }
        server_socket.receive_into(&server_inbox).unwrap();

        server.update(dt, &mut server_world);
        connected_events += server
            .drain_events()
            .filter(|event| matches!(event, ServerEvent::ClientConnected { .. }))
            .count();
        server_world.step(dt.as_secs_f32());
        server.update2(&mut server_world);
        for datagram in server.drain_outgoing() {
            server_socket.send(&datagram).unwrap();
        }

        client_socket.receive_into(&client_inbox).unwrap();
        client.update(dt, &mut client_world);
        client.drain_events().for_each(drop);
        client.update2(&mut client_world, &[]);

        if client.is_connected() && client_world.read_entity(prop).is_some() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert!(client.is_connected(), "no connection within two seconds");
    assert_eq!(connected_events, 1);
    assert_eq!(server.connected_count(), 1);
    assert_eq!(
        client_world.read_entity(prop).map(|e| e.kind),
        Some(EntityKind::DynamicProp)
    );
    assert_eq!(
        server.slot(0).and_then(|slot| slot.addr),
        Some(client_socket.local_addr())
    );
    assert!(server_socket.stats().packets_received > 0);
}
