mod common;

use glam::Vec3;
use tidewire::{EntityKind, NetConfig, ReplicatedWorld};

use common::{Harness, client_addr, server_addr};

#[test]
fn entity_spawned_after_connect_reaches_client() {
    let mut harness = Harness::new(NetConfig::default(), 1);
    harness.connect_all();

    harness
        .world
        .spawn_with_id(42, EntityKind::Projectile, Vec3::new(1.0, 2.0, 3.0));

    // the first update names an unknown entity, which asks for a snapshot
    let ticks = harness.run_until(30, |h| h.peers[0].world.get(42).is_some());
    assert!(ticks.is_some(), "entity 42 never replicated");

    let replica = harness.peers[0].world.get(42).unwrap();
    assert_eq!(replica.kind, EntityKind::Projectile);
    assert!((replica.transform.position - Vec3::new(1.0, 2.0, 3.0)).length() < 0.02);
}

#[test]
fn despawned_entity_disappears_on_client() {
    let mut harness = Harness::new(NetConfig::default(), 1);
    harness.world.spawn(EntityKind::Item, Vec3::ZERO);
    let doomed = harness.world.spawn(EntityKind::Item, Vec3::X);
    harness.connect_all();
    harness.run(2);
    assert!(harness.peers[0].world.get(doomed).is_some());

    harness.world.despawn(doomed);
    let ticks = harness.run_until(10, |h| h.peers[0].world.get(doomed).is_none());
    assert!(ticks.is_some());
    assert_eq!(harness.peers[0].world.entity_count(), 1);
}

#[test]
fn lost_initial_snapshot_is_recovered() {
    let mut harness = Harness::new(NetConfig::default(), 1);
    for index in 0..5 {
        harness
            .world
            .spawn(EntityKind::DynamicProp, Vec3::new(index as f32, 0.0, 0.0));
    }

    let peer = client_addr(0);
    harness.peers[0].client.connect();
    for datagram in harness.peers[0].client.drain_outgoing() {
        harness.link.send(peer, server_addr(), datagram.bytes);
    }
    // challenge goes out and is answered within the first tick
    harness.step();
    assert!(!harness.peers[0].client.is_connected());

    // the next datagram to the client is the snapshot; lose it
    harness.link.drop_next(peer, 1);
    let ticks = harness.run_until(60, |h| h.peers[0].world.entity_count() == 5);
    assert!(ticks.is_some(), "client never caught up");
    assert!(harness.peers[0].client.is_connected());
    assert_eq!(harness.link.dropped(), 1);

    for id in harness.world.entity_ids() {
        assert_eq!(
            harness.peers[0].world.get(id).map(|e| e.kind),
            Some(EntityKind::DynamicProp)
        );
    }
}
