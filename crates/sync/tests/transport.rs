use tidewire::net::{Delivery, DroppedPacket, Transport};
use tidewire::{FrameFlags, FrameHeader, PacketType};

const SKIPPED: u32 = 4;

fn send(transport: &mut Transport, message_id: i64) -> FrameHeader {
    let mut header = FrameHeader::new(PacketType::Data, 0x0102_0304);
    transport.set_headers(&mut header, message_id);
    header
}

#[test]
fn unacknowledged_packet_is_reported_once_its_slot_is_reused() {
    let mut sender = Transport::new(128, 32);
    let mut receiver = Transport::new(128, 32);

    for index in 0..10 {
        let header = send(&mut sender, 100 + index as i64);
        assert_eq!(header.local_seq, index);
        if index != SKIPPED {
            assert_eq!(receiver.update_received(&header), Delivery::Deliver);
        }
    }

    let reply = send(&mut receiver, 1);
    assert!(reply.flags.contains(FrameFlags::HAS_ACKS));
    assert_eq!(reply.remote_seq, 9);
    assert_eq!(sender.update_received(&reply), Delivery::Deliver);
    assert!(sender.was_acked(9));
    assert!(!sender.was_acked(SKIPPED));

    let mut acked = sender.take_acked_messages();
    acked.sort_unstable();
    let expected: Vec<i64> = (0..10)
        .filter(|&index| index != SKIPPED)
        .map(|index| 100 + index as i64)
        .collect();
    assert_eq!(acked, expected);
    assert!(sender.take_dropped().is_empty());

    for index in 0..32 {
        send(&mut sender, 200 + index);
    }
    assert_eq!(
        sender.take_dropped(),
        vec![DroppedPacket {
            sequence: SKIPPED,
            message_id: 100 + SKIPPED as i64,
        }]
    );
    assert_eq!(sender.stats().packets_dropped, 1);
}

#[test]
fn repeated_and_older_datagrams_are_not_delivered() {
    let mut sender = Transport::new(128, 32);
    let mut receiver = Transport::new(128, 32);

    let first = send(&mut sender, 1);
    let second = send(&mut sender, 2);

    assert_eq!(receiver.update_received(&second), Delivery::Deliver);
    assert_eq!(receiver.update_received(&second), Delivery::Duplicate);
    assert_eq!(receiver.update_received(&first), Delivery::Stale);

    let stats = receiver.stats();
    assert_eq!(stats.packets_received, 1);
    assert_eq!(stats.packets_discarded, 2);
}

#[test]
fn resend_flag_keeps_the_original_sequence() {
    let mut sender = Transport::new(128, 32);
    let mut header = send(&mut sender, 7);
    header.flags.insert(FrameFlags::RESEND);
    sender.set_headers(&mut header, 7);

    assert_eq!(header.local_seq, 0);
    assert_eq!(sender.next_local_seq(), 1);
    assert!(sender.take_dropped().is_empty());
}
