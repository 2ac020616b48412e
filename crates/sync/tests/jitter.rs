use std::thread;

use tidewire::net::{message_buffer, packet_buffer};

#[test]
fn overrun_skips_ahead_to_recent_packets() {
    let (producer, consumer) = packet_buffer::<u32>(8);
    let writer = thread::spawn(move || {
        for value in 0..12 {
            producer.put(value);
        }
    });
    writer.join().unwrap();

    assert_eq!(consumer.len(), 8);
    assert_eq!(consumer.overruns(), 4);
    assert_eq!(consumer.jump(), 4);

    // skips four, then two, halving each time
    assert_eq!(consumer.get(), Some(8));
    assert_eq!(consumer.jump(), 2);
    assert_eq!(consumer.get(), Some(11));
    assert_eq!(consumer.get(), None);
    assert_eq!(consumer.jump(), 1);
}

#[test]
fn concurrent_reader_sees_increasing_values_and_the_last_one() {
    let (producer, consumer) = packet_buffer::<u32>(8);
    let writer = thread::spawn(move || {
        for value in 0..10_000 {
            producer.put(value);
        }
    });

    let mut seen = Vec::new();
    while !writer.is_finished() {
        if let Some(value) = consumer.get() {
            seen.push(value);
        }
    }
    writer.join().unwrap();
    seen.extend(consumer.drain());

    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(seen.last(), Some(&9_999));
}

#[test]
fn message_buffer_preserves_order_across_threads() {
    let (producer, consumer) = message_buffer::<u32>(64);
    let writers: Vec<_> = (0..4)
        .map(|lane| {
            let producer = producer.clone();
            thread::spawn(move || {
                for value in 0..10 {
                    producer.put(lane * 100 + value);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let items = consumer.drain();
    assert_eq!(items.len(), 40);
    for lane in 0..4 {
        let ordered: Vec<u32> = items.iter().copied().filter(|v| v / 100 == lane).collect();
        assert_eq!(ordered, (0..10).map(|v| lane * 100 + v).collect::<Vec<_>>());
    }
}

#[test]
fn full_message_buffer_evicts_oldest() {
    let (producer, consumer) = message_buffer::<&str>(2);
    assert_eq!(producer.put("a"), None);
    assert_eq!(producer.put("b"), None);
    assert_eq!(producer.put("c"), Some("a"));
    assert_eq!(consumer.drain(), vec!["b", "c"]);
}
