use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Ring state behind a [`packet_buffer`] pair.
#[derive(Debug)]
struct PacketRing<T> {
    slots: VecDeque<T>,
    capacity: usize,
    jump: usize,
    overruns: u64,
}

impl<T> PacketRing<T> {
    fn put(&mut self, item: T) -> bool {
        let overran = self.slots.len() == self.capacity;
        if overran {
            // producer overtook the consumer: push the get cursor forward
            self.slots.pop_front();
            self.jump += 1;
            self.overruns += 1;
        }
        self.slots.push_back(item);
        overran
    }

    fn get(&mut self) -> Option<T> {
        if self.slots.is_empty() {
            return None;
        }
        let skip = self.jump.min(self.slots.len() - 1);
        self.slots.drain(..skip);
        let item = self.slots.pop_front();
        self.jump /= 2;
        item
    }
}

/// Producer side of either buffer kind, so socket code can feed both.
pub trait Sink<T> {
    /// Never blocks. Returns `true` if an unread item was lost to make room.
    fn push(&self, item: T) -> bool;
}

/// Creates a bounded packet buffer with adaptive skip-ahead.
///
/// When the producer overruns a full buffer the oldest packet is discarded
/// and `jump` grows by one. Each successful `get` then skips `jump` queued
/// packets (never the newest) before returning one, and halves `jump`.
pub fn packet_buffer<T>(capacity: usize) -> (PacketProducer<T>, PacketConsumer<T>) {
    let ring = Arc::new(Mutex::new(PacketRing {
        slots: VecDeque::with_capacity(capacity.max(1)),
        capacity: capacity.max(1),
        jump: 0,
        overruns: 0,
    }));
    (
        PacketProducer {
            ring: Arc::clone(&ring),
        },
        PacketConsumer { ring },
    )
}

#[derive(Debug)]
pub struct PacketProducer<T> {
    ring: Arc<Mutex<PacketRing<T>>>,
}

impl<T> Clone for PacketProducer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
}

impl<T> PacketProducer<T> {
    /// Never blocks. Returns `true` if an unread packet was overwritten.
    pub fn put(&self, item: T) -> bool {
        self.ring.lock().put(item)
    }
}

impl<T> Sink<T> for PacketProducer<T> {
    fn push(&self, item: T) -> bool {
        self.put(item)
    }
}

#[derive(Debug)]
pub struct PacketConsumer<T> {
    ring: Arc<Mutex<PacketRing<T>>>,
}

impl<T> PacketConsumer<T> {
    pub fn get(&self) -> Option<T> {
        self.ring.lock().get()
    }

    /// Drains with skip-ahead applied between items.
    pub fn drain(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.get() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.ring.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn jump(&self) -> usize {
        self.ring.lock().jump
    }

    pub fn overruns(&self) -> u64 {
        self.ring.lock().overruns
    }

    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.slots.clear();
        ring.jump = 0;
    }
}

#[derive(Debug)]
struct MessageRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// Creates a bounded FIFO mailbox. No skip-ahead: items come out in the
/// order they went in, and a full mailbox evicts its oldest item.
pub fn message_buffer<T>(capacity: usize) -> (MessageProducer<T>, MessageConsumer<T>) {
    let ring = Arc::new(Mutex::new(MessageRing {
        items: VecDeque::with_capacity(capacity.max(1)),
        capacity: capacity.max(1),
    }));
    (
        MessageProducer {
            ring: Arc::clone(&ring),
        },
        MessageConsumer { ring },
    )
}

#[derive(Debug)]
pub struct MessageProducer<T> {
    ring: Arc<Mutex<MessageRing<T>>>,
}

impl<T> Clone for MessageProducer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
}

impl<T> MessageProducer<T> {
    /// Returns the evicted item when the mailbox was full.
    pub fn put(&self, item: T) -> Option<T> {
        let mut ring = self.ring.lock();
        let evicted = if ring.items.len() == ring.capacity {
            ring.items.pop_front()
        } else {
            None
        };
        ring.items.push_back(item);
        evicted
    }
}

impl<T> Sink<T> for MessageProducer<T> {
    fn push(&self, item: T) -> bool {
        self.put(item).is_some()
    }
}

#[derive(Debug)]
pub struct MessageConsumer<T> {
    ring: Arc<Mutex<MessageRing<T>>>,
}

impl<T> Clone for MessageConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
}

impl<T> MessageConsumer<T> {
    pub fn get(&self) -> Option<T> {
        self.ring.lock().items.pop_front()
    }

    pub fn drain(&self) -> Vec<T> {
        self.ring.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Both halves of a [`message_buffer`] owned by one side, for mailboxes that
/// are filled and drained on the same thread.
#[derive(Debug)]
pub struct Mailbox<T> {
    producer: MessageProducer<T>,
    consumer: MessageConsumer<T>,
}

impl<T> Mailbox<T> {
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = message_buffer(capacity);
        Self { producer, consumer }
    }

    pub fn put(&self, item: T) -> Option<T> {
        self.producer.put(item)
    }

    pub fn get(&self) -> Option<T> {
        self.consumer.get()
    }

    pub fn drain(&self) -> Vec<T> {
        self.consumer.drain()
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_without_overrun() {
        let (tx, rx) = packet_buffer(8);
        for i in 0..5 {
            assert!(!tx.put(i));
        }
        assert_eq!(rx.drain(), vec![0, 1, 2, 3, 4]);
        assert_eq!(rx.jump(), 0);
    }

    #[test]
    fn overrun_skips_ahead() {
        let (tx, rx) = packet_buffer(8);
        let overruns = (1..=12).filter(|&i| tx.put(i)).count();
        assert_eq!(overruns, 4);
        assert_eq!(rx.jump(), 4);
        assert_eq!(rx.len(), 8);

        assert_eq!(rx.get(), Some(9));
        assert_eq!(rx.jump(), 2);
        assert_eq!(rx.get(), Some(12));
        assert_eq!(rx.get(), None);
        assert_eq!(rx.overruns(), 4);
    }

    #[test]
    fn newest_packet_is_never_skipped() {
        let (tx, rx) = packet_buffer(2);
        for i in 0..10 {
            tx.put(i);
        }
        assert_eq!(rx.get(), Some(9));
        assert!(rx.is_empty());
    }

    #[test]
    fn producer_on_another_thread() {
        let (tx, rx) = packet_buffer(64);
        let handle = std::thread::spawn(move || {
            for i in 0..32u32 {
                tx.put(i);
            }
        });
        handle.join().unwrap();
        assert_eq!(rx.drain().len(), 32);
    }

    #[test]
    fn mailbox_evicts_oldest() {
        let (tx, rx) = message_buffer(3);
        assert_eq!(tx.put('a'), None);
        tx.put('b');
        tx.put('c');
        assert_eq!(tx.put('d'), Some('a'));
        assert_eq!(rx.drain(), vec!['b', 'c', 'd']);
        assert!(rx.get().is_none());
    }
}
