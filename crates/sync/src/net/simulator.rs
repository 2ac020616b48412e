use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::endpoint::Datagram;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkConditions {
    pub loss_percent: f32,
    pub latency_ticks: u64,
    pub jitter_ticks: u64,
}

#[derive(Debug)]
struct DelayedDatagram {
    release_tick: u64,
    order: u64,
    from: SocketAddr,
    to: SocketAddr,
    bytes: Vec<u8>,
}

impl PartialEq for DelayedDatagram {
    fn eq(&self, other: &Self) -> bool {
        self.release_tick == other.release_tick && self.order == other.order
    }
}

impl Eq for DelayedDatagram {}

impl PartialOrd for DelayedDatagram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedDatagram {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_tick
            .cmp(&self.release_tick)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// In-memory lossy link between endpoints, advanced in simulation ticks.
///
/// Conditions are keyed by destination address. Latency jitter can reorder
/// datagrams; scripted drops discard the next N datagrams to an address
/// regardless of the loss rate.
#[derive(Debug)]
pub struct LinkSimulator {
    conditions: HashMap<SocketAddr, LinkConditions>,
    scripted_drops: HashMap<SocketAddr, u32>,
    queue: BinaryHeap<DelayedDatagram>,
    tick: u64,
    order: u64,
    dropped: u64,
    rng: StdRng,
}

impl LinkSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            conditions: HashMap::new(),
            scripted_drops: HashMap::new(),
            queue: BinaryHeap::new(),
            tick: 0,
            order: 0,
            dropped: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn set_conditions(&mut self, to: SocketAddr, conditions: LinkConditions) {
        self.conditions.insert(to, conditions);
    }

    pub fn drop_next(&mut self, to: SocketAddr, count: u32) {
        *self.scripted_drops.entry(to).or_default() += count;
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub fn send(&mut self, from: SocketAddr, to: SocketAddr, bytes: Vec<u8>) {
        if let Some(remaining) = self.scripted_drops.get_mut(&to).filter(|n| **n > 0) {
            *remaining -= 1;
            self.dropped += 1;
            return;
        }

        let conditions = self.conditions.get(&to).copied().unwrap_or_default();
        if conditions.loss_percent > 0.0 && self.rng.gen_range(0.0..100.0) < conditions.loss_percent
        {
            self.dropped += 1;
            return;
        }

        let jitter = if conditions.jitter_ticks > 0 {
            self.rng.gen_range(0..=conditions.jitter_ticks)
        } else {
            0
        };

        self.order += 1;
        self.queue.push(DelayedDatagram {
            release_tick: self.tick + conditions.latency_ticks + jitter,
            order: self.order,
            from,
            to,
            bytes,
        });
    }

    pub fn advance(&mut self) {
        self.tick += 1;
    }

    /// Releases every datagram addressed to `to` whose delivery tick has come.
    pub fn deliver(&mut self, to: SocketAddr) -> Vec<Datagram> {
        let mut ready = Vec::new();
        let mut held = Vec::new();
        while let Some(delayed) = self.queue.peek() {
            if delayed.release_tick > self.tick {
                break;
            }
            let Some(delayed) = self.queue.pop() else {
                break;
            };
            if delayed.to == to {
                ready.push(Datagram::new(delayed.from, delayed.bytes));
            } else {
                held.push(delayed);
            }
        }
        self.queue.extend(held);
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn latency_holds_datagrams() {
        let mut link = LinkSimulator::new(1);
        link.set_conditions(
            addr(2),
            LinkConditions {
                latency_ticks: 2,
                ..Default::default()
            },
        );
        link.send(addr(1), addr(2), vec![7]);
        assert!(link.deliver(addr(2)).is_empty());
        link.advance();
        assert!(link.deliver(addr(2)).is_empty());
        link.advance();
        assert_eq!(link.deliver(addr(2)), vec![Datagram::new(addr(1), vec![7])]);
    }

    #[test]
    fn deliver_only_takes_own_datagrams() {
        let mut link = LinkSimulator::new(1);
        link.send(addr(1), addr(2), vec![1]);
        link.send(addr(2), addr(1), vec![2]);
        assert_eq!(link.deliver(addr(2)).len(), 1);
        assert_eq!(link.in_flight(), 1);
        assert_eq!(link.deliver(addr(1))[0].bytes, vec![2]);
    }

    #[test]
    fn scripted_drops_then_passes() {
        let mut link = LinkSimulator::new(1);
        link.drop_next(addr(2), 2);
        for i in 0..3u8 {
            link.send(addr(1), addr(2), vec![i]);
        }
        let got = link.deliver(addr(2));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].bytes, vec![2]);
        assert_eq!(link.dropped(), 2);
    }

    #[test]
    fn total_loss_drops_everything() {
        let mut link = LinkSimulator::new(7);
        link.set_conditions(
            addr(2),
            LinkConditions {
                loss_percent: 100.0,
                ..Default::default()
            },
        );
        for _ in 0..20 {
            link.send(addr(1), addr(2), vec![0]);
        }
        assert!(link.deliver(addr(2)).is_empty());
        assert_eq!(link.dropped(), 20);
    }
}
