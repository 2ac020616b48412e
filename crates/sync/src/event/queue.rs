use std::collections::VecDeque;

use super::types::{GameEvent, ReliabilityMode};

#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub timestamp_ms: u64,
    pub event: GameEvent,
    pub sequence: u32,
    /// Message the event last travelled in, if it is still unacknowledged.
    pub in_flight: Option<i64>,
}

impl PendingEvent {
    pub fn is_expired(&self, current_time_ms: u64) -> bool {
        match self.event.reliability() {
            ReliabilityMode::UnreliableExpiring { ttl_ms } => {
                current_time_ms.saturating_sub(self.timestamp_ms) > ttl_ms
            }
            ReliabilityMode::Unreliable => false,
            ReliabilityMode::Reliable => false,
        }
    }
}

/// Outbound events for one peer.
///
/// Reliable events stay queued until the message carrying them is
/// acknowledged; a dropped message puts them back up for sending. Other
/// events leave the queue as soon as they are sent.
#[derive(Debug)]
pub struct EventQueue {
    pending: VecDeque<PendingEvent>,
    next_sequence: u32,
    max_pending: usize,
}

impl EventQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            next_sequence: 0,
            max_pending,
        }
    }

    pub fn push(&mut self, timestamp_ms: u64, event: GameEvent) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        if self.pending.len() >= self.max_pending {
            self.evict_oldest_unreliable();
        }

        self.pending.push_back(PendingEvent {
            timestamp_ms,
            event,
            sequence,
            in_flight: None,
        });

        sequence
    }

    /// Events waiting for a message, oldest first.
    pub fn pending_for_send(&self) -> impl Iterator<Item = &PendingEvent> {
        self.pending.iter().filter(|e| e.in_flight.is_none())
    }

    /// Up to `max` unsent events with their queue sequence numbers.
    pub fn next_batch(&self, max: usize) -> (Vec<u32>, Vec<GameEvent>) {
        self.pending_for_send()
            .take(max)
            .map(|e| (e.sequence, e.event))
            .unzip()
    }

    /// Records that the given events were packed into `message_id`.
    pub fn mark_sent(&mut self, sequences: &[u32], message_id: i64) {
        self.pending.retain_mut(|e| {
            if !sequences.contains(&e.sequence) {
                return true;
            }
            if e.event.reliability().is_reliable() {
                e.in_flight = Some(message_id);
                true
            } else {
                false
            }
        });
    }

    pub fn ack_message(&mut self, message_id: i64) {
        self.pending.retain(|e| e.in_flight != Some(message_id));
    }

    /// Returns how many events were requeued.
    pub fn message_dropped(&mut self, message_id: i64) -> usize {
        let mut requeued = 0;
        for event in &mut self.pending {
            if event.in_flight == Some(message_id) {
                event.in_flight = None;
                requeued += 1;
            }
        }
        requeued
    }

    pub fn cleanup(&mut self, current_time_ms: u64) {
        self.pending
            .retain(|e| e.in_flight.is_some() || !e.is_expired(current_time_ms));
    }

    pub fn reliable_pending(&self) -> impl Iterator<Item = &PendingEvent> {
        self.pending
            .iter()
            .filter(|e| e.event.reliability().is_reliable())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn evict_oldest_unreliable(&mut self) {
        if let Some(idx) = self
            .pending
            .iter()
            .position(|e| !e.event.reliability().is_reliable())
        {
            self.pending.remove(idx);
        }
    }
}
