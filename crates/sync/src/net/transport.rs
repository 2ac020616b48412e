use std::time::Instant;

use super::protocol::{FrameFlags, FrameHeader};
use super::sequence::{SequenceWindow, sequence_greater_than};
use super::stats::NetworkStats;

#[derive(Debug, Clone, Copy)]
struct SentPacket {
    sequence: u32,
    message_id: i64,
    send_time: Instant,
}

/// A sent datagram whose history slot was reused before the peer acknowledged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroppedPacket {
    pub sequence: u32,
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Deliver,
    Duplicate,
    /// Older than the newest delivered datagram. Not acknowledged, so the
    /// sender sees it as dropped.
    Stale,
}

/// Per-endpoint sequencing, acknowledgement and loss detection.
///
/// The transport never retransmits; dropped datagrams are reported through
/// [`Transport::take_dropped`] for the layer above to react to.
#[derive(Debug)]
pub struct Transport {
    next_local_seq: u32,
    received: SequenceWindow,
    acked: SequenceWindow,
    sent: Vec<Option<SentPacket>>,
    dropped: Vec<DroppedPacket>,
    acked_messages: Vec<i64>,
    srtt: f32,
    rtt_var: f32,
    stats: NetworkStats,
}

impl Transport {
    pub fn new(window: usize, send_history: usize) -> Self {
        Self {
            next_local_seq: 0,
            received: SequenceWindow::new(window),
            acked: SequenceWindow::new(window),
            sent: vec![None; send_history.max(1)],
            dropped: Vec::new(),
            acked_messages: Vec::new(),
            srtt: 100.0,
            rtt_var: 50.0,
            stats: NetworkStats::default(),
        }
    }

    /// Stamps sequence and acknowledgement fields onto an outgoing header.
    pub fn set_headers(&mut self, header: &mut FrameHeader, message_id: i64) {
        if !header.flags.contains(FrameFlags::RESEND) {
            header.local_seq = self.next_local_seq;
            self.next_local_seq = self.next_local_seq.wrapping_add(1);
        }
        self.track_sent(header.local_seq, message_id);

        if let Some(head) = self.received.head() {
            let (_, bits) = self.received.ack_bits();
            header.remote_seq = head;
            header.ack_bits = bits;
            header.flags.insert(FrameFlags::HAS_ACKS);
        } else {
            header.remote_seq = 0;
            header.ack_bits = 0;
            header.flags.remove(FrameFlags::HAS_ACKS);
        }

        self.stats.packets_sent += 1;
    }

    fn track_sent(&mut self, sequence: u32, message_id: i64) {
        let slot = sequence as usize % self.sent.len();
        if let Some(previous) = self.sent[slot] {
            if previous.sequence == sequence {
                // resend of the same datagram keeps its original timing
                return;
            }
            if !self.acked.get(previous.sequence) {
                self.stats.packets_dropped += 1;
                self.dropped.push(DroppedPacket {
                    sequence: previous.sequence,
                    message_id: previous.message_id,
                });
            }
        }
        self.sent[slot] = Some(SentPacket {
            sequence,
            message_id,
            send_time: Instant::now(),
        });
    }

    /// Folds the peer's acknowledgements and decides whether the datagram is
    /// delivered upward.
    pub fn update_received(&mut self, header: &FrameHeader) -> Delivery {
        if header.flags.contains(FrameFlags::HAS_ACKS) {
            self.process_acks(header.remote_seq, header.ack_bits);
        }

        let sequence = header.local_seq;
        let delivery = match self.received.head() {
            Some(head) if !sequence_greater_than(sequence, head) => {
                if self.received.get(sequence) {
                    Delivery::Duplicate
                } else {
                    Delivery::Stale
                }
            }
            _ => {
                self.received.set(sequence);
                Delivery::Deliver
            }
        };

        match delivery {
            Delivery::Deliver => self.stats.packets_received += 1,
            _ => self.stats.packets_discarded += 1,
        }
        delivery
    }

    fn process_acks(&mut self, remote_seq: u32, ack_bits: u32) {
        let now = Instant::now();
        let older = (0..32u32)
            .filter(|n| ack_bits & (1 << n) != 0)
            .map(|n| remote_seq.wrapping_sub(n + 1));

        for sequence in std::iter::once(remote_seq).chain(older) {
            if !self.acked.set(sequence) {
                continue;
            }
            let slot = sequence as usize % self.sent.len();
            let Some(sent) = self.sent[slot].filter(|s| s.sequence == sequence) else {
                continue;
            };
            let rtt = now.duration_since(sent.send_time).as_secs_f32() * 1000.0;
            self.update_rtt(rtt);
            self.acked_messages.push(sent.message_id);
        }
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
        self.stats.rtt_ms = self.srtt;
        self.stats.rtt_variance = self.rtt_var;
    }

    pub fn was_acked(&self, sequence: u32) -> bool {
        self.acked.get(sequence)
    }

    pub fn take_dropped(&mut self) -> Vec<DroppedPacket> {
        std::mem::take(&mut self.dropped)
    }

    /// Message ids carried by datagrams acknowledged since the last call.
    pub fn take_acked_messages(&mut self) -> Vec<i64> {
        std::mem::take(&mut self.acked_messages)
    }

    pub fn remote_seq(&self) -> Option<u32> {
        self.received.head()
    }

    pub fn next_local_seq(&self) -> u32 {
        self.next_local_seq
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn record_bytes_sent(&mut self, bytes: usize) {
        self.stats.bytes_sent += bytes as u64;
    }

    pub fn record_bytes_received(&mut self, bytes: usize) {
        self.stats.bytes_received += bytes as u64;
    }
}
