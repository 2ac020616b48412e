#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub packets_discarded: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
}

impl NetworkStats {
    pub fn packet_loss_percent(&self) -> f32 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.packets_dropped as f32 / self.packets_sent as f32 * 100.0
    }

    pub fn merge(&mut self, other: &NetworkStats) {
        self.packets_sent += other.packets_sent;
        self.packets_received += other.packets_received;
        self.packets_dropped += other.packets_dropped;
        self.packets_discarded += other.packets_discarded;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
    }
}
