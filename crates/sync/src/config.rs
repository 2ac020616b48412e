use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bits::ByteOrder;
use crate::net::DEFAULT_TICK_RATE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables shared by server and client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Sequence window length. Must be a multiple of 64.
    pub sequence_window: usize,
    /// Per-peer table of sent datagrams used for drop detection.
    pub send_history: usize,
    pub message_history: usize,
    pub packet_buffer_capacity: usize,
    pub message_buffer_capacity: usize,
    pub handshake_resend_ms: u64,
    pub pending_timeout_ms: u64,
    pub connected_timeout_ms: u64,
    pub grace_timeout_ms: u64,
    pub reconnect_min_interval_ms: u64,
    pub event_queue_capacity: usize,
    pub byte_order: ByteOrder,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_clients: 32,
            sequence_window: 128,
            send_history: 32,
            message_history: 256,
            packet_buffer_capacity: 8,
            message_buffer_capacity: 64,
            handshake_resend_ms: 250,
            pending_timeout_ms: 5_000,
            connected_timeout_ms: 5_000,
            grace_timeout_ms: 30_000,
            reconnect_min_interval_ms: 1_000,
            event_queue_capacity: 256,
            byte_order: ByteOrder::Little,
        }
    }
}

impl NetConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be non-zero".into()));
        }
        if self.sequence_window == 0 || self.sequence_window % 64 != 0 {
            return Err(ConfigError::Invalid(format!(
                "sequence_window {} is not a positive multiple of 64",
                self.sequence_window
            )));
        }
        if self.send_history == 0 || self.send_history * 2 > self.sequence_window {
            return Err(ConfigError::Invalid(format!(
                "send_history {} must be non-zero and at most half of sequence_window {}",
                self.send_history, self.sequence_window
            )));
        }
        let capacities = [
            ("max_clients", self.max_clients),
            ("message_history", self.message_history),
            ("packet_buffer_capacity", self.packet_buffer_capacity),
            ("message_buffer_capacity", self.message_buffer_capacity),
            ("event_queue_capacity", self.event_queue_capacity),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    pub fn handshake_resend(&self) -> Duration {
        Duration::from_millis(self.handshake_resend_ms)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_timeout_ms)
    }

    pub fn connected_timeout(&self) -> Duration {
        Duration::from_millis(self.connected_timeout_ms)
    }

    pub fn grace_timeout(&self) -> Duration {
        Duration::from_millis(self.grace_timeout_ms)
    }

    pub fn reconnect_min_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_min_interval_ms)
    }
}
