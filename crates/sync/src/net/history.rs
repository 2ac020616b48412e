use super::protocol::{MessageKind, UpdateKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub message_id: i64,
    pub kind: MessageKind,
    pub update_kind: UpdateKind,
}

/// Fixed ring of sent message descriptors keyed by `message_id mod len`.
#[derive(Debug)]
pub struct MessageHistory {
    entries: Vec<Option<MessageInfo>>,
}

impl MessageHistory {
    pub fn new(len: usize) -> Self {
        Self {
            entries: vec![None; len.max(1)],
        }
    }

    fn slot(&self, message_id: i64) -> usize {
        message_id.rem_euclid(self.entries.len() as i64) as usize
    }

    pub fn record(&mut self, info: MessageInfo) {
        let slot = self.slot(info.message_id);
        self.entries[slot] = Some(info);
    }

    /// `None` once the slot has been reused by a newer message.
    pub fn lookup(&self, message_id: i64) -> Option<MessageInfo> {
        self.entries[self.slot(message_id)].filter(|info| info.message_id == message_id)
    }

    pub fn clear(&mut self) {
        self.entries.fill(None);
    }
}
