const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Ring bitset over the most recent sequence numbers.
///
/// Positions more than `capacity / 2` behind the high-water mark read as set,
/// so the window behaves like an unbounded history of everything old enough.
/// Advancing the high-water mark clears the slots it sweeps over.
#[derive(Debug, Clone)]
pub struct SequenceWindow {
    bits: Vec<u64>,
    capacity: u32,
    head: Option<u32>,
}

impl SequenceWindow {
    /// `capacity` is rounded up to a power of two no smaller than 64 so slot
    /// indices stay contiguous when sequence numbers wrap.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(64).next_power_of_two() as u32;
        Self {
            bits: vec![0; (capacity / 64) as usize],
            capacity,
            head: None,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Highest sequence number set so far.
    pub fn head(&self) -> Option<u32> {
        self.head
    }

    fn span(&self) -> u32 {
        self.capacity / 2
    }

    pub fn get(&self, seq: u32) -> bool {
        let Some(head) = self.head else {
            return false;
        };
        if sequence_greater_than(seq, head) {
            return false;
        }
        if head.wrapping_sub(seq) > self.span() {
            return true;
        }
        self.bit(seq)
    }

    /// Marks `seq` as seen. Returns `false` if it already was.
    pub fn set(&mut self, seq: u32) -> bool {
        match self.head {
            None => {
                self.head = Some(seq);
            }
            Some(head) if sequence_greater_than(seq, head) => {
                let advance = seq.wrapping_sub(head);
                if advance >= self.capacity {
                    self.bits.fill(0);
                } else {
                    for offset in 1..=advance {
                        self.clear_bit(head.wrapping_add(offset));
                    }
                }
                self.head = Some(seq);
            }
            Some(_) => {
                if self.get(seq) {
                    return false;
                }
            }
        }
        self.set_bit(seq);
        true
    }

    /// Sets every sequence number in `from..=to`, following wrap-around.
    pub fn set_range(&mut self, from: u32, to: u32) {
        let count = to.wrapping_sub(from) as u64 + 1;
        let count = count.min(self.capacity as u64) as u32;
        let start = to.wrapping_sub(count - 1);
        for offset in 0..count {
            self.set(start.wrapping_add(offset));
        }
    }

    /// High-water mark plus a bitmap of the 32 sequence numbers before it;
    /// bit `n` covers `head - 1 - n`.
    pub fn ack_bits(&self) -> (u32, u32) {
        let Some(head) = self.head else {
            return (0, 0);
        };
        let mut bitmap = 0u32;
        for n in 0..32u32 {
            if self.get(head.wrapping_sub(n + 1)) {
                bitmap |= 1 << n;
            }
        }
        (head, bitmap)
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
        self.head = None;
    }

    fn index(&self, seq: u32) -> (usize, u64) {
        let slot = seq & (self.capacity - 1);
        ((slot / 64) as usize, 1u64 << (slot % 64))
    }

    fn bit(&self, seq: u32) -> bool {
        let (word, mask) = self.index(seq);
        self.bits[word] & mask != 0
    }

    fn set_bit(&mut self, seq: u32) {
        let (word, mask) = self.index(seq);
        self.bits[word] |= mask;
    }

    fn clear_bit(&mut self, seq: u32) {
        let (word, mask) = self.index(seq);
        self.bits[word] &= !mask;
    }
}
