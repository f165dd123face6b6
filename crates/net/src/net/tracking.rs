use std::collections::{HashSet, VecDeque};
use std::time::Instant;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

/// Ack bitfield width; older sequences can no longer be acknowledged.
pub const ACK_WINDOW: u32 = 32;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone)]
struct SentDatagram {
    sequence: u32,
    send_time: Instant,
    acked: bool,
}

/// Tracks sent sequences and derives a smoothed round-trip time from acks.
#[derive(Debug)]
pub struct AckTracker {
    sent: VecDeque<SentDatagram>,
    max_tracked: usize,
    srtt: f32,
    rtt_var: f32,
}

impl AckTracker {
    const ALPHA: f32 = 0.125;
    const BETA: f32 = 0.25;

    pub fn new(max_tracked: usize, initial_rtt: f32) -> Self {
        Self {
            sent: VecDeque::with_capacity(max_tracked),
            max_tracked,
            srtt: initial_rtt,
            rtt_var: initial_rtt / 2.0,
        }
    }

    pub fn track(&mut self, sequence: u32, now: Instant) {
        while self.sent.len() >= self.max_tracked {
            self.sent.pop_front();
        }

        self.sent.push_back(SentDatagram {
            sequence,
            send_time: now,
            acked: false,
        });
    }

    /// Marks every tracked sequence covered by `ack`/`ack_bitfield` and
    /// returns the newly acknowledged ones.
    pub fn process_ack(&mut self, ack: u32, ack_bitfield: u32, now: Instant) -> Vec<u32> {
        let mut acked = Vec::new();
        let mut samples = Vec::new();

        for sent in &mut self.sent {
            if sent.acked {
                continue;
            }

            let is_acked = if sent.sequence == ack {
                true
            } else if sequence_greater_than(ack, sent.sequence) {
                let diff = ack.wrapping_sub(sent.sequence);
                diff <= ACK_WINDOW && (ack_bitfield & (1 << (diff - 1))) != 0
            } else {
                false
            };

            if is_acked {
                sent.acked = true;
                acked.push(sent.sequence);
                samples.push(now.saturating_duration_since(sent.send_time).as_secs_f32());
            }
        }

        for rtt in samples {
            self.update_rtt(rtt);
        }

        while self.sent.front().is_some_and(|s| s.acked) {
            self.sent.pop_front();
        }

        acked
    }

    fn update_rtt(&mut self, rtt: f32) {
        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - Self::BETA) * self.rtt_var + Self::BETA * diff;
        self.srtt = (1.0 - Self::ALPHA) * self.srtt + Self::ALPHA * rtt;
    }

    /// Smoothed round-trip time in seconds.
    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn unacked_count(&self) -> usize {
        self.sent.iter().filter(|s| !s.acked).count()
    }
}

/// Tracks received sequences for duplicate rejection and ack generation.
#[derive(Debug)]
pub struct ReceiveTracker {
    has_received: bool,
    last_received: u32,
    received_bitfield: u32,
    recent_sequences: VecDeque<u32>,
    max_recent: usize,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self {
            has_received: false,
            last_received: 0,
            received_bitfield: 0,
            recent_sequences: VecDeque::with_capacity(128),
            max_recent: 128,
        }
    }

    /// Returns false for a sequence that was already seen.
    pub fn record_received(&mut self, sequence: u32) -> bool {
        if self.recent_sequences.contains(&sequence) {
            return false;
        }

        if self.recent_sequences.len() >= self.max_recent {
            self.recent_sequences.pop_front();
        }
        self.recent_sequences.push_back(sequence);

        if !self.has_received {
            self.has_received = true;
            self.last_received = sequence;
            self.received_bitfield = 0;
        } else if sequence_greater_than(sequence, self.last_received) {
            let diff = sequence.wrapping_sub(self.last_received);
            self.received_bitfield = if diff < ACK_WINDOW {
                (self.received_bitfield << diff) | (1 << (diff - 1))
            } else if diff == ACK_WINDOW {
                1 << (ACK_WINDOW - 1)
            } else {
                0
            };
            self.last_received = sequence;
        } else {
            let diff = self.last_received.wrapping_sub(sequence);
            if diff > 0 && diff <= ACK_WINDOW {
                self.received_bitfield |= 1 << (diff - 1);
            }
        }

        true
    }

    pub fn ack_data(&self) -> (u32, u32) {
        (self.last_received, self.received_bitfield)
    }
}

/// Remembers recently delivered reliable message ids so retransmissions
/// reach the application once.
#[derive(Debug)]
pub struct ReliableWindow {
    seen: HashSet<u32>,
    order: VecDeque<u32>,
    capacity: usize,
}

impl ReliableWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false when `message_id` was delivered before.
    pub fn insert(&mut self, message_id: u32) -> bool {
        if !self.seen.insert(message_id) {
            return false;
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(message_id);
        true
    }
}
